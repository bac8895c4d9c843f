//! Background server launcher
//!
//! The web application's `run` call blocks for as long as the server lives,
//! so it gets a dedicated thread. Errors and panics from `run` are caught on
//! that thread and handed to a failure callback; the UI side never sees a
//! panic cross the boundary. Each server gets a watch channel so it can be
//! stopped on exit or at the end of a test.

use crate::config::{LaunchSettings, ServerOptions};
use crate::error::{AppError, Result};
use log::{error, info, warn};
use std::any::Any;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::panic::{self, AssertUnwindSafe};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::watch;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

/// Windows flag to prevent console window from appearing
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

const PROCESS_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Lines of server stderr kept for failure reports
const STDERR_TAIL_LINES: usize = 20;
/// How long to wait for the last stderr lines after the process exits
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// The external web application, seen through its blocking entry point.
pub trait WebApplication: Send + Sync {
    fn name(&self) -> &str;

    /// Serve until `shutdown` fires. Returning early is only expected on
    /// failure.
    fn run(&self, options: &ServerOptions, shutdown: &ShutdownSignal) -> Result<()>;
}

#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// True once `stop` was called or the handle was dropped
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Block for up to `timeout`. Returns true as soon as shutdown fires.
    /// Must not be called from inside the async runtime.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        let mut rx = self.rx.clone();
        tauri::async_runtime::block_on(async move {
            // A closed channel also ends the wait
            let woke = tokio::time::timeout(timeout, rx.wait_for(|stop| *stop))
                .await
                .is_ok();
            woke
        })
    }
}

pub struct ServerHandle {
    shutdown_tx: watch::Sender<bool>,
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.thread
            .as_ref()
            .map(|thread| thread.is_finished())
            .unwrap_or(true)
    }

    /// Wait for the server thread to return. Pair with `stop` unless the
    /// server is expected to fail on its own.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("server thread ended with a panic outside the run call");
            }
        }
    }
}

/// Start `app` on a background thread. `on_failure` receives a
/// display-ready message if `run` errors or panics.
pub fn spawn_server<F>(
    app: Arc<dyn WebApplication>,
    options: ServerOptions,
    on_failure: F,
) -> Result<ServerHandle>
where
    F: FnOnce(String) + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal = ShutdownSignal { rx: shutdown_rx };

    let thread = thread::Builder::new()
        .name("web-server".to_string())
        .spawn(move || {
            info!(
                "starting {} on {}:{} (debug={}, reloader={}, threaded={})",
                app.name(),
                options.host,
                options.port,
                options.debug,
                options.use_reloader,
                options.threaded
            );
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| app.run(&options, &signal)));
            match outcome {
                Ok(Ok(())) => info!("{} stopped", app.name()),
                Ok(Err(e)) => {
                    error!("{} failed: {}", app.name(), e);
                    on_failure(e.to_string());
                }
                Err(payload) => {
                    let e = AppError::ServerPanicked(panic_message(payload.as_ref()));
                    error!("{} failed: {}", app.name(), e);
                    on_failure(e.to_string());
                }
            }
        })
        .map_err(|e| AppError::ServerStart(format!("could not spawn server thread: {}", e)))?;

    info!("server thread started");
    Ok(ServerHandle {
        shutdown_tx,
        thread: Some(thread),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs the Python web module in a child process:
/// `import <module>; <module>.<object>.run(...)`.
pub struct PythonWebApp {
    launch: LaunchSettings,
}

impl PythonWebApp {
    pub fn new(launch: LaunchSettings) -> Self {
        Self { launch }
    }

    /// Python program that configures the app object and serves it
    pub fn bootstrap_script(&self, options: &ServerOptions) -> String {
        format!(
            "import importlib\n\
             web_app = getattr(importlib.import_module({module}), {object})\n\
             web_app.config['SEND_FILE_MAX_AGE_DEFAULT'] = {max_age}\n\
             web_app.config['TEMPLATES_AUTO_RELOAD'] = {auto_reload}\n\
             web_app.run(host={host}, port={port}, debug={debug}, use_reloader={reloader}, threaded={threaded})\n",
            module = py_str(&self.launch.app_module),
            object = py_str(&self.launch.app_object),
            max_age = options.send_file_max_age_default,
            auto_reload = py_bool(options.templates_auto_reload),
            host = py_str(&options.host),
            port = options.port,
            debug = py_bool(options.debug),
            reloader = py_bool(options.use_reloader),
            threaded = py_bool(options.threaded),
        )
    }

    /// Program and arguments, for logs and error messages
    pub fn command_line(&self, options: &ServerOptions) -> Vec<String> {
        match &self.launch.custom_command {
            Some(pieces) => pieces.clone(),
            None => vec![
                self.launch.python.clone(),
                "-c".to_string(),
                self.bootstrap_script(options),
            ],
        }
    }

    fn build_command(&self, options: &ServerOptions) -> Result<Command> {
        let mut pieces = self.command_line(options).into_iter();
        let program = pieces
            .next()
            .ok_or_else(|| AppError::ServerStart("empty server command".to_string()))?;

        let mut command = Command::new(program);
        command
            .args(pieces)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .env("PYTHONUNBUFFERED", "1")
            .env("NCERT_SERVER_HOST", &options.host)
            .env("NCERT_SERVER_PORT", options.port.to_string());

        if let Some(dir) = &self.launch.app_dir {
            if !dir.is_dir() {
                return Err(AppError::ServerStart(format!(
                    "app directory {} does not exist",
                    dir.display()
                )));
            }
            command.current_dir(dir);
        }

        #[cfg(windows)]
        command.creation_flags(CREATE_NO_WINDOW);

        Ok(command)
    }
}

impl WebApplication for PythonWebApp {
    fn name(&self) -> &str {
        "web server"
    }

    fn run(&self, options: &ServerOptions, shutdown: &ShutdownSignal) -> Result<()> {
        let mut command = self.build_command(options)?;
        let program = self
            .command_line(options)
            .into_iter()
            .next()
            .unwrap_or_default();
        let mut child = command
            .spawn()
            .map_err(|e| AppError::ServerStart(format!("could not run {}: {}", program, e)))?;
        info!("server process started (pid {})", child.id());
        let mut stderr = StderrTail::capture(&mut child);

        loop {
            if shutdown.is_triggered() {
                info!("stopping server process (pid {})", child.id());
                stop_child_process(&mut child);
                return Ok(());
            }

            match child.try_wait() {
                Ok(Some(status)) => {
                    stderr.finish(STDERR_DRAIN_TIMEOUT);
                    let reason = match stderr.last_line() {
                        Some(line) => format!("{}: {}", status, line),
                        None => status.to_string(),
                    };
                    return Err(AppError::ServerExited(reason));
                }
                Ok(None) => stderr.drain(),
                Err(e) => {
                    stop_child_process(&mut child);
                    return Err(AppError::ServerExited(format!(
                        "could not poll server process: {}",
                        e
                    )));
                }
            }

            shutdown.wait_timeout(PROCESS_POLL_INTERVAL);
        }
    }
}

/// Forwards the server's stderr to the log and keeps its last lines, so an
/// early exit can be reported with the exception that caused it.
struct StderrTail {
    rx: Option<mpsc::Receiver<String>>,
    lines: VecDeque<String>,
}

impl StderrTail {
    fn capture(child: &mut Child) -> Self {
        let rx = child.stderr.take().and_then(|pipe| {
            let (tx, rx) = mpsc::channel();
            let reader = thread::Builder::new()
                .name("web-server-stderr".to_string())
                .spawn(move || forward_lines(pipe, tx));
            match reader {
                Ok(_) => Some(rx),
                Err(e) => {
                    warn!("could not read server stderr: {}", e);
                    None
                }
            }
        });
        Self {
            rx,
            lines: VecDeque::with_capacity(STDERR_TAIL_LINES),
        }
    }

    fn push(&mut self, line: String) {
        if self.lines.len() == STDERR_TAIL_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn drain(&mut self) {
        let Some(rx) = self.rx.take() else { return };
        loop {
            match rx.try_recv() {
                Ok(line) => self.push(line),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            }
        }
        self.rx = Some(rx);
    }

    /// Collect what is left once the process has exited
    fn finish(&mut self, timeout: Duration) {
        let Some(rx) = self.rx.take() else { return };
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(left) {
                Ok(line) => self.push(line),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn last_line(&self) -> Option<&str> {
        self.lines
            .iter()
            .rev()
            .map(|line| line.trim())
            .find(|line| !line.is_empty())
    }
}

fn forward_lines(pipe: impl Read, tx: mpsc::Sender<String>) {
    for line in BufReader::new(pipe).lines().map_while(std::result::Result::ok) {
        info!("[server] {}", line);
        if tx.send(line).is_err() {
            break;
        }
    }
}

fn stop_child_process(child: &mut Child) {
    #[cfg(target_os = "windows")]
    {
        let _ = Command::new("taskkill")
            .args(["/pid", &child.id().to_string(), "/t", "/f"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .stdin(Stdio::null())
            .creation_flags(CREATE_NO_WINDOW)
            .status();
        let _ = child.wait();
    }

    #[cfg(not(target_os = "windows"))]
    {
        let _ = child.kill();
        let _ = child.wait();
    }
}

// JSON string literals are valid Python string literals
fn py_str(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "''".to_string())
}

fn py_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    struct FailingApp;

    impl WebApplication for FailingApp {
        fn name(&self) -> &str {
            "failing app"
        }

        fn run(&self, _options: &ServerOptions, _shutdown: &ShutdownSignal) -> Result<()> {
            Err(AppError::ServerStart("No module named 'app'".to_string()))
        }
    }

    struct PanickingApp;

    impl WebApplication for PanickingApp {
        fn name(&self) -> &str {
            "panicking app"
        }

        fn run(&self, _options: &ServerOptions, _shutdown: &ShutdownSignal) -> Result<()> {
            panic!("template folder missing");
        }
    }

    struct IdleApp;

    impl WebApplication for IdleApp {
        fn name(&self) -> &str {
            "idle app"
        }

        fn run(&self, _options: &ServerOptions, shutdown: &ShutdownSignal) -> Result<()> {
            while !shutdown.wait_timeout(Duration::from_millis(20)) {}
            Ok(())
        }
    }

    fn custom(pieces: &[&str]) -> PythonWebApp {
        PythonWebApp::new(LaunchSettings {
            custom_command: Some(pieces.iter().map(|s| s.to_string()).collect()),
            ..LaunchSettings::default()
        })
    }

    #[test]
    fn test_run_error_is_reported_not_propagated() {
        let (tx, rx) = mpsc::channel();
        let handle = spawn_server(Arc::new(FailingApp), ServerOptions::default(), move |msg| {
            let _ = tx.send(msg);
        })
        .unwrap();
        handle.join();

        let msg = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(msg.contains("No module named 'app'"));
    }

    #[test]
    fn test_panic_is_caught_at_thread_boundary() {
        let (tx, rx) = mpsc::channel();
        let handle = spawn_server(Arc::new(PanickingApp), ServerOptions::default(), move |msg| {
            let _ = tx.send(msg);
        })
        .unwrap();
        handle.join();

        let msg = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(msg.contains("panicked"));
        assert!(msg.contains("template folder missing"));
    }

    #[test]
    fn test_stop_ends_server_without_failure() {
        let (tx, rx) = mpsc::channel::<String>();
        let handle = spawn_server(Arc::new(IdleApp), ServerOptions::default(), move |msg| {
            let _ = tx.send(msg);
        })
        .unwrap();
        assert!(!handle.is_finished());

        handle.stop();
        handle.join();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_bootstrap_script_forwards_options() {
        let app = PythonWebApp::new(LaunchSettings::default());
        let script = app.bootstrap_script(&ServerOptions::default());

        assert!(script.contains("importlib.import_module(\"app\")"));
        assert!(script.contains("web_app.config['SEND_FILE_MAX_AGE_DEFAULT'] = 0"));
        assert!(script.contains("web_app.config['TEMPLATES_AUTO_RELOAD'] = True"));
        assert!(script.contains(
            "web_app.run(host=\"0.0.0.0\", port=8000, debug=False, use_reloader=False, threaded=True)"
        ));
    }

    #[test]
    fn test_custom_command_replaces_python() {
        let app = custom(&["flask", "run"]);
        assert_eq!(
            app.command_line(&ServerOptions::default()),
            vec!["flask".to_string(), "run".to_string()]
        );
    }

    #[test]
    fn test_missing_program_is_start_error() {
        let app = custom(&["ncert-no-such-program-xyz"]);
        let (_tx, rx) = watch::channel(false);
        let err = app
            .run(&ServerOptions::default(), &ShutdownSignal { rx })
            .unwrap_err();
        assert!(matches!(err, AppError::ServerStart(_)));
    }

    #[test]
    fn test_missing_app_dir_is_start_error() {
        let app = PythonWebApp::new(LaunchSettings {
            app_dir: Some(std::path::PathBuf::from("/definitely/not/here/ncert")),
            ..LaunchSettings::default()
        });
        let (_tx, rx) = watch::channel(false);
        let err = app
            .run(&ServerOptions::default(), &ShutdownSignal { rx })
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[cfg(unix)]
    #[test]
    fn test_early_process_exit_is_failure() {
        let app = custom(&["sh", "-c", "exit 3"]);
        let (_tx, rx) = watch::channel(false);
        let err = app
            .run(&ServerOptions::default(), &ShutdownSignal { rx })
            .unwrap_err();
        assert!(matches!(err, AppError::ServerExited(_)));
        assert!(err.to_string().contains('3'));
    }

    #[cfg(unix)]
    #[test]
    fn test_early_exit_reports_last_stderr_line() {
        let app = custom(&[
            "sh",
            "-c",
            "echo 'Traceback (most recent call last):' >&2; echo 'OSError: Address already in use' >&2; echo >&2; exit 1",
        ]);
        let (_tx, rx) = watch::channel(false);
        let err = app
            .run(&ServerOptions::default(), &ShutdownSignal { rx })
            .unwrap_err();
        assert!(matches!(err, AppError::ServerExited(_)));
        assert!(err.to_string().contains("OSError: Address already in use"));
        assert!(!err.to_string().contains("Traceback"));
    }

    #[cfg(unix)]
    #[test]
    fn test_exception_text_reaches_failure_callback() {
        let (tx, rx) = mpsc::channel();
        let handle = spawn_server(
            Arc::new(custom(&[
                "sh",
                "-c",
                "echo \"ModuleNotFoundError: No module named 'app'\" >&2; exit 1",
            ])),
            ServerOptions::default(),
            move |msg| {
                let _ = tx.send(msg);
            },
        )
        .unwrap();
        handle.join();

        let msg = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(msg.contains("No module named 'app'"));
    }

    #[test]
    fn test_wait_timeout_wakes_on_stop() {
        let (tx, rx) = watch::channel(false);
        let signal = ShutdownSignal { rx };
        assert!(!signal.wait_timeout(Duration::from_millis(10)));

        let waiter = thread::spawn(move || signal.wait_timeout(Duration::from_secs(30)));
        thread::sleep(Duration::from_millis(50));
        let started = Instant::now();
        tx.send(true).unwrap();

        assert!(waiter.join().unwrap());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_dropped_handle_counts_as_shutdown() {
        let (tx, rx) = watch::channel(false);
        let signal = ShutdownSignal { rx };
        drop(tx);
        assert!(signal.is_triggered());
        assert!(signal.wait_timeout(Duration::from_secs(30)));
    }

    #[cfg(unix)]
    #[test]
    fn test_stop_kills_server_process() {
        let (tx, rx) = mpsc::channel::<String>();
        let handle = spawn_server(
            Arc::new(custom(&["sleep", "30"])),
            ServerOptions::default(),
            move |msg| {
                let _ = tx.send(msg);
            },
        )
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        let started = Instant::now();
        handle.stop();
        handle.join();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(rx.try_recv().is_err());
    }
}
