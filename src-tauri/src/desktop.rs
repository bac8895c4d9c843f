//! Tauri implementations of the shell's platform traits

use crate::browser::{BrowserFallback, BrowserOpener, SystemOpener};
use crate::commands;
use crate::config::ShellConfig;
use crate::error::{AppError, Result};
use crate::probe::{HttpProbe, ReadinessProbe};
use crate::shell::{Capability, EmbedTarget, Renderer, Scheduler, Shell, ShellParts, ShellTask};
use crate::types::Screen;
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tauri::path::BaseDirectory;
use tauri::{AppHandle, Emitter, Manager, WebviewWindow};
use tauri_plugin_shell::ShellExt;
use url::Url;

pub const MAIN_WINDOW: &str = "main";
pub const SCREEN_EVENT: &str = "shell-screen";
/// Bundled copy of the web application, used when no app dir is configured
const BUNDLED_SERVER_DIR: &str = "server";

/// Sleeps on the async runtime, then hands the task to the shell on a
/// blocking worker.
#[derive(Clone)]
pub struct TauriScheduler {
    app: AppHandle,
}

impl Scheduler for TauriScheduler {
    fn schedule_once(&self, delay: Duration, task: ShellTask) {
        let app = self.app.clone();
        tauri::async_runtime::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let delivered = tauri::async_runtime::spawn_blocking(move || {
                commands::with_shell(&app, |shell| shell.handle(task))
            })
            .await;
            match delivered {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("could not deliver shell task: {}", e),
                Err(e) => error!("shell task aborted: {}", e),
            }
        });
    }
}

/// The main window: renders screens into the shell page and embeds the
/// server page by navigating to it.
#[derive(Clone)]
pub struct ShellWindow {
    window: WebviewWindow,
    /// The shell page's own URL, to come back to after an embed
    home: Option<Url>,
    /// Set while the window shows the server page. Shared between clones.
    away: Arc<AtomicBool>,
}

impl ShellWindow {
    fn return_home(&self) {
        if !self.away.load(Ordering::Acquire) {
            return;
        }
        let Some(home) = &self.home else {
            warn!("shell page url unknown, cannot leave the server page");
            return;
        };
        info!("returning main window to the shell page");
        match self.window.navigate(home.clone()) {
            Ok(()) => self.away.store(false, Ordering::Release),
            Err(e) => warn!("failed to return to the shell page: {}", e),
        }
    }
}

impl Renderer for ShellWindow {
    fn render(&self, screen: &Screen) {
        if !matches!(screen, Screen::Embedded { .. }) {
            self.return_home();
        }
        if let Err(e) = self.window.emit(SCREEN_EVENT, screen) {
            warn!("failed to send screen to the shell page: {}", e);
        }
    }
}

impl EmbedTarget for ShellWindow {
    fn embed(&self, url: &Url) -> Result<()> {
        self.window
            .navigate(url.clone())
            .map_err(|e| AppError::Embed(e.to_string()))?;
        self.away.store(true, Ordering::Release);
        Ok(())
    }
}

/// Used when there is no window to draw into
struct LogRenderer;

impl Renderer for LogRenderer {
    fn render(&self, screen: &Screen) {
        info!("screen changed to {:?}", screen.phase());
    }
}

/// `tauri-plugin-shell` open; an intent on Android
pub struct PlatformOpener {
    app: AppHandle,
}

impl BrowserOpener for PlatformOpener {
    fn name(&self) -> &str {
        "platform opener"
    }

    #[allow(deprecated)]
    fn open(&self, url: &str) -> Result<()> {
        self.app
            .shell()
            .open(url, None)
            .map_err(|e| AppError::BrowserOpen {
                opener: self.name().to_string(),
                reason: e.to_string(),
            })
    }
}

/// Point the launcher at the bundled web application unless told otherwise
pub fn resolve_app_dir(app: &AppHandle, config: &mut ShellConfig) {
    if config.launch.app_dir.is_some() || config.launch.custom_command.is_some() {
        return;
    }
    config.launch.app_dir = app
        .path()
        .resolve(BUNDLED_SERVER_DIR, BaseDirectory::Resource)
        .ok()
        .filter(|dir| dir.is_dir());
    match &config.launch.app_dir {
        Some(dir) => info!("using bundled web application in {}", dir.display()),
        None => info!("no bundled web application, importing from the working directory"),
    }
}

/// Resolve the platform pieces once and assemble the shell
pub fn build_shell(app: &AppHandle, config: ShellConfig) -> Result<Shell> {
    let (renderer, capability): (Box<dyn Renderer>, Capability) =
        match app.get_webview_window(MAIN_WINDOW) {
            Some(window) => {
                let home = window.url().ok();
                let window = ShellWindow {
                    window,
                    home,
                    away: Arc::new(AtomicBool::new(false)),
                };
                (
                    Box::new(window.clone()) as Box<dyn Renderer>,
                    Capability::Available(Box::new(window)),
                )
            }
            None => {
                warn!("main window not found, embedded web view unavailable");
                (Box::new(LogRenderer) as Box<dyn Renderer>, Capability::Unavailable)
            }
        };
    info!("embedded web view available: {}", capability.is_available());

    let probe: Box<dyn ReadinessProbe> = Box::new(HttpProbe::new(config.probe_timeout)?);
    let browser = BrowserFallback::new()
        .with(PlatformOpener { app: app.clone() })
        .with(SystemOpener);

    Shell::new(
        config,
        ShellParts {
            renderer,
            scheduler: Arc::new(TauriScheduler { app: app.clone() }),
            capability,
            probe: Some(probe),
            browser,
        },
    )
}
