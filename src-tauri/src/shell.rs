//! Application lifecycle shell
//!
//! Owns what the window shows and drives it from `Loading` to either
//! `Embedded` or `Fallback`. The shell never sleeps: every wait goes through
//! the `Scheduler`, which later hands a `ShellTask` back to `handle`. The
//! Tauri runtime implements the platform traits for real; tests drive the
//! same code with a manual scheduler.

use crate::browser::{BrowserFallback, OpenOutcome};
use crate::config::ShellConfig;
use crate::error::{AppError, Result};
use crate::probe::ReadinessProbe;
use crate::server::{spawn_server, ServerHandle, WebApplication};
use crate::types::{error_status, starting_status, Phase, Screen, REFRESHING_STATUS};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Work the shell schedules for itself
#[derive(Debug, Clone, PartialEq)]
pub enum ShellTask {
    /// Check the server and try to embed it. `attempt` starts at 1.
    AttemptEmbed { attempt: u32 },
    /// The background server reported a failure
    ServerFailed { message: String },
}

pub trait Scheduler: Send + Sync {
    /// Deliver `task` to the shell after `delay`, on the UI side
    fn schedule_once(&self, delay: Duration, task: ShellTask);
}

pub trait Renderer: Send {
    /// Replace everything the window shows with `screen`
    fn render(&self, screen: &Screen);
}

/// Something that can show a URL inside the app window
pub trait EmbedTarget: Send {
    fn embed(&self, url: &Url) -> Result<()>;
}

/// Whether in-app web rendering exists on this build. Resolved once at startup.
pub enum Capability {
    Available(Box<dyn EmbedTarget>),
    Unavailable,
}

impl Capability {
    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available(_))
    }
}

/// Platform pieces the shell is built from
pub struct ShellParts {
    pub renderer: Box<dyn Renderer>,
    pub scheduler: Arc<dyn Scheduler>,
    pub capability: Capability,
    pub probe: Option<Box<dyn ReadinessProbe>>,
    pub browser: BrowserFallback,
}

pub struct Shell {
    config: ShellConfig,
    url: Url,
    screen: Screen,
    server_ready: bool,
    server_error: Option<String>,
    capability: Capability,
    probe: Option<Box<dyn ReadinessProbe>>,
    browser: BrowserFallback,
    renderer: Box<dyn Renderer>,
    scheduler: Arc<dyn Scheduler>,
    server: Option<ServerHandle>,
}

impl Shell {
    pub fn new(config: ShellConfig, parts: ShellParts) -> Result<Self> {
        let url = config.server.server_url()?;

        let capability = if config.embed_enabled {
            parts.capability
        } else {
            info!("web view disabled by configuration");
            Capability::Unavailable
        };
        let probe = if config.probe_enabled { parts.probe } else { None };

        Ok(Self {
            config,
            url,
            screen: Screen::loading(starting_status()),
            server_ready: false,
            server_error: None,
            capability,
            probe,
            browser: parts.browser,
            renderer: parts.renderer,
            scheduler: parts.scheduler,
            server: None,
        })
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn phase(&self) -> Phase {
        self.screen.phase()
    }

    pub fn server_ready(&self) -> bool {
        self.server_ready
    }

    /// Show the loading screen, start the server in the background and
    /// schedule the first embed attempt.
    pub fn start(&mut self, app: Arc<dyn WebApplication>) {
        info!("starting shell for {}", self.url);
        self.set_screen(Screen::loading(starting_status()));

        let scheduler = self.scheduler.clone();
        let spawned = spawn_server(app, self.config.server.clone(), move |message| {
            scheduler.schedule_once(Duration::ZERO, ShellTask::ServerFailed { message });
        });
        match spawned {
            Ok(handle) => self.server = Some(handle),
            Err(e) => self.server_failed(e.to_string()),
        }

        self.scheduler
            .schedule_once(self.config.embed_delay, ShellTask::AttemptEmbed { attempt: 1 });
    }

    pub fn handle(&mut self, task: ShellTask) {
        match task {
            ShellTask::AttemptEmbed { attempt } => self.attempt_embed(attempt),
            ShellTask::ServerFailed { message } => self.server_failed(message),
        }
    }

    fn attempt_embed(&mut self, attempt: u32) {
        info!("attempting to create web view (attempt {})", attempt);

        if !self.server_ready {
            if let Some(probe) = &self.probe {
                if probe.is_ready(&self.url) {
                    info!("server is responding");
                    self.server_ready = true;
                } else if let Some(message) = self.server_error.clone() {
                    warn!("server is down and reported a failure, not waiting for it");
                    let notice = error_status(&format!("Server error: {}", message));
                    self.show_fallback(Some(notice), false);
                    return;
                } else if let Some(delay) = self.config.retry.delay_after(attempt) {
                    warn!("server not responding yet, retrying in {:?}", delay);
                    self.scheduler.schedule_once(
                        delay,
                        ShellTask::AttemptEmbed {
                            attempt: attempt + 1,
                        },
                    );
                    return;
                } else {
                    error!("server did not respond after {} attempts", attempt);
                    let notice = format!(
                        "⚠️ The server did not respond after {} attempts.\nUse \"Refresh\" to try again.",
                        attempt
                    );
                    self.show_fallback(Some(notice), false);
                    return;
                }
            }
        }

        let embedded = match &self.capability {
            Capability::Available(target) => {
                info!("creating web view for {}", self.url);
                target.embed(&self.url)
            }
            Capability::Unavailable => Err(AppError::EmbedUnavailable),
        };

        match embedded {
            Ok(()) => {
                self.set_screen(Screen::Embedded {
                    url: self.url.to_string(),
                });
                info!("web view created");
            }
            Err(e) => {
                warn!("{}, using fallback", e);
                self.show_fallback(None, true);
            }
        }
    }

    fn show_fallback(&mut self, notice: Option<String>, open_browser: bool) {
        info!("showing fallback interface");
        let notice = notice.or_else(|| {
            self.server_error
                .as_deref()
                .map(|message| error_status(&format!("Server error: {}", message)))
        });
        self.set_screen(Screen::fallback(self.url.as_str(), notice));

        if open_browser {
            self.open_in_browser();
        }
    }

    /// Record a server failure and surface it on the current screen
    pub fn server_failed(&mut self, message: String) {
        error!("server error: {}", message);
        let status = error_status(&format!("Server error: {}", message));
        self.server_error = Some(message);

        match &mut self.screen {
            Screen::Loading { status: current, .. } => *current = status,
            Screen::Fallback { notice, .. } => *notice = Some(status),
            Screen::Embedded { .. } => {
                warn!("server failed while the web view was showing");
                return;
            }
        }
        self.renderer.render(&self.screen);
    }

    /// Reset the status text and schedule one more embed attempt
    pub fn refresh(&mut self) {
        info!("refreshing interface");
        self.set_screen(Screen::loading(REFRESHING_STATUS));
        self.scheduler
            .schedule_once(self.config.refresh_delay, ShellTask::AttemptEmbed { attempt: 1 });
    }

    pub fn open_in_browser(&self) -> OpenOutcome {
        self.browser.open(self.url.as_str())
    }

    /// Nothing is suspended; the server keeps running. Returning true keeps
    /// the app alive while paused.
    pub fn on_pause(&self) -> bool {
        info!("application paused");
        true
    }

    pub fn on_resume(&self) {
        info!("application resumed");
    }

    /// Stop the background server and wait for its thread
    pub fn shutdown(&mut self) {
        if let Some(server) = self.server.take() {
            info!("shutting down server");
            server.stop();
            server.join();
        }
    }

    fn set_screen(&mut self, screen: Screen) {
        self.screen = screen;
        self.renderer.render(&self.screen);
    }
}
