//! Tauri commands
//!
//! These are the IPC endpoints behind the buttons on the shell page. The
//! shell lives behind a mutex in managed state; everything that touches it
//! runs on a blocking worker because an embed attempt may wait on the
//! readiness probe.

use crate::browser::OpenOutcome;
use crate::error::{AppError, Result};
use crate::shell::Shell;
use crate::types::Screen;
use std::sync::Mutex;
use tauri::{AppHandle, Manager, Runtime};

/// Application state holding the lifecycle shell
pub struct AppState {
    shell: Mutex<Shell>,
}

impl AppState {
    pub fn new(shell: Shell) -> Self {
        Self {
            shell: Mutex::new(shell),
        }
    }
}

/// Run `f` against the managed shell on the calling thread
pub fn with_shell<R, T, F>(app: &AppHandle<R>, f: F) -> Result<T>
where
    R: Runtime,
    F: FnOnce(&mut Shell) -> T,
{
    let state = app
        .try_state::<AppState>()
        .ok_or_else(|| AppError::Internal("shell is not initialised".to_string()))?;
    let mut shell = state
        .shell
        .lock()
        .map_err(|_| AppError::Internal("shell lock poisoned".to_string()))?;
    Ok(f(&mut shell))
}

async fn with_shell_blocking<T, F>(app: AppHandle, f: F) -> Result<T>
where
    F: FnOnce(&mut Shell) -> T + Send + 'static,
    T: Send + 'static,
{
    tauri::async_runtime::spawn_blocking(move || with_shell(&app, f))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
}

/// Show the loading screen again and retry embedding
#[tauri::command]
pub async fn refresh_app(app: AppHandle) -> Result<()> {
    with_shell_blocking(app, |shell| shell.refresh()).await
}

/// Open the server page in the system browser
#[tauri::command]
pub async fn open_in_browser(app: AppHandle) -> Result<OpenOutcome> {
    with_shell_blocking(app, |shell| shell.open_in_browser()).await
}

/// Screen to draw when the shell page (re)loads
#[tauri::command]
pub async fn current_screen(app: AppHandle) -> Result<Screen> {
    with_shell_blocking(app, |shell| shell.screen().clone()).await
}
