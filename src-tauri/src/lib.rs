//! NCERT Audio Extractor shell
//!
//! Starts the Python web application on a background thread, then shows it
//! inside the app window, or falls back to the system browser when the
//! window cannot embed it.

pub mod browser;
pub mod commands;
pub mod config;
pub mod desktop;
pub mod error;
pub mod probe;
pub mod retry;
pub mod server;
pub mod shell;
pub mod types;

use commands::AppState;
use config::ShellConfig;
use server::PythonWebApp;
use std::sync::Arc;
use tauri::{Manager, RunEvent, WindowEvent};

/// Initialize and run the Tauri application
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        // Register plugins
        .plugin(
            tauri_plugin_log::Builder::default()
                .level(log::LevelFilter::Info)
                .build(),
        )
        .plugin(tauri_plugin_shell::init())
        // Register IPC commands
        .invoke_handler(tauri::generate_handler![
            commands::refresh_app,
            commands::open_in_browser,
            commands::current_screen,
        ])
        .setup(|app| {
            log::info!("starting {}", types::APP_NAME);
            let handle = app.handle().clone();

            let mut config = ShellConfig::from_env()?;
            desktop::resolve_app_dir(&handle, &mut config);
            let web_app = Arc::new(PythonWebApp::new(config.launch.clone()));

            let shell = desktop::build_shell(&handle, config)?;
            app.manage(AppState::new(shell));
            commands::with_shell(&handle, |shell| shell.start(web_app))?;
            Ok(())
        })
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app_handle, event| match event {
            RunEvent::WindowEvent {
                label,
                event: WindowEvent::Focused(false),
                ..
            } if label == desktop::MAIN_WINDOW => {
                let minimized = app_handle
                    .get_webview_window(&label)
                    .and_then(|window| window.is_minimized().ok())
                    .unwrap_or(false);
                if minimized {
                    if let Err(e) = commands::with_shell(app_handle, |shell| shell.on_pause()) {
                        log::error!("failed to pause shell: {}", e);
                    }
                }
            }
            RunEvent::Resumed => {
                if let Err(e) = commands::with_shell(app_handle, |shell| shell.on_resume()) {
                    log::error!("failed to resume shell: {}", e);
                }
            }
            RunEvent::Exit => {
                if let Err(e) = commands::with_shell(app_handle, |shell| shell.shutdown()) {
                    log::error!("failed to stop server on exit: {}", e);
                }
            }
            _ => {}
        });
}
