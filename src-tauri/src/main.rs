//! NCERT Audio Extractor entry point
//!
//! The shell logic lives in lib.rs so the mobile targets can share it.

// Prevents additional console window on Windows in release
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

fn main() {
    ncert_shell_lib::run()
}
