//! Shared types for the shell
//!
//! A `Screen` is the whole content of the shell window. It is sent to the
//! shell page as one value, so switching screens replaces everything that
//! was shown before.

use serde::Serialize;

pub const APP_NAME: &str = "NCERT Audio Extractor";
pub const REFRESHING_STATUS: &str = "Refreshing...";

/// Lifecycle phase of the shell
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Loading,
    Embedded,
    Fallback,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Refresh,
    OpenInBrowser,
}

/// A button on the shell page, bound to a command
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Control {
    pub action: Action,
    pub label: &'static str,
}

impl Control {
    pub fn refresh() -> Self {
        Self {
            action: Action::Refresh,
            label: "🔄 Refresh App",
        }
    }

    pub fn open_in_browser() -> Self {
        Self {
            action: Action::OpenInBrowser,
            label: "🌐 Open in Browser",
        }
    }

    pub fn standard_set() -> Vec<Self> {
        vec![Self::refresh(), Self::open_in_browser()]
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Screen {
    Loading {
        status: String,
        controls: Vec<Control>,
    },
    Embedded {
        url: String,
    },
    Fallback {
        message: String,
        url: String,
        /// Why the shell ended up here, when it was not simply a missing web view
        notice: Option<String>,
        controls: Vec<Control>,
    },
}

impl Screen {
    pub fn loading(status: impl Into<String>) -> Self {
        Screen::Loading {
            status: status.into(),
            controls: Control::standard_set(),
        }
    }

    pub fn fallback(url: &str, notice: Option<String>) -> Self {
        Screen::Fallback {
            message: fallback_message(url),
            url: url.to_string(),
            notice,
            controls: Control::standard_set(),
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            Screen::Loading { .. } => Phase::Loading,
            Screen::Embedded { .. } => Phase::Embedded,
            Screen::Fallback { .. } => Phase::Fallback,
        }
    }
}

pub fn starting_status() -> String {
    format!(
        "Starting {}...\nPlease wait while the server initializes.",
        APP_NAME
    )
}

pub fn error_status(message: &str) -> String {
    format!("❌ Error: {}\n\nTry refreshing or check logs.", message)
}

pub fn fallback_message(url: &str) -> String {
    format!(
        "📱 {} is running!\n\
         \n\
         🌐 Server URL: {}\n\
         \n\
         📋 Features Available:\n\
         • YouTube audio extraction\n\
         • Telegram bot integration\n\
         • Audio file management\n\
         • Batch downloads\n\
         \n\
         💡 Use the \"Open in Browser\" button below\n\
         to access the full web interface.\n\
         \n\
         🔄 Use \"Refresh\" if the app becomes unresponsive.",
        APP_NAME, url
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_serializes_with_kind_tag() {
        let json = serde_json::to_value(Screen::Embedded {
            url: "http://127.0.0.1:8000/".to_string(),
        })
        .unwrap();
        assert_eq!(json["kind"], "embedded");
        assert_eq!(json["url"], "http://127.0.0.1:8000/");

        let json = serde_json::to_value(Screen::loading("Refreshing...")).unwrap();
        assert_eq!(json["kind"], "loading");
        assert_eq!(json["controls"][0]["action"], "refresh");
        assert_eq!(json["controls"][1]["action"], "open_in_browser");
    }

    #[test]
    fn test_fallback_message_mentions_url() {
        let screen = Screen::fallback("http://127.0.0.1:8000/", None);
        match &screen {
            Screen::Fallback { message, url, .. } => {
                assert!(message.contains("Server URL: http://127.0.0.1:8000/"));
                assert!(message.contains("Batch downloads"));
                assert_eq!(url, "http://127.0.0.1:8000/");
            }
            other => panic!("unexpected screen {:?}", other),
        }
        assert_eq!(screen.phase(), Phase::Fallback);
    }

    #[test]
    fn test_error_status() {
        assert_eq!(
            error_status("Server error: boom"),
            "❌ Error: Server error: boom\n\nTry refreshing or check logs."
        );
    }
}
