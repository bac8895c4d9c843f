//! Opening the server page in the system browser
//!
//! Openers are tried in order until one succeeds. Failures are logged and
//! swallowed; the fallback screen already tells the user what to do.

use crate::error::{AppError, Result};
use log::{error, info, warn};
use serde::Serialize;

pub trait BrowserOpener: Send + Sync {
    fn name(&self) -> &str;
    fn open(&self, url: &str) -> Result<()>;
}

/// Generic cross-platform opener (xdg-open, `open`, `start`, ...)
pub struct SystemOpener;

impl BrowserOpener for SystemOpener {
    fn name(&self) -> &str {
        "system opener"
    }

    fn open(&self, url: &str) -> Result<()> {
        open::that(url).map_err(|e| AppError::BrowserOpen {
            opener: self.name().to_string(),
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OpenOutcome {
    /// Name of the opener that succeeded
    pub opened_by: Option<String>,
    /// Every opener tried, in order
    pub attempts: Vec<String>,
}

impl OpenOutcome {
    pub fn opened(&self) -> bool {
        self.opened_by.is_some()
    }
}

#[derive(Default)]
pub struct BrowserFallback {
    openers: Vec<Box<dyn BrowserOpener>>,
}

impl BrowserFallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, opener: impl BrowserOpener + 'static) -> Self {
        self.openers.push(Box::new(opener));
        self
    }

    pub fn open(&self, url: &str) -> OpenOutcome {
        let mut outcome = OpenOutcome::default();

        for opener in &self.openers {
            outcome.attempts.push(opener.name().to_string());
            match opener.open(url) {
                Ok(()) => {
                    info!("opened {} with {}", url, opener.name());
                    outcome.opened_by = Some(opener.name().to_string());
                    return outcome;
                }
                Err(e) => warn!("{}", e),
            }
        }

        error!("all browser openers failed for {}", url);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct ScriptedOpener {
        name: &'static str,
        fail: bool,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl BrowserOpener for ScriptedOpener {
        fn name(&self) -> &str {
            self.name
        }

        fn open(&self, url: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("{}:{}", self.name, url));
            if self.fail {
                Err(AppError::BrowserOpen {
                    opener: self.name.to_string(),
                    reason: "no activity found".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn opener(name: &'static str, fail: bool, calls: &Arc<Mutex<Vec<String>>>) -> ScriptedOpener {
        ScriptedOpener {
            name,
            fail,
            calls: calls.clone(),
        }
    }

    #[test]
    fn test_second_opener_used_when_first_fails() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let fallback = BrowserFallback::new()
            .with(opener("intent", true, &calls))
            .with(opener("generic", false, &calls));

        let outcome = fallback.open("http://127.0.0.1:8000/");
        assert_eq!(outcome.opened_by.as_deref(), Some("generic"));
        assert_eq!(outcome.attempts, vec!["intent", "generic"]);
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["intent:http://127.0.0.1:8000/", "generic:http://127.0.0.1:8000/"]
        );
    }

    #[test]
    fn test_stops_at_first_success() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let fallback = BrowserFallback::new()
            .with(opener("intent", false, &calls))
            .with(opener("generic", false, &calls));

        let outcome = fallback.open("http://127.0.0.1:8000/");
        assert_eq!(outcome.opened_by.as_deref(), Some("intent"));
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_all_failures_are_swallowed() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let fallback = BrowserFallback::new()
            .with(opener("intent", true, &calls))
            .with(opener("generic", true, &calls));

        let outcome = fallback.open("http://127.0.0.1:8000/");
        assert!(!outcome.opened());
        assert_eq!(outcome.attempts.len(), 2);
    }

    #[test]
    fn test_no_openers() {
        let outcome = BrowserFallback::new().open("http://127.0.0.1:8000/");
        assert!(!outcome.opened());
        assert!(outcome.attempts.is_empty());
    }
}
