//! Server readiness check
//!
//! A server counts as ready once it answers an HTTP request at all; the
//! status code is irrelevant, a 500 page still means the socket is serving.

use crate::error::{AppError, Result};
use log::debug;
use std::time::Duration;
use url::Url;

pub trait ReadinessProbe: Send + Sync {
    fn is_ready(&self, url: &Url) -> bool;
}

pub struct HttpProbe {
    client: reqwest::blocking::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        // The server is local, never route the probe through a proxy
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| AppError::Internal(format!("could not build probe client: {}", e)))?;
        Ok(Self { client })
    }
}

impl ReadinessProbe for HttpProbe {
    fn is_ready(&self, url: &Url) -> bool {
        match self.client.get(url.clone()).send() {
            Ok(response) => {
                debug!("probe {} answered {}", url, response.status());
                true
            }
            Err(e) => {
                debug!("probe {} failed: {}", url, e);
                false
            }
        }
    }
}
