//! The transport underneath a [`crate::database::Database`].
//!
//! The core only ever sees [`Connection::request`]: a method, a path and a
//! flat set of form fields go in, a status code and a decoded body come out.
//! Pooling, timeouts and anything else socket related belong to the
//! implementation; [`HttpConnection`] is the one used outside of tests.

use std::fmt;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONNECTION, HeaderMap, HeaderValue};
use tracing::trace;

use crate::edn::{self, Edn};
use crate::error::Result;
use crate::settings::Settings;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}
impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// Status plus decoded body. Checking the status is up to the caller.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Edn,
}

pub trait Connection: Send + Sync {
    fn request(&self, method: Method, path: &str, fields: &[(String, String)]) -> Result<Response>;
}

// ------------- HTTP -------------
pub struct HttpConnection {
    client: Client,
    base_url: String,
}

impl HttpConnection {
    pub fn new(base_url: &str, timeout: Duration, max_idle_connections: usize) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/edn"));
        headers.insert(CONNECTION, HeaderValue::from_static("Keep-Alive"));
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(max_idle_connections)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            &settings.base_url(),
            Duration::from_millis(settings.timeout_ms),
            settings.max_idle_connections,
        )
    }
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Connection for HttpConnection {
    fn request(&self, method: Method, path: &str, fields: &[(String, String)]) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        let request = match method {
            Method::Get => self.client.get(&url).query(fields),
            Method::Post => self.client.post(&url).form(fields),
        };
        let response = request.send()?;
        let status = response.status().as_u16();
        let text = response.text()?;
        trace!(%method, %url, status, bytes = text.len(), "response received");
        let body = if text.trim().is_empty() {
            Edn::Nil
        } else {
            match edn::parse(&text) {
                Ok(body) => body,
                // error pages are rarely EDN, keep them for the diagnostic
                Err(_) if !(200..300).contains(&status) => Edn::String(text),
                Err(e) => return Err(e),
            }
        };
        Ok(Response { status, body })
    }
}
