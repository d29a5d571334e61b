// config lets you read a separate config file, layered over defaults and
// overridden by DATOREST_* environment variables
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub store: String,
    pub db: String,
    pub timeout_ms: u64,
    pub max_idle_connections: usize,
    // create the database on startup
    pub create: bool,
    pub log_filter: String,
}

impl Settings {
    /// Loads `path` if given (it must exist then), otherwise an optional
    /// `datorest.*` file from the working directory.
    pub fn load(path: Option<&str>) -> Result<Settings> {
        let file = match path {
            Some(p) => File::with_name(p).required(true),
            None => File::with_name("datorest").required(false),
        };
        let settings = Config::builder()
            .set_default("host", "localhost")?
            .set_default("port", 8888_i64)?
            .set_default("store", "mem")?
            .set_default("db", "test")?
            .set_default("timeout_ms", 3000_i64)?
            .set_default("max_idle_connections", 20_i64)?
            .set_default("create", false)?
            .set_default("log_filter", "info")?
            .add_source(file)
            .add_source(Environment::with_prefix("DATOREST"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 8888,
            store: "mem".into(),
            db: "test".into(),
            timeout_ms: 3000,
            max_idle_connections: 20,
            create: false,
            log_filter: "info".into(),
        }
    }
}
