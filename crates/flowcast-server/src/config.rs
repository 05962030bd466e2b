use std::path::PathBuf;
use std::time::Duration;

use crate::emitter::EmitterOptions;

/// Server configuration, read once at startup.
///
/// | Variable                     | Purpose                                 |
/// |------------------------------|-----------------------------------------|
/// | `FLOWCAST_ADDR`              | Bind address (default `0.0.0.0:3001`)   |
/// | `FLOWCAST_WARMUP_MS`         | Delay before the first event            |
/// | `FLOWCAST_MAX_PLAYBACK_SECS` | Upper bound on one playback             |
/// | `FLOWCAST_WRITE_TIMEOUT_MS`  | Upper bound on one frame write          |
/// | `FLOWCAST_DATASET_FILE`      | Extra JSON dataset to serve             |
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub warmup: Duration,
    pub max_playback: Duration,
    pub write_timeout: Duration,
    pub dataset_file: Option<PathBuf>,
    /// Frames buffered between the emitter and the HTTP body.
    pub frame_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let emitter = EmitterOptions::default();
        Self {
            addr: "0.0.0.0:3001".into(),
            warmup: emitter.warmup,
            max_playback: emitter.max_playback,
            write_timeout: emitter.write_timeout,
            dataset_file: None,
            frame_buffer: 16,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unparseable values are
    /// logged and ignored.
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("FLOWCAST_ADDR") {
            config.addr = addr;
        }
        if let Some(ms) = parse_u64(&lookup, "FLOWCAST_WARMUP_MS") {
            config.warmup = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_u64(&lookup, "FLOWCAST_MAX_PLAYBACK_SECS") {
            config.max_playback = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_u64(&lookup, "FLOWCAST_WRITE_TIMEOUT_MS") {
            config.write_timeout = Duration::from_millis(ms);
        }
        if let Some(path) = lookup("FLOWCAST_DATASET_FILE") {
            config.dataset_file = Some(PathBuf::from(path));
        }
        config
    }

    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn with_max_playback(mut self, max_playback: Duration) -> Self {
        self.max_playback = max_playback;
        self
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    pub fn with_dataset_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.dataset_file = Some(path.into());
        self
    }

    pub fn emitter_options(&self) -> EmitterOptions {
        EmitterOptions {
            warmup: self.warmup,
            max_playback: self.max_playback,
            write_timeout: self.write_timeout,
        }
    }
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable configuration value");
            None
        }
    }
}
