use flowcast_core::log::DEFAULT_LOG_CAPACITY;

use crate::retry::RetryPolicy;

/// Default stream endpoint of a local `flowcast-server`.
pub const DEFAULT_STREAM_URL: &str = "http://127.0.0.1:3001/api/flow-stream";

pub const DEFAULT_MALFORMED_FRAME_LIMIT: u32 = 3;

/// Consumer configuration.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub url: String,
    /// Policy used by [`crate::FlowConsumer::run_with_retry`].
    pub retry: RetryPolicy,
    /// Maximum number of log lines kept.
    pub log_capacity: usize,
    /// Consecutive malformed frames a session drops before it fails with a
    /// parse fault. Any well-formed frame resets the count.
    pub malformed_frame_limit: u32,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.into(),
            retry: RetryPolicy::default(),
            log_capacity: DEFAULT_LOG_CAPACITY,
            malformed_frame_limit: DEFAULT_MALFORMED_FRAME_LIMIT,
        }
    }
}

impl ConsumerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Stream URL for a named dataset on the same server.
    pub fn for_dataset(mut self, dataset: &str) -> Self {
        match reqwest::Url::parse(&self.url) {
            Ok(mut url) => {
                url.query_pairs_mut().clear().append_pair("dataset", dataset);
                self.url = url.into();
            }
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "stream url is not absolute, dataset not applied");
            }
        }
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    pub fn with_malformed_frame_limit(mut self, limit: u32) -> Self {
        self.malformed_frame_limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ConsumerConfig::default();
        assert_eq!(config.url, DEFAULT_STREAM_URL);
        assert_eq!(config.log_capacity, 100);
        assert_eq!(config.malformed_frame_limit, 3);
    }

    #[test]
    fn dataset_query_replaces_existing() {
        let config = ConsumerConfig::new("http://host/api/flow-stream?dataset=a").for_dataset("quickstart");
        assert_eq!(config.url, "http://host/api/flow-stream?dataset=quickstart");
    }

    #[test]
    fn dataset_name_is_encoded() {
        let config = ConsumerConfig::default().for_dataset("a&b+c#1 x");
        assert_eq!(
            config.url,
            "http://127.0.0.1:3001/api/flow-stream?dataset=a%26b%2Bc%231+x"
        );
    }

    #[test]
    fn relative_url_is_left_alone() {
        let config = ConsumerConfig::new("/api/flow-stream").for_dataset("quickstart");
        assert_eq!(config.url, "/api/flow-stream");
    }
}
