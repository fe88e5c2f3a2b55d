use std::time::Duration;

use super::consts;

#[derive(Debug, Clone)]
pub struct Config {
    url: String,
    connect_timeout: Duration,
    capacity: usize,
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.config.url = url.to_string();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Frames buffered in each direction before sends start failing.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            url: consts::DEFAULT_URL.to_string(),
            connect_timeout: Duration::from_secs(consts::DEFAULT_CONNECT_TIMEOUT_SECS),
            capacity: consts::DEFAULT_CAPACITY,
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
