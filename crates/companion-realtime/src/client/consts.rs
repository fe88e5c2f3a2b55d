pub const DEFAULT_URL: &str = "ws://localhost:8765";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CAPACITY: usize = 1024;
