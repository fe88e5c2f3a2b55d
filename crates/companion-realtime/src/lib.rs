mod client;

pub use client::config::{Config, ConfigBuilder};
pub use client::stats::Stats;
pub use client::{Client, ClientTx};
pub use companion_core::transport::ServerRx;
pub use companion_types as types;
