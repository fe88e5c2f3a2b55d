use anyhow::{Context, Result};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;

use super::config::Config;

pub fn build_request(config: &Config) -> Result<Request> {
    let url = config.url();
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        anyhow::bail!("agent url must use ws:// or wss://, got {}", url);
    }
    let request = url
        .into_client_request()
        .with_context(|| format!("invalid agent url: {}", url))?;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_request_for_websocket_url() {
        let config = Config::builder().with_url("ws://localhost:8765").build();
        let request = build_request(&config).unwrap();
        assert_eq!(request.uri().host(), Some("localhost"));
        assert_eq!(request.uri().port_u16(), Some(8765));
    }

    #[test]
    fn rejects_non_websocket_url() {
        let config = Config::builder().with_url("http://localhost:8765").build();
        let err = build_request(&config).unwrap_err();
        assert!(err.to_string().contains("ws://"));
    }
}
