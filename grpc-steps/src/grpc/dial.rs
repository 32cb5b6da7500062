//! # Dialing
//!
//! Turns a registered address and its ordered dial options into a `tonic` [`Channel`].
//!
//! Addresses follow the Go convention used by most gRPC tooling: `:9090` means the local
//! host, and a missing scheme defaults to plain-text `http://`.
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum DialError {
    #[error("Invalid address '{0}': {1}")]
    InvalidAddress(String, #[source] tonic::transport::Error),
    #[error("Invalid user agent '{0}': {1}")]
    InvalidUserAgent(String, #[source] tonic::transport::Error),
    #[error("Failed to connect to '{0}': {1}")]
    ConnectionFailed(String, #[source] tonic::transport::Error),
}

/// A single setting applied to the [`Endpoint`] before connecting.
///
/// Options are applied in registration order, so a later option for the same setting wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialOption {
    ConnectTimeout(Duration),
    TcpNodelay(bool),
    TcpKeepalive(Option<Duration>),
    Http2KeepAliveInterval(Duration),
    KeepAliveTimeout(Duration),
    KeepAliveWhileIdle(bool),
    UserAgent(String),
    InitialStreamWindowSize(u32),
    InitialConnectionWindowSize(u32),
    ConcurrencyLimit(usize),
}

impl DialOption {
    fn apply(&self, endpoint: Endpoint) -> Result<Endpoint, DialError> {
        let endpoint = match self {
            DialOption::ConnectTimeout(timeout) => endpoint.connect_timeout(*timeout),
            DialOption::TcpNodelay(enabled) => endpoint.tcp_nodelay(*enabled),
            DialOption::TcpKeepalive(interval) => endpoint.tcp_keepalive(*interval),
            DialOption::Http2KeepAliveInterval(interval) => {
                endpoint.http2_keep_alive_interval(*interval)
            }
            DialOption::KeepAliveTimeout(timeout) => endpoint.keep_alive_timeout(*timeout),
            DialOption::KeepAliveWhileIdle(enabled) => endpoint.keep_alive_while_idle(*enabled),
            DialOption::UserAgent(agent) => endpoint
                .user_agent(agent.clone())
                .map_err(|e| DialError::InvalidUserAgent(agent.clone(), e))?,
            DialOption::InitialStreamWindowSize(size) => {
                endpoint.initial_stream_window_size(Some(*size))
            }
            DialOption::InitialConnectionWindowSize(size) => {
                endpoint.initial_connection_window_size(Some(*size))
            }
            DialOption::ConcurrencyLimit(limit) => endpoint.concurrency_limit(*limit),
        };

        Ok(endpoint)
    }
}

/// Normalizes an address into a URI `tonic` can dial.
///
/// * `:9090` → `http://127.0.0.1:9090`
/// * `localhost:50051` → `http://localhost:50051`
/// * `https://api.example.com` is kept as is.
pub fn to_uri(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else if address.starts_with(':') {
        format!("http://127.0.0.1{address}")
    } else {
        format!("http://{address}")
    }
}

/// Opens a channel to `address`, applying `options` in order.
pub async fn connect(address: &str, options: &[DialOption]) -> Result<Channel, DialError> {
    let uri = to_uri(address);

    let mut endpoint = Endpoint::from_shared(uri.clone())
        .map_err(|e| DialError::InvalidAddress(address.to_string(), e))?;

    for option in options {
        endpoint = option.apply(endpoint)?;
    }

    debug!(%uri, options = options.len(), "dialing");

    endpoint
        .connect()
        .await
        .map_err(|e| DialError::ConnectionFailed(address.to_string(), e))
}
