//! # Service Options
//!
//! Per-service connection settings and the options that shape them.
use crate::grpc::dial::DialOption;
use std::net::SocketAddr;

/// Address used when no option sets one.
pub const DEFAULT_ADDRESS: &str = ":9090";

/// Connection settings shared by every method of a registered service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    pub address: String,
    pub dial_options: Vec<DialOption>,
    /// Headers sent with every call to the service.
    pub headers: Vec<(String, String)>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            dial_options: Vec::new(),
            headers: Vec::new(),
        }
    }
}

/// A setting applied to a service at registration time.
///
/// The singular list variants append, the plural ones replace the whole list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceOption {
    Address(String),
    DialOption(DialOption),
    DialOptions(Vec<DialOption>),
    Header(String, String),
    Headers(Vec<(String, String)>),
}

impl ServiceOption {
    pub fn address(address: impl Into<String>) -> Self {
        Self::Address(address.into())
    }

    /// Targets a listener's local address, e.g. a test server bound on port `0`.
    pub fn socket_addr(addr: SocketAddr) -> Self {
        Self::Address(addr.to_string())
    }

    pub fn dial_option(option: DialOption) -> Self {
        Self::DialOption(option)
    }

    pub fn dial_options(options: impl IntoIterator<Item = DialOption>) -> Self {
        Self::DialOptions(options.into_iter().collect())
    }

    pub fn header(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Header(key.into(), value.into())
    }

    pub fn headers<K, V>(headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Headers(
            headers
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub(crate) fn apply(&self, settings: &mut ServiceSettings) {
        match self {
            ServiceOption::Address(address) => settings.address = address.clone(),
            ServiceOption::DialOption(option) => settings.dial_options.push(option.clone()),
            ServiceOption::DialOptions(options) => settings.dial_options = options.clone(),
            ServiceOption::Header(key, value) => {
                settings.headers.push((key.clone(), value.clone()))
            }
            ServiceOption::Headers(headers) => settings.headers = headers.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn apply_all(options: &[ServiceOption]) -> ServiceSettings {
        let mut settings = ServiceSettings::default();
        for option in options {
            option.apply(&mut settings);
        }
        settings
    }

    #[test]
    fn later_address_wins() {
        let settings = apply_all(&[
            ServiceOption::address("localhost:1"),
            ServiceOption::address("localhost:2"),
        ]);
        assert_eq!(settings.address, "localhost:2");
    }

    #[test]
    fn dial_option_appends_and_dial_options_replaces() {
        let settings = apply_all(&[
            ServiceOption::dial_option(DialOption::TcpNodelay(true)),
            ServiceOption::dial_option(DialOption::ConnectTimeout(Duration::from_secs(1))),
        ]);
        assert_eq!(settings.dial_options.len(), 2);

        let settings = apply_all(&[
            ServiceOption::dial_option(DialOption::TcpNodelay(true)),
            ServiceOption::dial_options([DialOption::ConcurrencyLimit(4)]),
        ]);
        assert_eq!(settings.dial_options, vec![DialOption::ConcurrencyLimit(4)]);
    }

    #[test]
    fn header_appends_and_headers_replaces() {
        let settings = apply_all(&[
            ServiceOption::header("a", "1"),
            ServiceOption::header("b", "2"),
        ]);
        assert_eq!(settings.headers.len(), 2);

        let settings = apply_all(&[
            ServiceOption::header("a", "1"),
            ServiceOption::headers([("c", "3")]),
        ]);
        assert_eq!(settings.headers, vec![("c".to_string(), "3".to_string())]);
    }

    #[test]
    fn default_address_is_local_9090() {
        assert_eq!(ServiceSettings::default().address, ":9090");
    }
}
