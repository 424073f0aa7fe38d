use std::fmt;
use std::str::FromStr;

use crate::error::TransportError;

/// Default INDI server port.
pub const DEFAULT_PORT: u16 = 7624;

/// Host and port of an INDI server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    host: String,
    port: u16,
}

impl ServerAddress {
    /// Create an address; an empty host is rejected.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, TransportError> {
        let host = host.into();
        let trimmed = host.trim();
        if trimmed.is_empty() {
            return Err(TransportError::InvalidAddress(host));
        }
        Ok(Self {
            host: trimmed.to_string(),
            port,
        })
    }

    /// Host name or IP literal (without brackets).
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Same host, different port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for ServerAddress {
    type Err = TransportError;

    /// Accepts `host`, `host:port`, `[v6]` and `[v6]:port`. A bare IPv6
    /// literal without brackets is taken as a host with the default port.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || TransportError::InvalidAddress(input.to_string());
        let input_trimmed = input.trim();
        if input_trimmed.is_empty() {
            return Err(invalid());
        }

        if let Some(rest) = input_trimmed.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
            let port = match tail {
                "" => DEFAULT_PORT,
                _ => parse_port(tail.strip_prefix(':').ok_or_else(invalid)?).ok_or_else(invalid)?,
            };
            return ServerAddress::new(host, port);
        }

        match input_trimmed.matches(':').count() {
            0 => ServerAddress::new(input_trimmed, DEFAULT_PORT),
            1 => {
                let (host, port) = input_trimmed.split_once(':').ok_or_else(invalid)?;
                let port = parse_port(port).ok_or_else(invalid)?;
                ServerAddress::new(host, port)
            }
            _ => ServerAddress::new(input_trimmed, DEFAULT_PORT),
        }
    }
}

fn parse_port(input: &str) -> Option<u16> {
    match input.trim().parse::<u16>() {
        Ok(0) | Err(_) => None,
        Ok(port) => Some(port),
    }
}
