//! Publisher endpoint strings.

use crate::{Error, Result};
use std::fmt;

/// A TCP endpoint for the event publisher.
///
/// Accepted forms:
///
/// | Input | Meaning |
/// |-------|---------|
/// | `tcp://10.0.0.5:5556` | explicit host and port |
/// | `10.0.0.5:5556` | scheme is optional |
/// | `10.0.0.5:*`, `10.0.0.5` | ephemeral port chosen at bind time |
/// | `*:5556` | all interfaces |
/// | `[::1]:5556`, `::1` | IPv6 |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Creates an endpoint from a host and port (0 = ephemeral).
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses an endpoint string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for unsupported schemes, empty hosts
    /// and malformed ports.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let rest = match trimmed.split_once("://") {
            Some(("tcp", rest)) => rest,
            Some((scheme, _)) => {
                return Err(Error::InvalidInput(format!(
                    "unsupported endpoint scheme '{scheme}' in '{input}'"
                )));
            },
            None => trimmed,
        };

        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            let (host, tail) = bracketed.split_once(']').ok_or_else(|| {
                Error::InvalidInput(format!("unterminated IPv6 address in '{input}'"))
            })?;
            let port = match tail {
                "" => None,
                tail => Some(tail.strip_prefix(':').ok_or_else(|| {
                    Error::InvalidInput(format!("unexpected '{tail}' after IPv6 address"))
                })?),
            };
            (host, port)
        } else if rest.matches(':').count() > 1 {
            (rest, None)
        } else {
            match rest.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (rest, None),
            }
        };

        if host.is_empty() {
            return Err(Error::InvalidInput(format!("missing host in '{input}'")));
        }
        let host = if host == "*" { "0.0.0.0" } else { host };
        let port = match port {
            None | Some("" | "*") => 0,
            Some(port) => port
                .parse::<u16>()
                .map_err(|e| Error::InvalidInput(format!("invalid port '{port}': {e}")))?,
        };

        Ok(Self::new(host, port))
    }

    /// Returns the host part.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port (0 = ephemeral).
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "tcp://[{}]:{}", self.host, self.port)
        } else {
            write!(f, "tcp://{}:{}", self.host, self.port)
        }
    }
}
