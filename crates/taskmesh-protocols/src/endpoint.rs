//! Manager endpoints.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Address at which a manager can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Endpoint {
    /// Manager living in this OS process, resolved through an in-process hub.
    InProcess(String),
    /// Manager reachable over TCP (`host:port`).
    Tcp(String),
}

impl Endpoint {
    pub fn in_process(name: impl Into<String>) -> Self {
        Endpoint::InProcess(name.into())
    }

    pub fn tcp(addr: impl Into<String>) -> Self {
        Endpoint::Tcp(addr.into())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::InProcess(name) => write!(f, "inproc://{}", name),
            Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
        }
    }
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(name) = s.strip_prefix("inproc://") {
            if name.is_empty() {
                return Err("empty in-process endpoint name".to_string());
            }
            Ok(Endpoint::InProcess(name.to_string()))
        } else if let Some(addr) = s.strip_prefix("tcp://") {
            if !addr.contains(':') {
                return Err(format!("tcp endpoint needs host:port: {}", s));
            }
            Ok(Endpoint::Tcp(addr.to_string()))
        } else {
            Err(format!("unsupported endpoint: {}", s))
        }
    }
}

impl TryFrom<String> for Endpoint {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoints() {
        assert_eq!(
            "inproc://gcm".parse::<Endpoint>().unwrap(),
            Endpoint::in_process("gcm")
        );
        assert_eq!(
            "tcp://127.0.0.1:7400".parse::<Endpoint>().unwrap(),
            Endpoint::tcp("127.0.0.1:7400")
        );
        assert!("tcp://nohost".parse::<Endpoint>().is_err());
        assert!("udp://x:1".parse::<Endpoint>().is_err());
        assert!("inproc://".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_endpoint_serde_uses_url_form() {
        let json = serde_json::to_string(&Endpoint::tcp("localhost:1")).unwrap();
        assert_eq!(json, "\"tcp://localhost:1\"");
        let parsed: Endpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, Endpoint::tcp("localhost:1"));
    }
}
