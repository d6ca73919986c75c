//! Broker URL parsing

use anyhow::{anyhow, bail, Result};
use std::fmt;
use std::str::FromStr;

const MQTT_PORT: u16 = 1883;
const MQTTS_PORT: u16 = 8883;

/// A parsed `scheme://host[:port]` broker address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerUrl {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl FromStr for BrokerUrl {
    type Err = anyhow::Error;

    fn from_str(url: &str) -> Result<Self> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| anyhow!("broker url {:?} has no scheme", url))?;

        let tls = match scheme.to_ascii_lowercase().as_str() {
            "tcp" | "mqtt" => false,
            "ssl" | "tls" | "tcps" | "mqtts" => true,
            other => bail!("unsupported broker scheme {:?}", other),
        };
        let default_port = if tls { MQTTS_PORT } else { MQTT_PORT };

        let authority = rest.trim_end_matches('/');
        let (host, port) = split_host_port(authority)?;
        if host.is_empty() {
            bail!("broker url {:?} has no host", url);
        }

        Ok(Self {
            host: host.to_string(),
            port: port.unwrap_or(default_port),
            tls,
        })
    }
}

fn split_host_port(authority: &str) -> Result<(&str, Option<u16>)> {
    // [v6addr]:port
    if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, tail) = bracketed
            .split_once(']')
            .ok_or_else(|| anyhow!("unterminated IPv6 address in {:?}", authority))?;
        return match tail {
            "" => Ok((host, None)),
            _ => match tail.strip_prefix(':') {
                Some(port) => Ok((host, Some(parse_port(port)?))),
                None => bail!("unexpected {:?} after IPv6 address", tail),
            },
        };
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => Ok((host, Some(parse_port(port)?))),
        None => Ok((authority, None)),
    }
}

fn parse_port(port: &str) -> Result<u16> {
    port.parse()
        .map_err(|e| anyhow!("invalid broker port {:?}: {}", port, e))
}

impl fmt::Display for BrokerUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.tls { "ssl" } else { "tcp" };
        if self.host.contains(':') {
            write!(f, "{}://[{}]:{}", scheme, self.host, self.port)
        } else {
            write!(f, "{}://{}:{}", scheme, self.host, self.port)
        }
    }
}
