use std::num::ParseIntError;
use thiserror::Error;

pub const USAGE: &str = "Usage: tcpproxy remote_host remote_port proxy_server_port";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub target: TargetConfig,
    pub listen: ListenConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenConfig {
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    pub host: String,
    pub port: u16,
}

impl TargetConfig {
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Wrong number of positional arguments.
    #[error("{}", USAGE)]
    Usage,
    #[error("Invalid {name} '{value}': expected a port number")]
    InvalidPort {
        name: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
}

impl Config {
    /// Builds the configuration from the positional arguments, program name excluded:
    /// `remote_host remote_port proxy_listen_port`.
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let [host, remote_port, listen_port] = <[String; 3]>::try_from(args)
            .map_err(|_| ConfigError::Usage)?;

        Ok(Self {
            target: TargetConfig {
                port: parse_port("remote_port", &remote_port)?,
                host,
            },
            listen: ListenConfig {
                port: parse_port("proxy_server_port", &listen_port)?,
            },
        })
    }
}

fn parse_port(name: &'static str, value: &str) -> Result<u16, ConfigError> {
    value
        .parse()
        .map_err(|source| ConfigError::InvalidPort {
            name,
            value: value.to_string(),
            source,
        })
}
