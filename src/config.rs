//! Server configuration read from environment variables.
use std::net::IpAddr;

use thiserror::Error;

use crate::balance::UntrackedPolicy;

pub const DEFAULT_DATABASE_NAME: &str = "OpenSplit";
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("you need to add {0} to the env")]
    Missing(&'static str),

    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub mongodb_uri: String,
    pub database_name: String,
    pub bind_address: IpAddr,
    pub port: u16,
    /// Origin of the web frontend. Any origin is allowed when unset.
    pub allowed_origin: Option<String>,
    pub untracked_policy: UntrackedPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mongodb_uri = lookup("MONGODB_URI").ok_or(ConfigError::Missing("MONGODB_URI"))?;
        let database_name =
            lookup("DATABASE_NAME").unwrap_or_else(|| DEFAULT_DATABASE_NAME.to_string());
        let bind_address = parse_or(&lookup, "BIND_ADDRESS", IpAddr::from([0, 0, 0, 0]))?;
        let port = parse_or(&lookup, "PORT", DEFAULT_PORT)?;
        let allowed_origin = lookup("ALLOWED_ORIGIN").filter(|origin| !origin.is_empty());
        let untracked_policy = parse_or(&lookup, "UNTRACKED_POLICY", UntrackedPolicy::Drop)?;

        Ok(Config {
            mongodb_uri,
            database_name,
            bind_address,
            port,
            allowed_origin,
            untracked_policy,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|err: T::Err| ConfigError::Invalid {
            name,
            reason: err.to_string(),
            value,
        }),
    }
}
