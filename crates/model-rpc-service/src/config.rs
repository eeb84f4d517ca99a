// model-rpc-service/src/config.rs

use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use tracing::info;

use crate::models::ModelDescriptor;

pub const DEFAULT_BIND_ADDRESS: &str = "tcp://0.0.0.0:4242";
pub const DEFAULT_CLIENT_ENDPOINT: &str = "tcp://127.0.0.1:4242";

/// Deployment profile selected through `APP_SETTINGS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Prod,
    Beta,
    Test,
    Dev,
}

impl Profile {
    pub fn name(&self) -> &'static str {
        match self {
            Profile::Prod => "prod",
            Profile::Beta => "beta",
            Profile::Test => "test",
            Profile::Dev => "dev",
        }
    }

    /// Models every profile hosts unless `MODELS` overrides them.
    pub fn default_models(&self) -> Vec<ModelDescriptor> {
        vec![ModelDescriptor::new("iris_model.iris_predict", "IrisModel")]
    }

    /// All profiles currently bind the same port.
    pub fn default_bind_address(&self) -> &'static str {
        DEFAULT_BIND_ADDRESS
    }
}

impl FromStr for Profile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prod" | "prodconfig" => Ok(Profile::Prod),
            "beta" | "betaconfig" => Ok(Profile::Beta),
            "test" | "testconfig" => Ok(Profile::Test),
            "dev" | "devconfig" => Ok(Profile::Dev),
            other => Err(anyhow!(
                "unknown APP_SETTINGS profile '{}'. Expected one of: prod, beta, test, dev",
                other
            )),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub profile: Profile,
    pub bind_address: String,
    pub models: Vec<ModelDescriptor>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup. `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let profile: Profile = lookup("APP_SETTINGS")
            .context("APP_SETTINGS environment variable not set. Please set it in your .env file")?
            .parse()?;

        let bind_address = lookup("BIND_ADDRESS")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| profile.default_bind_address().to_string());
        // Fail on a bad address now rather than after the models are loaded.
        parse_bind_address(&bind_address)?;

        let models = match lookup("MODELS").filter(|s| !s.trim().is_empty()) {
            Some(raw) => serde_json::from_str::<Vec<ModelDescriptor>>(&raw)
                .context("MODELS must be a JSON array of {\"load_target\", \"implementation_name\"} objects")?,
            None => profile.default_models(),
        };

        Ok(Self {
            profile,
            bind_address,
            models,
        })
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- Profile: {}", self.profile);
        info!("- Bind Address: {}", self.bind_address);
        info!("- Models: {}", self.models.len());
        for descriptor in &self.models {
            info!("  - {}", descriptor);
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        parse_bind_address(&self.bind_address)
    }
}

/// Resolve `tcp://host:port` or `host:port` to a socket address.
pub fn parse_bind_address(address: &str) -> Result<SocketAddr> {
    let trimmed = address.trim();
    let host_port = match trimmed.split_once("://") {
        Some(("tcp", rest)) => rest,
        Some((scheme, _)) => bail!("unsupported transport scheme '{}' in '{}'", scheme, address),
        None => trimmed,
    };

    host_port
        .to_socket_addrs()
        .with_context(|| format!("invalid bind address '{}'", address))?
        .next()
        .ok_or_else(|| anyhow!("bind address '{}' did not resolve", address))
}
