use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;

/// Runtime configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub lock_timeout: Duration,
    pub sweep_interval: Option<Duration>,
    pub max_connections: u32,
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            lock_timeout: Duration::from_millis(2000),
            sweep_interval: None,
            max_connections: 5,
            enable_cors: true,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = ServerConfig::default();

        if let Some(addr) = env_var("BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .with_context(|| format!("BIND_ADDR '{addr}' is not a socket address"))?;
        }
        if let Some(ms) = env_var("LOCK_TIMEOUT_MS") {
            let ms: u64 = ms.parse().context("LOCK_TIMEOUT_MS must be an integer")?;
            config.lock_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = env_var("SWEEP_INTERVAL_SECS") {
            let secs: u64 = secs.parse().context("SWEEP_INTERVAL_SECS must be an integer")?;
            config.sweep_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(max) = env_var("DB_MAX_CONNECTIONS") {
            config.max_connections = max.parse().context("DB_MAX_CONNECTIONS must be an integer")?;
        }
        if let Some(cors) = env_var("ENABLE_CORS") {
            config.enable_cors = matches!(cors.as_str(), "1" | "true" | "yes");
        }

        Ok(config)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

pub fn database_url() -> anyhow::Result<String> {
    std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")
}
