use std::{env, fmt::Display, net::IpAddr, net::SocketAddr, path::PathBuf, str::FromStr};

use anyhow::anyhow;
use tracing::info;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub db_path: PathBuf,
    pub meals_path: Option<PathBuf>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self {
            host: try_load("EATS_HOST", "127.0.0.1")?,
            port: try_load("EATS_PORT", "8000")?,
            db_path: try_load("EATS_DB_PATH", "eats-db")?,
            meals_path: env::var("EATS_MEALS_PATH").ok().map(PathBuf::from),
        })
    }

    /// The first command line argument, when present, is the port.
    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> anyhow::Result<Self> {
        if let Some(port) = args.into_iter().next() {
            self.port = port
                .parse()
                .map_err(|e| anyhow!("Invalid port argument {port:?}: {e}"))?;
        }
        Ok(self)
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse().map_err(|e| anyhow!("Invalid {key} value {raw:?}: {e}"))
}
