use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use beacon_federation::FederationConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub federation: FederationConfig,
    pub sweep_interval: Duration,
    pub archive_enabled: bool,
    pub allow_delete_all: bool,
    pub icon_catalog: Option<PathBuf>,
    pub type_codes: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Unset keys take their defaults;
    /// set keys that fail to parse are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        fn parsed<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T>
        where
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            match raw {
                Some(v) => v.trim().parse().with_context(|| format!("{key}={v:?}")),
                None => Ok(default),
            }
        }

        let flag = |key: &str, default: bool| -> Result<bool> {
            match get(key).map(|v| v.trim().to_ascii_lowercase()) {
                None => Ok(default),
                Some(v) => match v.as_str() {
                    "1" | "true" | "yes" | "on" => Ok(true),
                    "0" | "false" | "no" | "off" => Ok(false),
                    _ => anyhow::bail!("{key}={v:?} is not a boolean"),
                },
            }
        };

        let host = get("BEACON_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = parsed("BEACON_PORT", get("BEACON_PORT"), 3000)?;

        let federation = FederationConfig {
            self_uri: get("BEACON_PUBLIC_URL"),
            listen_host: host.clone(),
            listen_port: port,
            max_retries: parsed("BEACON_FEDERATION_MAX_RETRIES", get("BEACON_FEDERATION_MAX_RETRIES"), 3)?,
            retry_delay: Duration::from_secs(parsed(
                "BEACON_FEDERATION_RETRY_DELAY_SECS",
                get("BEACON_FEDERATION_RETRY_DELAY_SECS"),
                5,
            )?),
            suspension: chrono::Duration::seconds(parsed(
                "BEACON_FEDERATION_SUSPEND_SECS",
                get("BEACON_FEDERATION_SUSPEND_SECS"),
                3600,
            )?),
            max_in_flight: parsed("BEACON_FEDERATION_MAX_IN_FLIGHT", get("BEACON_FEDERATION_MAX_IN_FLIGHT"), 32)?,
        };

        Ok(Self {
            db_path: get("BEACON_DB_PATH").unwrap_or_else(|| "beacon.db".into()).into(),
            host,
            port,
            federation,
            sweep_interval: Duration::from_secs(parsed(
                "BEACON_SWEEP_INTERVAL_SECS",
                get("BEACON_SWEEP_INTERVAL_SECS"),
                60,
            )?),
            archive_enabled: flag("BEACON_ARCHIVE_ENABLED", true)?,
            allow_delete_all: flag("BEACON_ALLOW_DELETE_ALL", false)?,
            icon_catalog: get("BEACON_ICON_CATALOG").map(PathBuf::from),
            type_codes: get("BEACON_TYPE_CODES").map(PathBuf::from),
        })
    }
}
