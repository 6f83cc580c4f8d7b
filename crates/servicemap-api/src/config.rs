//! Server configuration read from the environment.

use std::net::SocketAddr;

use chrono::Duration;
use servicemap_service_area::application::cache::DEFAULT_MAX_PAST_ENTRIES;
use servicemap_service_area::domain::aggregates::{CreationPolicy, ServiceAreaStateMachine};
use servicemap_service_area::domain::projector::{HistoryKey, Projector};

use crate::error::AppError;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_CACHE_TTL_SECS: i64 = 30;

/// Runtime configuration for the API server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Upper bound on pooled database connections.
    pub max_connections: u32,
    /// Lifetime of "now" and history cache entries. `None` disables the cache.
    pub cache_ttl: Option<Duration>,
    /// Cap on cached past-cutoff snapshots.
    pub cache_max_past_entries: usize,
    /// Handling of `service_created` on an already-active service area.
    pub creation_policy: CreationPolicy,
    /// Attribute distinguishing historical states.
    pub history_key: HistoryKey,
}

impl ApiConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is unset or any variable
    /// holds an invalid value.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is missing or any variable
    /// holds an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_url = lookup("DATABASE_URL").ok_or_else(|| {
            AppError::Config("DATABASE_URL environment variable must be set".to_owned())
        })?;
        let host = lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_owned());
        let port = parse_or(&lookup, "PORT", DEFAULT_PORT)?;
        let max_connections =
            parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        if max_connections == 0 {
            return Err(AppError::Config(
                "DATABASE_MAX_CONNECTIONS must be at least 1".to_owned(),
            ));
        }
        let ttl_secs: i64 = parse_or(&lookup, "SNAPSHOT_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)?;
        let cache_ttl = match ttl_secs {
            0 => None,
            secs if secs < 0 => {
                return Err(AppError::Config(
                    "SNAPSHOT_CACHE_TTL_SECS must not be negative".to_owned(),
                ));
            }
            secs => Some(Duration::seconds(secs)),
        };
        let cache_max_past_entries =
            parse_or(&lookup, "SNAPSHOT_CACHE_MAX_PAST_ENTRIES", DEFAULT_MAX_PAST_ENTRIES)?;
        if cache_max_past_entries == 0 {
            return Err(AppError::Config(
                "SNAPSHOT_CACHE_MAX_PAST_ENTRIES must be at least 1".to_owned(),
            ));
        }
        let creation_policy = match lookup("CREATION_POLICY").as_deref() {
            None | Some("overwrite") => CreationPolicy::Overwrite,
            Some("keep_existing") => CreationPolicy::KeepExisting,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "CREATION_POLICY must be `overwrite` or `keep_existing`, got `{other}`"
                )));
            }
        };
        let history_key = match lookup("HISTORY_KEY").as_deref() {
            None | Some("attributes") => HistoryKey::Attributes,
            Some("geometry") => HistoryKey::GeometryReference,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "HISTORY_KEY must be `attributes` or `geometry`, got `{other}`"
                )));
            }
        };

        Ok(Self {
            database_url,
            host,
            port,
            max_connections,
            cache_ttl,
            cache_max_past_entries,
            creation_policy,
            history_key,
        })
    }

    /// The socket address to listen on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `host` and `port` do not form a valid
    /// socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }

    /// The projector the configured policies describe.
    #[must_use]
    pub fn projector(&self) -> Projector {
        Projector::new(
            ServiceAreaStateMachine::new(self.creation_policy),
            self.history_key,
        )
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| AppError::Config(format!("{key} must be a valid number: {e}"))),
    }
}
