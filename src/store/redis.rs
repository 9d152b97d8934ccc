//! Redis Store
//!
//! Shared store over a `fred` connection pool against a Redis-compatible
//! server. Pools are verified with a PING before use and connection attempts
//! are retried with exponential backoff.

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::registry::NodeId;
use crate::store::{resolve_node_id, ShardedStore, SharedStore, SharedStoreRef};
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use fred::clients::Pool;
use fred::interfaces::{ClientLike, HashesInterface, KeysInterface};
use fred::types::config::{Config as FredConfig, ReconnectPolicy, ServerConfig, TlsConnector};
use fred::types::Builder;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shared store backed by one Redis server
pub struct RedisStore {
    pool: Pool,
    node_id: NodeId,
    host: String,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("host", &self.host)
            .field("node_id", &self.node_id)
            .finish()
    }
}

impl RedisStore {
    /// Connect to a single host, retrying until `config.connect_timeout_secs`
    pub async fn connect(host: &str, config: &StoreConfig, node_id: NodeId) -> Result<Self> {
        let (host_name, port) = parse_host_port(host, config.port)?;
        let attempt_timeout = Duration::from_secs(config.connect_timeout_secs.max(1));

        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(5),
            max_elapsed_time: Some(attempt_timeout),
            ..Default::default()
        };

        let pool = backoff::future::retry(policy, move || async move {
            match tokio::time::timeout(attempt_timeout, build_pool(host_name, port, config)).await
            {
                Ok(Ok(pool)) => Ok(pool),
                Ok(Err(e)) if e.is_transient() => {
                    warn!(host = host_name, port, error = %e, "store connect attempt failed");
                    Err(backoff::Error::transient(e))
                }
                Ok(Err(e)) => Err(backoff::Error::permanent(e)),
                Err(_) => Err(backoff::Error::transient(Error::StoreUnavailable(format!(
                    "connect to {host_name}:{port} timed out"
                )))),
            }
        })
        .await?;

        info!(
            host = host_name,
            port,
            db = config.db,
            tls = config.tls,
            pool_size = config.pool_size,
            "store pool created and verified"
        );

        Ok(Self {
            pool,
            node_id,
            host: host.to_string(),
        })
    }

    /// Host this store talks to
    pub fn host(&self) -> &str {
        &self.host
    }
}

/// Client settings for one host.
///
/// Reconnects never stop, so every command carries a timeout; without it a
/// command issued during an outage would wait for the server indefinitely.
fn pool_builder(host: &str, port: u16, config: &StoreConfig) -> Result<Builder> {
    let mut fred_config = FredConfig {
        server: ServerConfig::new_centralized(host, port),
        database: Some(config.db),
        ..FredConfig::default()
    };

    if config.tls {
        fred_config.tls = Some(TlsConnector::default_rustls()?.into());
    }

    if let Ok(token) = std::env::var(&config.auth_token_env) {
        fred_config.password = Some(token);
    }

    let mut builder = Builder::from_config(fred_config);
    builder.set_policy(ReconnectPolicy::new_exponential(0, 100, 30_000, 2));
    let command_timeout = Duration::from_secs(config.command_timeout_secs.max(1));
    builder.with_performance_config(|performance| {
        performance.default_command_timeout = command_timeout;
    });
    Ok(builder)
}

async fn build_pool(host: &str, port: u16, config: &StoreConfig) -> Result<Pool> {
    let builder = pool_builder(host, port, config)?;
    let pool = builder.build_pool(config.pool_size)?;
    pool.init().await?;

    let _: String = pool.ping(None).await?;
    Ok(pool)
}

/// Parse `host[:port]`, stripping any `redis://` or `rediss://` scheme
pub fn parse_host_port(endpoint: &str, default_port: u16) -> Result<(&str, u16)> {
    let endpoint = endpoint
        .trim_start_matches("rediss://")
        .trim_start_matches("redis://");
    let endpoint = endpoint.split('/').next().unwrap_or(endpoint);

    match endpoint.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().map_err(|_| {
                Error::Configuration(format!("invalid port in store endpoint: {endpoint}"))
            })?;
            Ok((host, port))
        }
        None => Ok((endpoint, default_port)),
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let _: () = self
            .pool
            .hset(key, vec![(field.to_string(), value.to_string())])
            .await?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self.pool.hget(key, field).await?)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        Ok(self.pool.hgetall(key).await?)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool> {
        let removed: i64 = self.pool.hdel(key, field).await?;
        Ok(removed > 0)
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let removed: i64 = self.pool.del(key).await?;
        Ok(removed > 0)
    }

    async fn health_check(&self) -> Result<bool> {
        match self.pool.ping::<String>(None).await {
            Ok(_) => Ok(true),
            Err(e) => {
                debug!(host = %self.host, error = %e, "store health check failed");
                Ok(false)
            }
        }
    }
}

/// Connect to the configured hosts.
///
/// A single host yields a [`RedisStore`]; several hosts are wrapped in a
/// [`ShardedStore`] so each registry key lives on exactly one of them.
pub async fn connect_store(config: &StoreConfig) -> Result<SharedStoreRef> {
    let node_id = resolve_node_id(config.node_id.as_deref());
    info!(%node_id, hosts = ?config.hosts, "node identity established");

    match config.hosts.as_slice() {
        [] => Err(Error::Configuration("no store hosts configured".into())),
        [host] => Ok(Arc::new(RedisStore::connect(host, config, node_id).await?)),
        hosts => {
            let mut shards = Vec::with_capacity(hosts.len());
            for host in hosts {
                let store = RedisStore::connect(host, config, node_id.clone()).await?;
                shards.push((host.clone(), Arc::new(store) as SharedStoreRef));
            }
            Ok(Arc::new(ShardedStore::new(node_id, shards)?))
        }
    }
}
