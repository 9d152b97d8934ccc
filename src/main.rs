//! Liveness Registry agent and inspection tool
//!
//! `agent` joins one or more registries, heartbeats and sweeps them until
//! interrupted, and serves health and metrics endpoints. The other commands
//! inspect or reset a single registry.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use liveness_registry::{
    connect_store, load_config, read_snapshot, AppConfig, Error, LivenessMetrics, NodeRegistry,
    Result, SharedStoreRef, Sweeper, SweeperConfig,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Distributed node-liveness registry
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "LIVENESS_CONFIG")]
    config: Option<PathBuf>,

    /// Store hosts, overriding the config file
    #[arg(long = "host", env = "LIVENESS_STORE_HOSTS", value_delimiter = ',')]
    hosts: Vec<String>,

    /// Node id for this process, overriding the config file
    #[arg(long, env = "LIVENESS_NODE_ID")]
    node_id: Option<String>,

    /// Liveness TTL in seconds, overriding the config file
    #[arg(long, env = "LIVENESS_TTL_SECS")]
    ttl_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Heartbeat and sweep registries until interrupted
    Agent {
        /// Logical resource keys to join
        #[arg(long = "key", required = true)]
        keys: Vec<String>,
    },
    /// Print a registry as JSON without joining it
    Nodes {
        #[arg(long)]
        key: String,
    },
    /// Run one expiry sweep and print the removed node ids
    Sweep {
        #[arg(long)]
        key: String,
    },
    /// Delete a registry
    Clear {
        #[arg(long)]
        key: String,
    },
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = build_config(&args)?;
    info!("Starting liveness registry {}", liveness_registry::VERSION);
    info!("  Store hosts: {:?}", config.store.hosts);
    info!("  TTL: {}s", config.liveness.ttl_secs);

    let store = connect_store(&config.store)
        .await
        .context("failed to connect to shared store")?;

    match args.command {
        Command::Agent { keys } => run_agent(&config, store, keys).await?,
        Command::Nodes { key } => {
            let nodes = read_snapshot(&store, &key, &config.liveness).await?;
            println!("{}", serde_json::to_string_pretty(&nodes)?);
        }
        Command::Sweep { key } => {
            let registry = NodeRegistry::new(store, key, config.liveness.clone()).await?;
            let mut removed: Vec<_> = registry.remove_expired_nodes(None).await?.into_iter().collect();
            removed.sort();
            registry.remove_node(registry.self_id().clone()).await?;
            println!("{}", serde_json::to_string_pretty(&removed)?);
        }
        Command::Clear { key } => {
            let registry = NodeRegistry::new(store, key, config.liveness.clone()).await?;
            registry.clear_nodelist().await?;
            println!("cleared {}", registry.registry_key());
        }
    }

    Ok(())
}

fn build_config(args: &Args) -> anyhow::Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AppConfig::default(),
    };

    if !args.hosts.is_empty() {
        config.store.hosts = args.hosts.clone();
    }
    if let Some(node_id) = &args.node_id {
        config.store.node_id = Some(node_id.clone());
    }
    if let Some(ttl_secs) = args.ttl_secs {
        config.liveness.ttl_secs = ttl_secs;
    }

    config.validate()?;
    Ok(config)
}

async fn run_agent(config: &AppConfig, store: SharedStoreRef, keys: Vec<String>) -> Result<()> {
    let sweeper = Sweeper::new(SweeperConfig {
        interval: config.agent.heartbeat_interval(&config.liveness),
        deregister_on_shutdown: config.agent.deregister_on_shutdown,
    });

    for key in keys {
        let registry = NodeRegistry::new(store.clone(), key, config.liveness.clone()).await?;
        sweeper.track(registry);
    }

    // Start health server
    let health_addr = config.agent.health_addr.clone();
    let health_store = store.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr, health_store).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = config.agent.metrics_addr.clone();
    let metrics = Arc::new(LivenessMetrics::new()?);
    let metrics_sweeper = sweeper.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, metrics, metrics_sweeper).await {
            error!("Metrics server error: {}", e);
        }
    });

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(sweeper.clone().run(shutdown.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    shutdown.cancel();
    handle
        .await
        .map_err(|e| Error::Internal(format!("sweeper task failed: {}", e)))?;

    info!("Agent shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "fred=warn", "rustls=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health Server
// =============================================================================

async fn run_health_server(addr: &str, store: SharedStoreRef) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let store = store.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let store = store.clone();
                async move {
                    let (status, body) = match req.uri().path() {
                        "/healthz" | "/livez" => (StatusCode::OK, "ok"),
                        "/readyz" => match store.health_check().await {
                            Ok(true) => (StatusCode::OK, "ok"),
                            _ => (StatusCode::SERVICE_UNAVAILABLE, "store unavailable"),
                        },
                        _ => (StatusCode::NOT_FOUND, "not found"),
                    };
                    let mut response = Response::new(Body::from(body));
                    *response.status_mut() = status;
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Configuration(format!("Invalid health server address: {}", e)))?;

    info!("Health server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(
    addr: &str,
    metrics: Arc<LivenessMetrics>,
    sweeper: Arc<Sweeper>,
) -> Result<()> {
    use hyper::header::{HeaderValue, CONTENT_TYPE};
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let metrics = metrics.clone();
        let sweeper = sweeper.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let metrics = metrics.clone();
                let sweeper = sweeper.clone();
                async move {
                    if req.uri().path() != "/metrics" {
                        let mut response = Response::new(Body::from("not found"));
                        *response.status_mut() = StatusCode::NOT_FOUND;
                        return Ok::<_, std::convert::Infallible>(response);
                    }

                    metrics.observe(sweeper.stats(), sweeper.registries().len());
                    let response = match metrics.render() {
                        Ok((content_type, buffer)) => {
                            let mut response = Response::new(Body::from(buffer));
                            if let Ok(value) = HeaderValue::from_str(&content_type) {
                                response.headers_mut().insert(CONTENT_TYPE, value);
                            }
                            response
                        }
                        Err(e) => {
                            let mut response = Response::new(Body::from(e.to_string()));
                            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                            response
                        }
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Configuration(format!("Invalid metrics server address: {}", e)))?;

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
