//! Rivven Bridge
//!
//! ## Usage
//!
//! ```bash
//! # Serve POST /json and POST /avro
//! rivven-bridge serve --config bridge.yaml
//!
//! # Check a configuration file
//! rivven-bridge validate --config bridge.yaml
//!
//! # Decode a consumed record
//! rivven-bridge decode --content-type application/avro --file record.bin
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rivven_bridge::{
    config::BrokerKind, BridgeConfig, BridgeMetrics, BridgeServer, BrokerSender, CodecDispatcher,
    ExternalRegistry, Headers, LogBroker, PayloadDecoder, SchemaResolver,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{
    layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Parser)]
#[command(name = "rivven-bridge")]
#[command(author, version, about = "Rivven Bridge - HTTP to broker event publishing with JSON and Avro")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file
    #[arg(short, long, global = true, default_value = "bridge.yaml", env = "RIVVEN_BRIDGE_CONFIG")]
    config: PathBuf,

    /// Schema registry URL (overrides the config file)
    #[arg(long, global = true, env = "RIVVEN_BRIDGE_REGISTRY_URL")]
    registry_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "RIVVEN_BRIDGE_LOG_LEVEL")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP bridge
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(short, long, env = "RIVVEN_BRIDGE_PORT")]
        port: Option<u16>,
    },

    /// Validate the configuration and exit
    Validate,

    /// Decode a record payload and print it as JSON
    Decode {
        /// Content type of the record
        #[arg(long)]
        content_type: String,

        /// Topic the record was consumed from
        #[arg(long, default_value = "-")]
        topic: String,

        /// File holding the raw record bytes
        #[arg(short, long)]
        file: PathBuf,
    },
}

type LogHandle = reload::Handle<EnvFilter, Registry>;

/// Install the subscriber before the config is read so loading can log.
/// RUST_LOG takes precedence over every other level source.
fn init_logging(level: &str) -> (LogHandle, bool) {
    let from_env = EnvFilter::try_from_default_env().ok();
    let pinned = from_env.is_some();
    let filter = from_env.unwrap_or_else(|| EnvFilter::new(level));
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
    (handle, pinned)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (log_handle, pinned) =
        init_logging(cli.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL));

    let mut config = BridgeConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(url) = cli.registry_url {
        config.registry.url = url;
    }
    match cli.log_level {
        Some(level) => config.logging.level = level,
        None if !pinned => {
            log_handle
                .reload(EnvFilter::new(&config.logging.level))
                .context("applying configured log level")?;
        }
        None => {}
    }
    if let Commands::Serve { port: Some(port) } = cli.command {
        config.server.port = port;
    }
    config.validate()?;

    match cli.command {
        Commands::Serve { .. } => serve(config).await,
        Commands::Validate => {
            println!("{}", serde_yaml::to_string(&config.redacted())?);
            println!("Configuration is valid");
            Ok(())
        }
        Commands::Decode {
            content_type,
            topic,
            file,
        } => decode(config, &content_type, &topic, &file).await,
    }
}

fn build_resolver(config: &BridgeConfig) -> Result<Arc<SchemaResolver>> {
    let registry = ExternalRegistry::new(&config.registry.client_config())?;
    let mut resolver = SchemaResolver::new(Arc::new(registry))
        .with_lookup(config.registry.subject_lookup())
        .with_timeout(config.registry.timeout());
    if config.registry.cache {
        resolver = resolver.with_cache();
    }
    Ok(Arc::new(resolver))
}

fn build_broker(config: &BridgeConfig) -> Result<Arc<dyn BrokerSender>> {
    match config.broker.kind {
        #[cfg(feature = "kafka")]
        BrokerKind::Kafka => {
            info!("Kafka bootstrap servers: {}", config.broker.kafka.bootstrap_servers);
            Ok(Arc::new(rivven_bridge::KafkaBroker::new(&config.broker.kafka)?))
        }
        #[cfg(not(feature = "kafka"))]
        BrokerKind::Kafka => anyhow::bail!("broker kind 'kafka' needs the kafka feature"),
        BrokerKind::Log => Ok(Arc::new(LogBroker)),
    }
}

async fn serve(config: BridgeConfig) -> Result<()> {
    info!("Starting rivven-bridge");
    info!("Schema registry: {}", config.registry.url);

    let resolver = build_resolver(&config)?;
    let broker = build_broker(&config)?;
    let metrics = Arc::new(BridgeMetrics::new()?);
    let dispatcher = CodecDispatcher::new(resolver, broker, config.dispatch.dispatcher_config()?)
        .with_metrics(metrics.clone());

    let addr: SocketAddr = config
        .server
        .bind_address()
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind_address()))?;
    info!("API endpoints:");
    info!("  POST /json   - publish JSON");
    info!("  POST /avro   - publish Avro");
    info!("  GET  /health - health check");
    info!("  GET  /metrics - Prometheus metrics");

    BridgeServer::new(Arc::new(dispatcher), metrics).run(addr).await
}

async fn decode(config: BridgeConfig, content_type: &str, topic: &str, file: &Path) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let headers = Headers::new().with("content-type", content_type);
    let decoder = PayloadDecoder::new(build_resolver(&config)?);

    match decoder.decode(topic, &headers, Some(&bytes)).await? {
        Some(decoded) => println!("{}", serde_json::to_string_pretty(decoded.value())?),
        None => println!("null"),
    }
    Ok(())
}
