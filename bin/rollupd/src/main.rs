//! Rollup node CLI.
//!
//! This binary runs a rollup node that:
//! - Keeps the chain state in a local database
//! - Anchors blocks on the configured DA layer
//! - Syncs anchored blocks back and applies them in order

use anyhow::{bail, Context, Result};
use block_schema::Block;
use clap::{Parser, Subcommand};
use config::{
    parse_namespace_id, BlockManagerConfig, HeaderConfig, NodeConfig, FLAG_AGGREGATOR,
    FLAG_BLOCK_TIME, FLAG_DATA_NAMESPACE_ID, FLAG_DA_BLOCK_TIME, FLAG_DA_CONFIG, FLAG_DA_LAYER,
    FLAG_DA_START_HEIGHT, FLAG_FRAUD_PROOFS, FLAG_HEADER_NAMESPACE_ID, FLAG_LAZY_AGGREGATOR,
    FLAG_LIGHT, FLAG_TRUSTED_HASH,
};
use rollup_node::node::STATE_TREE;
use rollup_node::{PassthroughExecutor, RollupNode};
use serde::Serialize;
use state::{ChainState, ChainStateStore, GenesisDoc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use store::SledStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const GENESIS_FILE: &str = "genesis.json";

#[derive(Parser)]
#[command(name = "rollupd")]
#[command(about = "Rollup node anchoring blocks on a data availability layer")]
struct Cli {
    /// Root directory for node data
    #[arg(long, default_value = "./data")]
    root_dir: PathBuf,

    /// Database directory, relative to the root directory
    #[arg(long, default_value = "db")]
    db_path: PathBuf,

    /// Run the node as block producer
    #[arg(long = FLAG_AGGREGATOR)]
    aggregator: bool,

    /// Skip empty blocks while idle
    #[arg(long = FLAG_LAZY_AGGREGATOR)]
    lazy_aggregator: bool,

    /// Run as light client
    #[arg(long = FLAG_LIGHT)]
    light: bool,

    /// DA layer client name
    #[arg(long = FLAG_DA_LAYER, default_value = "mock")]
    da_layer: String,

    /// DA layer client configuration
    #[arg(long = FLAG_DA_CONFIG, default_value = "")]
    da_config: String,

    /// Block production interval
    #[arg(
        long = FLAG_BLOCK_TIME,
        default_value = "1s",
        value_parser = humantime::parse_duration
    )]
    block_time: Duration,

    /// DA layer block time, also the DA polling interval
    #[arg(
        long = FLAG_DA_BLOCK_TIME,
        default_value = "15s",
        value_parser = humantime::parse_duration
    )]
    da_block_time: Duration,

    /// First DA height to sync from
    #[arg(long = FLAG_DA_START_HEIGHT, default_value_t = 1)]
    da_start_height: u64,

    /// Namespace ID for block headers (8 bytes, hex)
    #[arg(long = FLAG_HEADER_NAMESPACE_ID, default_value = "0000000000000000")]
    header_namespace_id: String,

    /// Namespace ID for block data (8 bytes, hex)
    #[arg(long = FLAG_DATA_NAMESPACE_ID, default_value = "0000000000000000")]
    data_namespace_id: String,

    /// Enable fraud proofs
    #[arg(long = FLAG_FRAUD_PROOFS)]
    fraud_proofs: bool,

    /// Initial trusted header hash (hex)
    #[arg(long = FLAG_TRUSTED_HASH, default_value = "")]
    trusted_hash: String,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the genesis chain state
    Init {
        /// Genesis document to use instead of a generated one
        #[arg(long)]
        genesis: Option<PathBuf>,
        /// Chain ID of the generated genesis document
        #[arg(long, default_value = "rollup")]
        chain_id: String,
    },
    /// Show the persisted chain state
    Status,
    /// Run the node until interrupted
    Run,
    /// Demo: anchor synthetic blocks on an in-memory node and sync them back
    Demo {
        /// Number of blocks to produce
        #[arg(long, default_value_t = 5)]
        blocks: u64,
    },
}

/// Summary of a chain state printed by `status` and `demo`.
#[derive(Serialize)]
struct StatusReport {
    chain_id: String,
    initial_height: u64,
    last_block_height: u64,
    last_block_hash: String,
    last_block_time: u64,
    da_height: u64,
    app_hash: String,
    validators: usize,
    validators_hash: String,
    last_height_validators_changed: u64,
}

impl From<&ChainState> for StatusReport {
    fn from(state: &ChainState) -> Self {
        Self {
            chain_id: state.chain_id.clone(),
            initial_height: state.initial_height,
            last_block_height: state.last_block_height,
            last_block_hash: hex::encode(state.last_block_id.hash),
            last_block_time: state.last_block_time,
            da_height: state.da_height,
            app_hash: hex::encode(state.app_hash),
            validators: state.validators.len(),
            validators_hash: hex::encode(state.validators.hash()),
            last_height_validators_changed: state.last_height_validators_changed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = node_config(&cli)?;

    match cli.command {
        Commands::Init { genesis, chain_id } => {
            init(config, genesis.as_deref(), &chain_id).await?;
        }
        Commands::Status => {
            show_status(&config)?;
        }
        Commands::Run => {
            run_node(config).await?;
        }
        Commands::Demo { blocks } => {
            run_demo(config, blocks).await?;
        }
    }

    Ok(())
}

fn node_config(cli: &Cli) -> Result<NodeConfig> {
    let config = NodeConfig {
        root_dir: cli.root_dir.clone(),
        db_path: cli.db_path.clone(),
        aggregator: cli.aggregator,
        lazy_aggregator: cli.lazy_aggregator,
        light: cli.light,
        da_layer: cli.da_layer.clone(),
        da_config: cli.da_config.clone(),
        block_manager: BlockManagerConfig {
            block_time: cli.block_time,
            da_block_time: cli.da_block_time,
            da_start_height: cli.da_start_height,
            header_namespace_id: parse_namespace_id(
                FLAG_HEADER_NAMESPACE_ID,
                &cli.header_namespace_id,
            )?,
            data_namespace_id: parse_namespace_id(FLAG_DATA_NAMESPACE_ID, &cli.data_namespace_id)?,
            fraud_proofs: cli.fraud_proofs,
        },
        header: HeaderConfig {
            trusted_hash: cli.trusted_hash.clone(),
        },
    };
    config.validate()?;
    Ok(config)
}

fn genesis_path(config: &NodeConfig) -> PathBuf {
    config.root_dir.join(GENESIS_FILE)
}

fn default_genesis(chain_id: &str) -> GenesisDoc {
    GenesisDoc::new(chain_id).with_validator(b"sequencer".to_vec(), 1)
}

fn print_state(state: &ChainState) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&StatusReport::from(state))?);
    Ok(())
}

async fn init(config: NodeConfig, genesis_file: Option<&Path>, chain_id: &str) -> Result<()> {
    let path = genesis_path(&config);
    if path.exists() {
        bail!("node already initialized: {} exists", path.display());
    }

    let genesis = match genesis_file {
        Some(file) => GenesisDoc::from_json_file(file)
            .with_context(|| format!("failed to read genesis from {}", file.display()))?,
        None => default_genesis(chain_id),
    };

    std::fs::create_dir_all(&config.root_dir)?;
    std::fs::write(&path, serde_json::to_string_pretty(&genesis)?)?;
    info!("Wrote genesis for chain {} to {}", genesis.chain_id, path.display());

    let node = RollupNode::open(config, &genesis)?;
    print_state(&node.state().await)
}

fn show_status(config: &NodeConfig) -> Result<()> {
    let db_dir = config.db_dir();
    if !db_dir.exists() {
        bail!("no database at {}, run init first", db_dir.display());
    }
    let db = sled::open(&db_dir)
        .with_context(|| format!("failed to open database at {}", db_dir.display()))?;
    let store = ChainStateStore::new(SledStore::from_db(&db, STATE_TREE)?);
    match store.load()? {
        Some(state) => print_state(&state),
        None => bail!("no chain state in {}, run init first", db_dir.display()),
    }
}

async fn run_node(config: NodeConfig) -> Result<()> {
    let path = genesis_path(&config);
    let genesis = GenesisDoc::from_json_file(&path)
        .with_context(|| format!("failed to read genesis from {}, run init first", path.display()))?;

    info!("Starting rollup node with config: {:?}", config);
    let node = RollupNode::open(config, &genesis)?;
    node.start()?;

    let cancel = CancellationToken::new();
    let syncer = node.syncer(Arc::new(PassthroughExecutor));
    let sync_task = tokio::spawn(syncer.run(cancel.child_token()));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    cancel.cancel();
    if let Err(e) = sync_task.await {
        warn!("DA syncer task failed: {}", e);
    }
    node.stop()?;

    let state = node.state().await;
    info!(
        "Stopped at height {}, DA height {}",
        state.last_block_height, state.da_height
    );
    Ok(())
}

async fn run_demo(config: NodeConfig, blocks: u64) -> Result<()> {
    info!("Running demo with {} blocks...", blocks);

    let genesis = default_genesis("demo-rollup");
    let node = RollupNode::in_memory(config, &genesis)?;
    node.start()?;

    // Produce and anchor blocks
    println!("\n=== Submitting blocks ===");
    let mut last_header_hash = [0u8; 32];
    for height in 1..=blocks {
        let block = Block::new(
            genesis.chain_id.as_str(),
            height,
            genesis.genesis_time + height * 1_000,
            last_header_hash,
            vec![format!("tx-{}", height).into_bytes()],
        );
        last_header_hash = block.hash();

        let result = node.submit_block(&block).await;
        if !result.base.is_success() {
            bail!("block {} not anchored: {}", height, result.base.message);
        }
        println!(
            "Block {} ({}) anchored at DA height {}",
            height,
            hex::encode(block.hash()),
            result.base.da_height
        );
    }

    // Sync them back
    println!("\n=== Syncing from DA layer ===");
    let mut syncer = node.syncer(Arc::new(PassthroughExecutor));
    let poll = Duration::from_millis(200);
    let deadline = tokio::time::Instant::now() + node.config().block_manager.da_block_time * 4;
    loop {
        let report = syncer.sync_once().await?;
        if report.blocks_applied > 0 {
            println!(
                "Applied {} block(s) from DA heights {}..{}",
                report.blocks_applied, report.from_da_height, report.next_da_height
            );
        }
        if node.state().await.last_block_height >= blocks {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("DA layer did not advance past the anchored blocks in time");
        }
        tokio::time::sleep(poll).await;
    }
    node.stop()?;

    println!("\n=== Final State ===");
    print_state(&node.state().await)?;

    println!("\n=== Demo Complete ===");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollkit_flags() {
        let cli = Cli::try_parse_from([
            "rollupd",
            "--rollkit.aggregator",
            "--rollkit.da_layer",
            "mock",
            "--rollkit.da_block_time",
            "2s",
            "--rollkit.da_start_height",
            "5",
            "--rollkit.header_namespace_id",
            "0102030405060708",
            "--rollkit.experimental_insecure_fraud_proofs",
            "status",
        ])
        .unwrap();

        let config = node_config(&cli).unwrap();
        assert!(config.aggregator);
        assert!(config.block_manager.fraud_proofs);
        assert_eq!(config.block_manager.da_block_time, Duration::from_secs(2));
        assert_eq!(config.block_manager.da_start_height, 5);
        assert_eq!(
            config.block_manager.header_namespace_id.to_string(),
            "0102030405060708"
        );
    }

    #[test]
    fn test_bad_namespace_flag() {
        let cli = Cli::try_parse_from([
            "rollupd",
            "--rollkit.data_namespace_id",
            "0102",
            "status",
        ])
        .unwrap();
        let err = node_config(&cli).err().unwrap();
        assert!(err.to_string().contains("rollkit.data_namespace_id"));
    }

    #[test]
    fn test_status_report_commits_to_validators() {
        let genesis = default_genesis("rollup-1");
        let state = ChainState::from_genesis(&genesis).unwrap();

        let report = StatusReport::from(&state);
        assert_eq!(report.validators, 1);
        assert_eq!(
            report.validators_hash,
            hex::encode(genesis.validator_set().unwrap().hash())
        );

        let genesis = genesis.with_validator(b"second".to_vec(), 2);
        let other = ChainState::from_genesis(&genesis).unwrap();
        assert_ne!(
            StatusReport::from(&other).validators_hash,
            report.validators_hash
        );
    }
}
