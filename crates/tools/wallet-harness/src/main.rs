//! CLI harness for exercising the wallet session engine
//!
//! This tool allows testing:
//! - Mnemonic generation
//! - Address derivation with group and exclusion constraints
//! - A full session lifecycle against a simulated explorer

mod simulated;

use alph_core::{generate_mnemonic, AddressDeriver, Bip44Derivation, MnemonicPhrase};
use alph_params::{Network, NetworkType};
use alph_session::{
    init_logging, Collaborators, NewAddressRequest, SessionConfig, SessionStateMachine,
};
use alph_storage::{
    KdfParams, MemoryMetadataBackend, MemorySecureStorage, MetadataBackend, SqliteMetadataBackend,
};
use alph_sync::SyncOutcome;
use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use simulated::{PinPad, SimulatedChain};
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "wallet-harness")]
#[command(about = "Alephium wallet session testing harness", long_about = None)]
struct Cli {
    /// Session config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a fresh mnemonic
    GenerateMnemonic {
        /// Word count (12, 18 or 24)
        #[arg(short, long, default_value = "24")]
        words: u32,
    },

    /// Derive one address
    Derive {
        /// Mnemonic; a new one is generated when omitted
        #[arg(short, long)]
        phrase: Option<String>,

        /// Network
        #[arg(short, long, default_value = "mainnet")]
        network: NetworkType,

        /// Target group
        #[arg(short, long)]
        group: Option<u8>,

        /// First index to try
        #[arg(short, long)]
        index: Option<u32>,

        /// Indexes to skip
        #[arg(short, long, value_delimiter = ',')]
        exclude: Vec<u32>,
    },

    /// Run create, discover, lock, unlock and sync against a simulated explorer
    Simulate {
        /// Mnemonic; a new one is generated when omitted
        #[arg(short, long)]
        phrase: Option<String>,

        /// PIN for the simulated wallet
        #[arg(long, default_value = "123456")]
        pin: String,

        /// Leading indexes with on-chain history
        #[arg(short, long, default_value = "3")]
        active: u32,

        /// Extra addresses generated after discovery, rotating through groups
        #[arg(short = 'x', long, default_value = "2")]
        extra: u32,

        /// History pages per active address
        #[arg(long, default_value = "5")]
        pages: u32,

        /// Simulated explorer latency in milliseconds
        #[arg(long, default_value = "0")]
        latency_ms: u64,

        /// PIN prompts dismissed before answering
        #[arg(long, default_value = "0")]
        cancel_prompts: u32,

        /// Use cheap PIN key derivation
        #[arg(long)]
        fast_kdf: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(Some("info"));

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => SessionConfig::load_from_path(path)?,
        None => SessionConfig::default(),
    };
    config.apply_env_overrides()?;

    match cli.command {
        Commands::GenerateMnemonic { words } => {
            let mnemonic = generate_mnemonic(Some(words))?;
            println!("{}", mnemonic.as_str());
        }
        Commands::Derive {
            phrase,
            network,
            group,
            index,
            exclude,
        } => {
            run_derive(&config, phrase, network, group, index, exclude)?;
        }
        Commands::Simulate {
            phrase,
            pin,
            active,
            extra,
            pages,
            latency_ms,
            cancel_prompts,
            fast_kdf,
        } => {
            if fast_kdf {
                config.kdf = KdfParams::low_cost();
            }
            let scenario = Scenario {
                pin,
                active,
                extra,
                pages,
                latency: Duration::from_millis(latency_ms),
                cancel_prompts,
            };
            run_simulation(config, phrase, scenario).await?;
        }
    }

    Ok(())
}

fn resolve_phrase(phrase: Option<String>) -> anyhow::Result<MnemonicPhrase> {
    match phrase {
        Some(phrase) => Ok(MnemonicPhrase::parse(&phrase)?),
        None => {
            let mnemonic = generate_mnemonic(None)?;
            info!("Generated mnemonic: {}", mnemonic.as_str());
            Ok(mnemonic)
        }
    }
}

fn deriver_for(config: &SessionConfig, network: &Network) -> anyhow::Result<AddressDeriver> {
    Ok(AddressDeriver::new(
        Arc::new(Bip44Derivation::new(network)?),
        config.deriver,
    ))
}

fn run_derive(
    config: &SessionConfig,
    phrase: Option<String>,
    network: NetworkType,
    group: Option<u8>,
    index: Option<u32>,
    exclude: Vec<u32>,
) -> anyhow::Result<()> {
    let network = Network::from_type(network);
    let deriver = deriver_for(config, &network)?;
    let seed = resolve_phrase(phrase)?.to_master_seed("")?;
    let excluded: BTreeSet<u32> = exclude.into_iter().collect();

    let started = Instant::now();
    let data = deriver.derive(&seed, group, index, &excluded)?;
    info!(
        "Derived on {} in {:.1}ms",
        network.name,
        started.elapsed().as_secs_f64() * 1_000.0
    );

    println!("path:       {}/{}", network.account_path(), data.index);
    println!("address:    {}", data.hash);
    println!("group:      {}", data.group);
    println!("public key: {}", data.public_key);
    Ok(())
}

struct Scenario {
    pin: String,
    active: u32,
    extra: u32,
    pages: u32,
    latency: Duration,
    cancel_prompts: u32,
}

async fn run_simulation(
    config: SessionConfig,
    phrase: Option<String>,
    scenario: Scenario,
) -> anyhow::Result<()> {
    let network = Network::mainnet();
    let mnemonic = resolve_phrase(phrase)?;

    // History lives on the leading indexes so discovery has something to find
    let deriver = deriver_for(&config, &network)?;
    let seed = mnemonic.to_master_seed("")?;
    let mut active = HashSet::new();
    for index in 0..scenario.active {
        active.insert(deriver.derive_at(&seed, index)?.hash);
    }
    drop(seed);

    let chain = Arc::new(SimulatedChain::new(
        active,
        scenario.pages,
        network.explorer_page_size,
        scenario.latency,
    ));
    let metadata_backend: Arc<dyn MetadataBackend> = match &config.db_path {
        Some(path) => {
            info!("Metadata database: {}", path.display());
            Arc::new(
                SqliteMetadataBackend::open(path)
                    .with_context(|| format!("opening {}", path.display()))?,
            )
        }
        None => Arc::new(MemoryMetadataBackend::new()),
    };

    let session = Arc::new(SessionStateMachine::new(
        Collaborators {
            secure_storage: Arc::new(MemorySecureStorage::new()),
            metadata_backend,
            chain: chain.clone(),
            authenticator: Arc::new(PinPad::new(scenario.pin.clone(), scenario.cancel_prompts)),
            key_derivation: Arc::new(Bip44Derivation::new(&network)?),
        },
        config,
    ));

    let mut events = session.subscribe_events();
    let event_log = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!("Session event: {:?}", event);
        }
    });

    let started = Instant::now();
    let wallet = session
        .create_wallet("Harness", &scenario.pin, Some(mnemonic))
        .await?;
    info!("Created wallet {} in {:.2}s", wallet.id, started.elapsed().as_secs_f64());

    let discovered = session.discover_addresses().await?;
    info!("Discovered {} addresses with history", discovered.len());

    let group_count = network.group_count.max(1);
    for n in 0..scenario.extra {
        let address = session
            .generate_address(NewAddressRequest {
                group: Some((n % u32::from(group_count)) as u8),
                label: Some(format!("Extra {}", n + 1)),
                ..Default::default()
            })
            .await?;
        info!(
            "Generated index {} in group {}: {}",
            address.index, address.group, address.hash
        );
    }

    session.set_camera_active(true);
    if !session.on_background() {
        info!("Background lock skipped while camera is active");
    }
    session.set_camera_active(false);
    session.on_background();
    info!("Session state after background: {}", session.state());

    let started = Instant::now();
    match session.on_foreground_resume().await {
        Ok(outcome) => info!(
            "Foreground unlock: {:?} in {:.2}s",
            outcome,
            started.elapsed().as_secs_f64()
        ),
        Err(e) => {
            warn!("Foreground unlock failed: {}", e.user_message());
            session.on_terminate();
            event_log.abort();
            return Err(e.into());
        }
    }

    let outcome = session.sync_addresses().await?;
    info!("Refresh: {:?}", outcome);

    let pb = ProgressBar::new(u64::from(chain.pages()));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} pages {msg}")?
            .progress_chars("=>-"),
    );
    pb.set_position(1);
    loop {
        match session.load_more_history().await? {
            SyncOutcome::PageAppended { appended } => {
                pb.inc(1);
                pb.set_message(format!("+{} transactions", appended));
            }
            SyncOutcome::NoMorePages => break,
            other => {
                warn!("Unexpected paging outcome: {:?}", other);
                break;
            }
        }
    }
    pb.finish_with_message("history loaded");

    println!("{:<6}{:<7}{:<48}{:>24}{:>8}", "index", "group", "address", "balance", "txs");
    for address in session.addresses() {
        let state = session.address_sync_state(&address.hash);
        let balance = state
            .as_ref()
            .and_then(|s| s.balance.as_ref())
            .map(|b| b.amount)
            .unwrap_or(0);
        let txs = state
            .as_ref()
            .map(|s| s.confirmed_transactions.len())
            .unwrap_or(0);
        let marker = if address.is_main() { "*" } else { "" };
        println!(
            "{:<6}{:<7}{:<48}{:>24}{:>8}",
            format!("{}{}", address.index, marker),
            address.group,
            address.hash,
            balance,
            txs
        );
    }

    session.on_terminate();
    event_log.abort();
    info!("Simulation complete");
    Ok(())
}
