use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use courier_crypto::Identity;
use courier_responder::{
    config::{identity_from_env, ENCRYPTION_KEY_ENV, SIGNING_KEY_ENV},
    poll_loop::spawn_poll_loop,
    EchoComposer, Responder, ResponderConfig,
};
use courier_store::Store;

#[derive(Parser, Debug)]
#[command(author, version, about = "Courier reference responder", long_about = None)]
struct Cli {
    /// JSON config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Relay database (overrides the config file).
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a fresh identity and print it as environment assignments
    Keygen {
        #[arg(long)]
        alias: Option<String>,
    },
    /// Publish the responder's public identity to the directory
    Publish,
    /// Poll and answer until Ctrl-C
    Run {
        #[arg(long)]
        interval_secs: Option<u64>,
        #[arg(long)]
        batch_size: Option<u32>,
    },
    /// Mark expired pending messages and exit
    Sweep,
    /// Process a single batch and exit
    Once {
        #[arg(long)]
        batch_size: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut cfg = ResponderConfig::load(cli.config.as_deref()).context("loading config")?;
    if let Some(db) = cli.database {
        cfg.database_path = db;
    }

    match cli.command {
        Commands::Keygen { alias } => keygen_command(alias),
        Commands::Publish => publish_command(&cfg).await,
        Commands::Run { interval_secs, batch_size } => {
            if let Some(secs) = interval_secs {
                cfg.poll_interval_secs = secs;
            }
            if let Some(n) = batch_size {
                cfg.batch_size = n;
            }
            cfg.validate()?;
            run_command(&cfg).await
        }
        Commands::Sweep => sweep_command(&cfg).await,
        Commands::Once { batch_size } => {
            if let Some(n) = batch_size {
                cfg.batch_size = n;
            }
            cfg.validate()?;
            once_command(&cfg).await
        }
    }
}

fn keygen_command(alias: Option<String>) -> Result<()> {
    let identity = Identity::generate(alias);
    let signing = zeroize::Zeroizing::new(hex::encode(identity.signing_secret_bytes()));
    let encryption = zeroize::Zeroizing::new(hex::encode(identity.encryption_secret_bytes()));
    println!("{SIGNING_KEY_ENV}={}", signing.as_str());
    println!("{ENCRYPTION_KEY_ENV}={}", encryption.as_str());
    println!("# signing public key:    {}", identity.signing_public().to_hex());
    println!("# encryption public key: {}", identity.encryption_public().to_hex());
    Ok(())
}

async fn build_responder(cfg: &ResponderConfig) -> Result<Responder> {
    let identity = identity_from_env(cfg.alias.clone()).context("loading responder keys")?;
    let store = Store::open(&cfg.database_path)
        .await
        .with_context(|| format!("opening relay database {}", cfg.database_path.display()))?;
    info!(
        signing_key = %identity.signing_public().short(),
        database = %cfg.database_path.display(),
        "responder identity loaded"
    );
    Ok(Responder::new(
        store,
        identity,
        EchoComposer::new(cfg.reply_prefix.clone()),
        cfg.batch_size,
    ))
}

async fn publish_command(cfg: &ResponderConfig) -> Result<()> {
    let responder = build_responder(cfg).await?;
    let record = responder.publish_identity().await?;
    println!("published {}", record.signing_key);
    Ok(())
}

async fn run_command(cfg: &ResponderConfig) -> Result<()> {
    let responder = Arc::new(build_responder(cfg).await?);
    responder.publish_identity().await?;

    let (task, handle) = spawn_poll_loop(responder.clone(), cfg.poll_interval(), cfg.sweep_expired);

    signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("shutdown requested; draining current batch");
    handle.shutdown();
    task.await.context("poll loop panicked")?;

    responder.store().close().await;
    Ok(())
}

async fn sweep_command(cfg: &ResponderConfig) -> Result<()> {
    let store = Store::open(&cfg.database_path).await?;
    let swept = store
        .sweep_expired(chrono::Utc::now().timestamp_millis())
        .await?;
    println!("expired {swept} message(s)");
    Ok(())
}

async fn once_command(cfg: &ResponderConfig) -> Result<()> {
    let responder = build_responder(cfg).await?;
    if cfg.sweep_expired {
        responder.sweep().await?;
    }
    if let Some(report) = responder.run_batch().await? {
        for (id, outcome) in &report.outcomes {
            println!("{id}\t{outcome:?}");
        }
        println!("replied to {} of {} message(s)", report.replied(), report.outcomes.len());
    }
    Ok(())
}
