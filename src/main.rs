use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use arbloop::application;
use arbloop::shared::config::Config;

#[derive(Parser, Debug)]
#[command(version, about = "Cycle arbitrage over Solana AMM pools")]
struct Args {
    /// Path to config file
    #[arg(long, default_value = "Config.toml")]
    config: String,

    /// RPC endpoint URL (overrides config)
    #[arg(long)]
    rpc_url: Option<String>,

    /// Websocket endpoint URL (overrides config)
    #[arg(long)]
    ws_url: Option<String>,

    /// Path to keypair file (overrides config)
    #[arg(long)]
    keypair: Option<String>,

    /// Minimum net profit in reference-token units (overrides config)
    #[arg(long)]
    min_profit: Option<u64>,

    /// Scan tick interval in milliseconds (overrides config)
    #[arg(long)]
    scan_interval_ms: Option<u64>,

    /// Reserve sync mode: "poll" or "subscribe" (overrides config)
    #[arg(long)]
    sync_mode: Option<String>,

    /// Log opportunities without executing them
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let mut cfg = Config::from_file(&args.config)?;

    // CLI args take precedence over the config file
    if let Some(rpc_url) = args.rpc_url {
        cfg.rpc.url = rpc_url;
    }
    if let Some(ws_url) = args.ws_url {
        cfg.rpc.ws_url = ws_url;
    }
    if let Some(keypair) = args.keypair {
        cfg.wallet.keypair = keypair;
    }
    if let Some(min_profit) = args.min_profit {
        cfg.trade.min_profit = min_profit;
    }
    if let Some(scan_interval_ms) = args.scan_interval_ms {
        cfg.trade.scan_interval_ms = scan_interval_ms;
    }
    if let Some(sync_mode) = args.sync_mode {
        cfg.sync.mode = sync_mode;
    }
    if args.dry_run {
        cfg.trade.dry_run = true;
    }
    cfg.validate()?;

    application::run(cfg).await
}
