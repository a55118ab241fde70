#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::float_cmp)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use claim_node::claim_api::ClaimApi;
use claim_node::config::{self, ClaimNodeConfig, ConfigError, ServerConfig};
use claim_node::http_server::{self, AppState};
use claim_node::logging;
use claim_node::verify::verify_claim;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use zq_core::{checksum, parse_address, ClaimSignature, SystemTimeSource, TimeSource};

#[derive(Parser, Debug)]
#[command(author, version, about = "Zero Quest claim signer")]
struct Args {
    /// Path to a TOML config file. Without one, the built-in config reads
    /// every secret from the environment.
    #[arg(long, env = "CLAIM_NODE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the claim API (default).
    Run {
        /// Keep serving when configuration is invalid; claims then fail with
        /// CONFIGURATION and /readyz reports 503.
        #[arg(long, env = "CLAIM_NODE_DEGRADED_OK")]
        degraded_ok: bool,
        /// Override `server.bind_address`.
        #[arg(long, env = "CLAIM_NODE_BIND")]
        bind: Option<String>,
    },
    /// Print the address derived from the configured signing key.
    SignerAddress,
    /// Decode a claim payload and recover its signer.
    Verify {
        #[arg(long)]
        databytes: String,
        #[arg(long)]
        v: u8,
        #[arg(long)]
        r: String,
        #[arg(long)]
        s: String,
        /// Fail unless the signature recovers to this address.
        #[arg(long)]
        expected: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let cfg = match &args.config {
        Some(path) => config::load_config(path),
        None => config::load_default_config(),
    };
    logging::init(cfg.as_ref().ok().map(|c| &c.logging));

    let command = args.command.unwrap_or(Command::Run {
        degraded_ok: false,
        bind: None,
    });
    match command {
        Command::Run { degraded_ok, bind } => run(cfg, degraded_ok, bind).await,
        Command::SignerAddress => {
            let signer = cfg?.signer()?;
            println!("{}", checksum(&signer.address()));
            Ok(())
        }
        Command::Verify {
            databytes,
            v,
            r,
            s,
            expected,
        } => run_verify(&databytes, v, &r, &s, expected.as_deref()),
    }
}

async fn run(
    cfg: Result<ClaimNodeConfig, ConfigError>,
    degraded_ok: bool,
    bind: Option<String>,
) -> Result<()> {
    let (server, claims) = match cfg {
        Ok(cfg) => match ClaimApi::from_config(&cfg) {
            Ok(api) => {
                info!(
                    signer = %checksum(&api.signer_address()),
                    pass_contract = %cfg.pass.contract,
                    limits_enabled = cfg.limits.enabled,
                    "claim service configured"
                );
                (cfg.server.clone(), Some(Arc::new(api)))
            }
            Err(err) if degraded_ok => {
                error!(error = %err, "claim service unconfigured, serving degraded");
                (cfg.server.clone(), None)
            }
            Err(err) => return Err(err).context("invalid configuration"),
        },
        Err(err) if degraded_ok => {
            error!(error = %err, "config unavailable, serving degraded with defaults");
            (ServerConfig::default(), None)
        }
        Err(err) => return Err(err).context("failed to load configuration"),
    };

    let bind = bind.unwrap_or(server.bind_address);
    let state = AppState::new(claims, server.metrics_enabled);
    http_server::serve(&bind, state).await?;
    Ok(())
}

fn run_verify(
    databytes: &str,
    v: u8,
    r: &str,
    s: &str,
    expected: Option<&str>,
) -> Result<()> {
    let sig = ClaimSignature::from_parts(v, r, s)?;
    let report = verify_claim(databytes, &sig, SystemTimeSource.now_secs())?;
    let claim = &report.claim;

    println!("recipient:     {}", checksum(&claim.recipient));
    println!("amountZQT:     {}", claim.primary_amount);
    println!("bonus token:   {}", checksum(&claim.bonus_token));
    println!("bonus amount:  {}", claim.bonus_amount);
    println!("deadline:      {} (expired: {})", claim.expiry, report.expired);
    println!("nonce:         {}", claim.nonce);
    println!("signer:        {}", checksum(&report.signer));

    if let Some(expected) = expected {
        let expected = parse_address(expected).context("invalid --expected address")?;
        if expected != report.signer {
            bail!(
                "signature recovers to {}, expected {}",
                checksum(&report.signer),
                checksum(&expected)
            );
        }
    }
    Ok(())
}
