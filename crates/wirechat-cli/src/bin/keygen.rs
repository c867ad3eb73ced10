//! One-shot generator for the long-term key files of both roles.
//!
//! Writes `server_long_term_key`(+`.pub`) and `client_long_term_key`
//! (+`.pub`) into the target directory. Each peer keeps its own secret
//! file and receives the other's `.pub` out-of-band.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use wirechat_core::dh::{DhKeyPair, DhParams};
use wirechat_core::keys;
use wirechat_core::ChannelConfig;

#[derive(Parser, Debug)]
#[command(
    name = "wirechat-keygen",
    version,
    about = "Generate long-term wirechat key files for both roles"
)]
struct Cli {
    /// Directory with the params file; key files are written here too.
    #[arg(long, value_name = "DIR", default_value = ".")]
    dir: PathBuf,
}

fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::new("info"))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = ChannelConfig::default().with_dir(&cli.dir);
    let params = DhParams::from_file(&config.params_path())
        .context("loading DH parameters")?;

    for name in ["server_long_term_key", "client_long_term_key"] {
        let keypair = DhKeyPair::generate(&params);
        keys::write_keypair(&cli.dir, name, &keypair)
            .with_context(|| format!("writing {name}"))?;
        println!(
            "{name} saved to {} (fingerprint {})",
            cli.dir.join(name).display(),
            keys::fingerprint(keypair.public())
        );
    }

    Ok(())
}
