//! Terminal chat client over the wirechat secure channel.
//!
//! One process listens (`-l`), the other connects (`-c HOST`). After the
//! handshake, lines typed on stdin go to the peer and inbound messages are
//! printed as they arrive. Ctrl-D ends the conversation.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};

use wirechat_core::frame::MAX_MESSAGE_SIZE;
use wirechat_core::session::{SessionReceiver, SessionSender};
use wirechat_core::{connect_to, listen_and_accept, ChannelConfig, ChannelError};

#[derive(Parser, Debug)]
#[command(name = "wirechat", version, about = "Encrypted two-party chat over TCP")]
struct Cli {
    /// Attempt a connection to HOST.
    #[arg(short = 'c', long = "connect", value_name = "HOST", conflicts_with = "listen")]
    connect: Option<String>,

    /// Listen for a new connection.
    #[arg(short = 'l', long = "listen")]
    listen: bool,

    /// Listen or connect on PORT.
    #[arg(
        short = 'p',
        long = "port",
        value_name = "PORT",
        default_value_t = wirechat_core::config::DEFAULT_PORT
    )]
    port: u16,

    /// Directory holding the params file and long-term keys.
    #[arg(long, value_name = "DIR", default_value = ".")]
    dir: PathBuf,

    /// Log filter, e.g. info or wirechat_core=debug.
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// What the background receiver reports to the printing loop.
enum Inbound {
    Message(Vec<u8>),
    Closed,
    Fatal(ChannelError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };

    fmt()
        .with_env_filter(EnvFilter::new(&cli.log_level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = ChannelConfig::default()
        .with_dir(&cli.dir)
        .with_port(cli.port);

    let session = if cli.listen {
        listen_and_accept(&config)
            .await
            .context("could not establish the channel as listener")?
    } else {
        let host = cli.connect.as_deref().unwrap_or("localhost");
        connect_to(&config, host)
            .await
            .with_context(|| format!("could not establish the channel to {host}"))?
    };

    println!("secure channel established; type messages, Ctrl-D to quit");
    let (sender, receiver) = session.into_split();
    chat(sender, receiver).await
}

async fn chat(mut sender: SessionSender, receiver: SessionReceiver) -> Result<()> {
    let (events_tx, mut events) = mpsc::channel(32);
    let recv_task = tokio::spawn(receive_loop(receiver, events_tx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line.context("reading stdin")? {
                Some(line) => {
                    if let Err(e) = sender.send(line.as_bytes()).await {
                        if e.is_fatal() {
                            return Err(e).context("send failed");
                        }
                        // Over the per-frame limit: report it and keep going.
                        eprintln!("not sent ({MAX_MESSAGE_SIZE}-byte limit): {e}");
                    }
                }
                // Ctrl-D: we are done talking.
                None => break,
            },
            event = events.recv() => match event {
                Some(Inbound::Message(msg)) => {
                    println!("peer: {}", String::from_utf8_lossy(&msg));
                }
                Some(Inbound::Closed) => {
                    println!("peer disconnected");
                    break;
                }
                Some(Inbound::Fatal(e)) => return Err(e).context("channel failed"),
                None => break,
            },
        }
    }

    sender.shutdown().await.context("closing the channel")?;
    recv_task.abort();
    Ok(())
}

/// Background receiver: decrypt inbound frames and queue them for the
/// printing loop until the channel ends one way or the other.
async fn receive_loop(mut receiver: SessionReceiver, events: mpsc::Sender<Inbound>) {
    loop {
        let event = match receiver.receive().await {
            Ok(msg) => Inbound::Message(msg),
            Err(ChannelError::PeerClosed) => Inbound::Closed,
            Err(e) => Inbound::Fatal(e),
        };
        let terminal = !matches!(event, Inbound::Message(_));
        if events.send(event).await.is_err() || terminal {
            break;
        }
    }
}
