//! ipmsg-peer - LAN messenger built on the IP Messenger protocol engine

mod config;
mod handlers;
mod inbox;
mod peers;

use anyhow::{Context, Result};
use clap::Parser;
use inbox::Inbox;
use ipmsg::{Command, Engine, EngineError, Flag, Mode};
use peers::PeerTable;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(version)]
#[command(about = "LAN messenger speaking the IP Messenger protocol", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "peer.conf")]
    config: String,

    /// Trace every dispatched packet
    #[arg(long)]
    debug: bool,

    /// Do not broadcast BR_ENTRY on startup
    #[arg(long)]
    no_announce: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting ipmsg-peer v{}", env!("CARGO_PKG_VERSION"));

    let config = config::Config::load(&args.config)
        .context("Failed to load configuration")?;
    info!("Loaded configuration from: {}", args.config);

    let engine_config = config.engine_config()?;
    let engine = Arc::new(
        Engine::bind(engine_config.clone())
            .context(format!("Failed to bind to {}", engine_config.service()))?,
    );
    info!(
        "Signed in as {}@{} ({}@{})",
        engine_config.nickname, engine_config.group, engine_config.user, engine_config.host
    );

    let peers = Arc::new(PeerTable::new());
    let inbox = Arc::new(Inbox::new(config.messages.history_limit));
    engine.register_dispatch_table(handlers::build_table(
        peers.clone(),
        inbox.clone(),
        config.messages.auto_reply.clone(),
        args.debug,
    ));

    let receiver = {
        let engine = engine.clone();
        tokio::task::spawn_blocking(move || receive_loop(&engine))
    };

    if !args.no_announce {
        if let Err(e) = engine.broadcast_entry() {
            warn!("Failed to announce entry: {}", e);
        }
    }

    let mut input = spawn_input_reader();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = input.recv(), if stdin_open => match line {
                Some(line) => {
                    if !handle_input(&engine, &peers, &inbox, line.trim()) {
                        break;
                    }
                }
                None => stdin_open = false,
            },
        }
    }

    info!("Shutting down");
    if let Err(e) = engine.broadcast_exit() {
        warn!("Failed to announce exit: {}", e);
    }
    engine.close().context("Failed to close engine")?;
    receiver.await.context("Receive loop panicked")?;

    Ok(())
}

/// Read stdin lines on a plain thread so a pending read never holds up runtime shutdown
fn spawn_input_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read input: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

/// Receive and dispatch until the engine is closed
fn receive_loop(engine: &Engine) {
    loop {
        match engine.receive() {
            Ok(_) => {}
            Err(EngineError::Closed) => break,
            Err(e @ EngineError::Handler { .. }) => warn!("{:#}", anyhow::Error::from(e)),
            Err(e) => {
                error!("Error receiving packet: {}", e);
                break;
            }
        }
    }
    info!("Receive loop stopped");
}

/// Run one line of user input. Returns false to quit.
fn handle_input(engine: &Engine, peers: &PeerTable, inbox: &Inbox, line: &str) -> bool {
    match line {
        "" => {}
        "/quit" => return false,
        "/peers" => {
            println!("{} peer(s)", peers.len());
            for peer in peers.list() {
                let mut flags = Vec::new();
                if peer.absent {
                    flags.push("away");
                }
                if peer.encrypted {
                    flags.push("encrypt");
                }
                println!(
                    "{:<32} {:<32} seen {} {}",
                    peer.display_name,
                    peer.key,
                    peer.last_seen.format("%H:%M:%S"),
                    flags.join(",")
                );
            }
        }
        "/history" => {
            println!("{} message(s), {} awaiting confirmation", inbox.len(), inbox.pending());
            for message in inbox.recent(20) {
                println!(
                    "[{}] #{} {} ({}): {}",
                    message.received_at.format("%H:%M:%S"),
                    message.sequence,
                    message.from,
                    message.key,
                    message.body
                );
            }
        }
        "/announce" => {
            if let Err(e) = engine.broadcast_entry() {
                warn!("Failed to announce entry: {}", e);
            }
        }
        _ => {
            let Some((target, text)) = line.split_once(' ') else {
                println!(
                    "usage: <nickname|ip[:port]> <message> | /peers | /history | /announce | /quit"
                );
                return true;
            };
            let Some(dest) = resolve_target(target, peers, engine.config().port) else {
                println!("unknown peer: {}", target);
                return true;
            };

            let record = engine.build_outgoing(
                dest,
                text,
                Command::from(Mode::SENDMSG).with(Flag::SENDCHECK),
            );
            match engine.send_record(&record) {
                Ok(()) => inbox.track(record.sequence, dest),
                Err(e) => error!("{}", e),
            }
        }
    }
    true
}

/// Resolve `ip:port`, a bare ip (default port) or a known peer name
fn resolve_target(target: &str, peers: &PeerTable, default_port: u16) -> Option<SocketAddr> {
    if let Ok(addr) = target.parse::<SocketAddr>() {
        return Some(addr);
    }
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Some(SocketAddr::new(ip, default_port));
    }
    peers.find(target)
}
