//! rotalog CLI - copy standard input into rotating log files

use anyhow::Result;
use clap::Parser;
use rotalog_core::Error;
use rotalog_sink::RotatingSink;
use std::io::{self, BufRead};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("rotalog={0},rotalog_sink={0}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.resolve_config(&std::env::current_dir()?)?.validate()?;
    let sink = Arc::new(RotatingSink::open(config)?);
    if let Some(path) = sink.current_path() {
        info!("Writing to {}", path.display());
    }

    // Plain thread: a blocked stdin read must not hold up runtime shutdown
    let (done_tx, done_rx) = oneshot::channel();
    {
        let sink = sink.clone();
        std::thread::Builder::new()
            .name("rotalog-stdin".to_string())
            .spawn(move || {
                let _ = done_tx.send(pump_stdin(&sink));
            })?;
    }

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let pumped = tokio::select! {
        result = done_rx => Some(result?),
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
            None
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down...");
            None
        }
    };

    let closing = sink.clone();
    tokio::task::spawn_blocking(move || {
        closing.flush()?;
        closing.close()
    })
    .await??;

    if let Some(result) = pumped {
        let bytes = result?;
        debug!("Copied {} bytes from stdin", bytes);
    }

    info!("Sink closed");
    Ok(())
}

/// Copy stdin into the sink line by line until EOF
fn pump_stdin(sink: &RotatingSink) -> rotalog_core::Result<u64> {
    let mut reader = io::stdin().lock();
    let mut line = Vec::new();
    let mut total = 0u64;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        match sink.write_bytes(&line) {
            Ok(n) => total += n as u64,
            Err(Error::Closed) => return Err(Error::Closed),
            // A failed rotation still leaves the line in the previous file
            Err(e) => warn!("Write reported an error: {}", e),
        }
    }

    Ok(total)
}
