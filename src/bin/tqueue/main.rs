mod args;
mod config;
mod util;

use std::io::Write;
use std::process::{ExitCode, Stdio};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use throttled_queue::line_reader::LineReader;
use throttled_queue::{Job, JobQueue};
use tokio::process::Command;
use tokio::{select, signal};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn, Level};

use crate::args::Args;
use crate::config::Config;
use crate::util::bytes_to_human_str;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Logging goes to stderr, leaving stdout to commands and the final stats.
    if args.debug {
        tracing_subscriber::fmt()
            .with_max_level(Level::TRACE)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .init();
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(error) = signal::ctrl_c().await {
                warn!(%error, "something strange with ctrl-c handling!");
            };
            cancel.cancel();
        });
    }

    match begin(args, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(error = format!("{error:#}"), "encountered runtime error");
            ExitCode::FAILURE
        },
    }
}

async fn begin(args: Args, cancel: CancellationToken) -> Result<()> {
    let config = match &args.config {
        Some(path) => Config::load(path).await?,
        None => Config::default(),
    };
    let settings = config.resolve(&args);

    info!(
        max_concurrent_jobs = settings.options.max_concurrent_jobs(),
        shell = %settings.shell,
        "starting"
    );

    let queue: JobQueue<String> =
        JobQueue::new(settings.options).context("creating queue")?;
    {
        let shell: Arc<str> = settings.shell.into();
        queue.set_worker(move |job| run_command(shell.clone(), job));
    }

    let enqueued = read_commands(&queue, &cancel).await?;
    info!(enqueued, "finished reading input");

    select! {
        _ = queue.wait_idle() => (),
        _ = cancel.cancelled() => {
            warn!(remaining = queue.count(), "interrupted before draining");
        },
    }

    let stats = queue.stats();
    let yaml = serde_yaml::to_string(&stats).context("serialising stats")?;
    std::io::stdout()
        .write_all(yaml.as_bytes())
        .context("writing stats")?;

    if stats.total_error > 0 {
        bail!("{} command(s) failed", stats.total_error);
    }

    Ok(())
}

/// Enqueues each non-blank, non-comment line of stdin until end of input or
/// cancellation, returning how many were enqueued.
async fn read_commands(
    queue: &JobQueue<String>,
    cancel: &CancellationToken,
) -> Result<usize> {
    let mut r: LineReader<_> = tokio::io::stdin().into();
    let mut enqueued = 0;

    loop {
        let line = select!(
            x = r.read_line() => match x.context("reading stdin")? {
                Some(x) => x,
                None => return Ok(enqueued),
            },
            _ = cancel.cancelled() => return Ok(enqueued),
        );

        trace!(line = bytes_to_human_str(&line), "read line");

        let Ok(command) = std::str::from_utf8(&line) else {
            warn!(line = bytes_to_human_str(&line), "skipping non-UTF-8 line");
            continue;
        };
        let command = command.trim();
        if command.is_empty() || command.starts_with('#') {
            continue;
        }

        let (job, position) = queue.enqueue_payload(command.to_owned())?;
        debug!(job = %job.id(), position, "enqueued command");
        enqueued += 1;
    }
}

#[instrument(name = "job", skip_all, fields(id = %job.id()))]
async fn run_command(shell: Arc<str>, job: Arc<Job<String>>) -> Result<()> {
    debug!(command = %job.payload(), "running");

    let status = Command::new(&*shell)
        .arg("-c")
        .arg(job.payload())
        .stdin(Stdio::null())
        .status()
        .await
        .with_context(|| format!("spawning {shell}"))?;

    if !status.success() {
        bail!("`{}` exited with {status}", job.payload());
    }

    Ok(())
}
