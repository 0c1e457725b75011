use std::path::PathBuf;

use clap::Parser;

/// Runs shell commands read from stdin, one per line, with bounded
/// concurrency.
#[derive(Parser, Debug)]
#[command(about, long_about = None, version)]
pub(crate) struct Args {
    /// Maximum number of commands to run at once [default: CPU count].
    #[arg(short, long)]
    pub(crate) jobs: Option<usize>,
    /// YAML file to read settings from. Flags take precedence.
    #[arg(short, long)]
    pub(crate) config: Option<PathBuf>,
    /// Shell used to run each command as `<shell> -c <command>`.
    #[arg(short, long)]
    pub(crate) shell: Option<String>,
    /// Enables human-friendly logging.
    #[arg(short, long, default_value_t)]
    pub(crate) debug: bool,
}
