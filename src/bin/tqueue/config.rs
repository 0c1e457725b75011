use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use throttled_queue::QueueOptions;

use crate::args::Args;

/// Settings as read from a config file, before flags are applied.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub(crate) struct Config {
    pub(crate) max_concurrent_jobs: Option<usize>,
    pub(crate) shell: Option<String>,
}

/// Fully resolved settings.
#[derive(Debug, PartialEq)]
pub(crate) struct Settings {
    pub(crate) options: QueueOptions,
    pub(crate) shell: String,
}

impl Config {
    pub(crate) async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;

        Self::parse(&raw)
            .with_context(|| format!("parsing {}", path.display()))
    }

    fn parse(raw: &str) -> Result<Self> {
        // An empty document deserialises as null rather than a mapping.
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        Ok(serde_yaml::from_str(raw)?)
    }

    /// Layers `args` over the file settings, then defaults.
    pub(crate) fn resolve(self, args: &Args) -> Settings {
        let options = match args.jobs.or(self.max_concurrent_jobs) {
            Some(n) => QueueOptions::new(n),
            None => QueueOptions::default(),
        };

        let shell = args
            .shell
            .clone()
            .or(self.shell)
            .unwrap_or_else(|| "sh".to_owned());

        Settings { options, shell }
    }
}
