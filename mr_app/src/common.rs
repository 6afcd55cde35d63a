use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use mr::{EngineConfig, KvList};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Worker-count flags shared by every app. Flags win over the config file.
#[derive(Args, Debug)]
pub struct EngineArgs {
    /// Number of map worker threads
    #[arg(short = 'm', long)]
    pub mappers: Option<usize>,

    /// Number of reduce worker threads (one partition each)
    #[arg(short = 'r', long)]
    pub reducers: Option<usize>,

    /// JSON file with `num_mapper` / `num_reducer`
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl EngineArgs {
    pub fn resolve(&self) -> anyhow::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => EngineConfig::default(),
        };
        if let Some(m) = self.mappers {
            config.num_mapper = m;
        }
        if let Some(r) = self.reducers {
            config.num_reducer = r;
        }
        config.validate()?;
        debug!(?config, "engine configuration");
        Ok(config)
    }
}

/// `RUST_LOG` takes precedence over the `-v` count.
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .with_thread_names(verbose >= 1)
        .with_writer(std::io::stderr)
        .init();
}

/// Reads one text file into line records, keyed by line number.
pub fn read_text(path: &Path) -> anyhow::Result<KvList> {
    mr::io::read_lines_as_records(path).with_context(|| format!("reading {}", path.display()))
}

/// Prints `key\tvalue` lines sorted by key, or saves JSON when `output` is set.
pub fn emit_result(mut result: KvList, output: Option<&Path>) -> anyhow::Result<()> {
    result.sort_by_key();
    match output {
        Some(path) => mr::io::save_result(&result, path)
            .with_context(|| format!("saving result to {}", path.display()))?,
        None => {
            for kv in &result {
                println!("{}\t{}", kv.key(), kv.value());
            }
        }
    }
    Ok(())
}
