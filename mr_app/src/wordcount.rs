use std::path::PathBuf;

use clap::Parser;
use mr::{Coordinator, KeyValue, KvList};
use tracing::info;

mod common;

use common::EngineArgs;

/// Count word occurrences across text files.
#[derive(Parser, Debug)]
#[command(name = "wordcount", version)]
struct Cli {
    /// Input text files
    #[arg(required = true)]
    files: Vec<PathBuf>,

    #[command(flatten)]
    engine: EngineArgs,

    /// Write the counts as JSON here instead of printing them
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn map_function(record: &KeyValue, sink: &mut KvList) -> anyhow::Result<()> {
    for word in record.value().split_whitespace() {
        sink.emit(word, "1");
    }
    Ok(())
}

fn reduce_function(key: &str, group: &KvList, sink: &mut KvList) -> anyhow::Result<()> {
    let mut count: u64 = 0;
    for item in group.values() {
        count += item.parse::<u64>()?;
    }
    sink.emit(key, count.to_string());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    common::init_logging(cli.verbose);
    let config = cli.engine.resolve()?;

    let mut input = KvList::new();
    for file in &cli.files {
        input.extend(common::read_text(file)?);
    }

    let mut output = KvList::new();
    let stats = Coordinator::from_config(&config)?.run(
        &map_function,
        &reduce_function,
        &input,
        &mut output,
    )?;
    info!(
        lines = stats.records_in,
        words = stats.intermediate_pairs,
        distinct = stats.records_out,
        map_ms = stats.map_ms,
        reduce_ms = stats.reduce_ms,
        "wordcount finished"
    );

    common::emit_result(output, cli.output.as_deref())
}
