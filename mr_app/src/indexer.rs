use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::Parser;
use mr::{Coordinator, KeyValue, KvList};
use tracing::info;

mod common;

use common::EngineArgs;

/// Build an inverted index: for every word, the files it appears in.
#[derive(Parser, Debug)]
#[command(name = "indexer", version)]
struct Cli {
    /// Input text files
    #[arg(required = true)]
    files: Vec<PathBuf>,

    #[command(flatten)]
    engine: EngineArgs,

    /// Write the index as JSON here instead of printing it
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

// record key is the file name, value one line of it
fn map_function(record: &KeyValue, sink: &mut KvList) -> anyhow::Result<()> {
    for word in record.value().split(|c: char| !c.is_alphanumeric()) {
        if !word.is_empty() {
            sink.emit(word.to_lowercase(), record.key());
        }
    }
    Ok(())
}

fn reduce_function(key: &str, group: &KvList, sink: &mut KvList) -> anyhow::Result<()> {
    let files: BTreeSet<&str> = group.values().collect();
    let joined: Vec<&str> = files.into_iter().collect();
    sink.emit(key, format!("{} {}", joined.len(), joined.join(",")));
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    common::init_logging(cli.verbose);
    let config = cli.engine.resolve()?;

    let mut input = KvList::new();
    for file in &cli.files {
        let name = file.display().to_string();
        input.extend(
            common::read_text(file)?
                .into_iter()
                .map(|line| KeyValue::new(name.clone(), line.value()))
                .collect(),
        );
    }

    let mut output = KvList::new();
    let stats = Coordinator::from_config(&config)?.run(
        &map_function,
        &reduce_function,
        &input,
        &mut output,
    )?;
    info!(
        files = cli.files.len(),
        lines = stats.records_in,
        words = stats.records_out,
        "index built"
    );

    common::emit_result(output, cli.output.as_deref())
}
