use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use bayes_chain::{hasher, parser, BayesError, ClassMap, DumpFormat, Predictor, PredictorConfig};
use clap::{Parser, Subcommand};
use tracing::error;

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Clone, Debug)]
enum Command {
    /// Print the UID of a single literal
    Hash {
        literal: String,
    },

    /// Train a model from a file holding one sequence per line
    Train {
        #[clap(long)]
        model: PathBuf,

        #[clap(long, default_value = "json")]
        format: DumpFormat,

        #[clap(long, default_value = "0")]
        node_id: u64,

        input: PathBuf,
    },

    /// Predict the item following a sequence
    Predict {
        #[clap(long)]
        model: PathBuf,

        #[clap(long, default_value = "json")]
        format: DumpFormat,

        #[clap(long, default_value = "1")]
        top: usize,

        #[clap(required = true, allow_hyphen_values = true)]
        sequence: Vec<String>,
    },
}

fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info,bayes_chain=info");
    }
    tracing_subscriber::fmt()
    .with_target(false)
    .with_level(true)
    .init();

    let args = Args::parse();
    if let Err(e) = run(args.command) {
        error!("{}", e);
        process::exit(1);
    }
}

fn run(command: Command) -> bayes_chain::Result<()> {
    match command {
        Command::Hash { literal } => {
            let value = parser::parse_value(&literal)?;
            println!("{:016x}  {} ({})", hasher::to_uid(&value), value, value.kind());
            Ok(())
        },
        Command::Train { model, format, node_id, input } => train(&model, format, node_id, &input),
        Command::Predict { model, format, top, sequence } => predict(&model, format, top, &sequence.join(" ")),
    }
}

fn train(model: &Path, format: DumpFormat, node_id: u64, input: &Path) -> bayes_chain::Result<()> {
    let mut predictor = Predictor::with_config(PredictorConfig { node_id, dump_format: format });
    if model.exists() {
        predictor.restore(model)?;
    }

    let text = fs::read_to_string(input)?;
    let mut trained = 0usize;
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let row = parser::parse_sequence(line).map_err(|e| match e {
            BayesError::InvalidLiteral { reason } => BayesError::InvalidLiteral {
                reason: format!("{}:{}: {}", input.display(), n + 1, reason),
            },
            other => other,
        })?;
        predictor.train(row)?;
        trained += 1;
    }

    predictor.store(model)?;

    let transitions = predictor.log().map(|log| log.total_accesses()).unwrap_or(0);
    println!(
        "Trained {} sequences: {} transitions, {} classes -> {}",
        trained,
        transitions,
        predictor.classes().len(),
        model.display()
    );
    Ok(())
}

fn predict(model: &Path, format: DumpFormat, top: usize, sequence: &str) -> bayes_chain::Result<()> {
    let mut predictor = Predictor::with_config(PredictorConfig { dump_format: format, ..Default::default() });
    predictor.restore(model)?;

    let history = parser::parse_sequence(sequence)?;
    for (rank, p) in predictor.rank(history)?.iter().take(top.max(1)).enumerate() {
        println!("{:>3}. {:<20} p={:.4}  uid={:016x}", rank + 1, p.value.to_string(), p.probability, p.class_id);
    }
    Ok(())
}
