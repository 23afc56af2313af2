//! Tourism: Model Training CLI Tool
//!
//! Trains tourism-package purchase models from a JSON configuration,
//! promotes the best one and scores new records with a trained bundle.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tourism::cli::predict::{run_predict_file, run_predict_record};
use tourism::cli::train::run_train;
use tourism::cli::validate::run_validate;
use tourism::cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tourism=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let output = cli.command.prediction_output_path();
    match &cli.command {
        Commands::Train {
            config,
            data_root,
            remote_root,
            report,
        } => run_train(config, data_root, remote_root, report.as_deref(), cli.quiet),
        Commands::Validate { config, data_root } => run_validate(config, data_root, cli.quiet),
        Commands::Predict {
            model,
            record,
            input,
            ..
        } => match (record, input, output) {
            (Some(record), _, _) => run_predict_record(model, record, cli.quiet).map(|_| ()),
            (None, Some(input), Some(output)) => run_predict_file(model, input, &output, cli.quiet),
            _ => anyhow::bail!("Either --record or --input is required"),
        },
    }
}
