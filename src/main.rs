//! dynkg CLI: train and run relational GNN risk classifiers on scene-graph sequences.

use clap::{Parser, Subcommand};
use dynkg::config::{RunArgs, RunConfig};
use dynkg::core::NUM_CLASSES;
use dynkg::metrics::{argmax, positive_class_roc, risk_scores, score, write_roc_csv};
use dynkg::monitoring::{init_logging, LoggerConfig};
use dynkg::trainer::{DynKGTrainer, InferenceOutput};
use dynkg::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "dynkg")]
#[command(about = "Dynamic scene-graph risk classification with relational GNNs")]
#[command(version)]
struct Cli {
    /// Log level, options: [trace, debug, info, warn, error]
    #[arg(long = "log_level", global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long = "log_json", global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model and record its best test result
    Train {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Score the testing split with a saved checkpoint
    Infer {
        #[command(flatten)]
        run: RunArgs,

        /// Per-sequence predictions output (JSON)
        #[arg(long = "predictions_path", default_value = "predictions.json")]
        predictions_path: PathBuf,

        /// Optional ROC points output (CSV)
        #[arg(long = "roc_path")]
        roc_path: Option<PathBuf>,
    },
}

/// One scored sequence.
#[derive(Serialize)]
struct Prediction<'a> {
    folder_name: &'a str,
    label: u8,
    prediction: u8,
    logits: [f32; NUM_CLASSES],
    risk_score: f32,
}

fn main() {
    let cli = Cli::parse();

    let logger = match LoggerConfig::from_options(&cli.log_level, cli.log_json) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };
    init_logging(&logger);

    let invocation = std::env::args().collect::<Vec<_>>().join(" ");
    let result = match cli.command {
        Commands::Train { run } => cmd_train(run, &invocation),
        Commands::Infer {
            run,
            predictions_path,
            roc_path,
        } => cmd_infer(run, &invocation, &predictions_path, roc_path.as_deref()),
    };

    if let Err(e) = result {
        error!(error = %e, "Run failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn cmd_train(run: RunArgs, invocation: &str) -> Result<()> {
    let config = RunConfig::try_from(run)?;
    info!(seed = config.seed, model = %config.model, "Configured run");

    let mut trainer = DynKGTrainer::new(config, invocation)?;
    trainer.build_model()?;
    trainer.train()?;
    let report = trainer.evaluate(None)?;

    println!("Best epoch:     {}", trainer.best_epoch());
    println!("Best test loss: {:.4}", trainer.best_val_loss());
    println!(
        "Final test:     acc {:.4}  f1 {:.4}  auc {:.4}  confusion {}",
        report.test.acc, report.test.f1, report.test.auc, report.test.confusion
    );
    Ok(())
}

fn cmd_infer(
    run: RunArgs,
    invocation: &str,
    predictions_path: &Path,
    roc_path: Option<&Path>,
) -> Result<()> {
    let config = RunConfig::try_from(run)?;
    let mut trainer = DynKGTrainer::new(config, invocation)?;
    if !trainer.load_model()? {
        return Err(Error::config(format!(
            "no checkpoint at {}",
            trainer.config().model_load_path.display()
        )));
    }

    let output = trainer.inference(&trainer.dataset().test)?;
    let metrics = score(&output.outputs, &output.labels).with_loss(output.loss);
    info!(
        sequences = output.outputs.len(),
        loss = metrics.loss,
        acc = metrics.acc,
        f1 = metrics.f1,
        auc = metrics.auc,
        confusion = %metrics.confusion,
        distribution = %metrics.label_distribution,
        "Inference finished"
    );

    write_predictions(predictions_path, &output)?;
    info!(path = %predictions_path.display(), "Wrote predictions");

    if let Some(path) = roc_path {
        match positive_class_roc(&output.outputs, &output.labels) {
            Ok(curve) => {
                write_roc_csv(path, &curve)?;
                info!(path = %path.display(), auc = curve.auc(), "Wrote ROC curve");
            }
            Err(err) => warn!(error = %err, "Skipping ROC curve"),
        }
    }
    Ok(())
}

fn write_predictions(path: &Path, output: &InferenceOutput) -> Result<()> {
    let scores = risk_scores(&output.outputs);
    let rows: Vec<Prediction> = output
        .outputs
        .iter()
        .zip(&output.labels)
        .zip(&output.folder_names)
        .zip(scores)
        .map(|(((logits, &label), name), risk_score)| Prediction {
            folder_name: name,
            label,
            prediction: argmax(logits),
            logits: *logits,
            risk_score,
        })
        .collect();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&rows)?)?;
    Ok(())
}
