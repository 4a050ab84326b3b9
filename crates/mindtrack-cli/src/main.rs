// ─────────────────────────────────────────────────────────────────────
// MindTrack — CLI
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! `mindtrack` command-line entry point.
//!
//! Subcommands:
//!   features  -- print the handwriting feature vector of one image
//!   train     -- train the fusion classifier on a class-per-directory dataset
//!   predict   -- classify one image with a trained model
//!   import-backbone -- convert exported pretrained conv weights to the native layout

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mindtrack_ml::inference::{ImageInput, InferenceContext};
use mindtrack_ml::{import_backbone, train_from_directory};
use mindtrack_types::config::{KernelLayout, PipelineConfig};
use mindtrack_types::constants::MODEL_FILE;
use mindtrack_types::error::MindTrackError;
use image::DynamicImage;
use mindtrack_vision::{decode_path, extract_features, resize_square};
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "mindtrack", about = "Handwriting dysgraphia screening")]
struct Cli {
    /// JSON pipeline configuration; defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract the 15-slot handwriting feature vector from one image.
    Features {
        image: PathBuf,

        /// Resize to the configured square resolution first, as the
        /// training feature cache does.
        #[arg(long)]
        resize: bool,
    },

    /// Train on `<data-dir>/dysgraphic` and `<data-dir>/non-dysgraphic`.
    Train {
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Output path for model weights; the scaler is written alongside.
        #[arg(long, default_value = MODEL_FILE)]
        output: PathBuf,

        #[arg(long)]
        epochs: Option<usize>,

        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Classify one image.
    Predict {
        image: PathBuf,

        /// Model weights; tries the configured candidates when omitted.
        #[arg(long)]
        model: Option<PathBuf>,

        /// Fail instead of falling back when the model has no scaler.
        #[arg(long)]
        require_scaler: bool,
    },

    /// Convert an exported `conv{i}.weight` archive into a native backbone
    /// archive usable as `model.backbone_weights`.
    ImportBackbone {
        input: PathBuf,
        output: PathBuf,

        #[arg(long, value_enum, default_value_t = LayoutArg::Hwio)]
        layout: LayoutArg,

        #[arg(long, default_value_t = 1e-3)]
        bn_epsilon: f64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LayoutArg {
    Hwio,
    Oihw,
}

impl From<LayoutArg> for KernelLayout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Hwio => KernelLayout::Hwio,
            LayoutArg::Oihw => KernelLayout::Oihw,
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::from_file(p)
            .with_context(|| format!("failed to load config {}", p.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn features(image: &Path, resize: bool, config: &PipelineConfig) -> Result<()> {
    let decoded = decode_path(image)?;
    let vector = if resize {
        let resized = resize_square(&decoded, config.dataset.image_size);
        extract_features(&DynamicImage::ImageRgb8(resized))
    } else {
        extract_features(&decoded)
    };
    let report = json!({
        "image": image.display().to_string(),
        "stroke_consistency": vector[0],
        "letter_spacing": vector[1],
        "alignment": vector[2],
        "features": vector.to_vec(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn train(
    data_dir: &Path,
    output: &Path,
    epochs: Option<usize>,
    batch_size: Option<usize>,
    mut config: PipelineConfig,
) -> Result<()> {
    if let Some(e) = epochs {
        config.trainer.epochs = e;
    }
    if let Some(b) = batch_size {
        config.dataset.batch_size = b;
    }

    let outcome = train_from_directory(data_dir, output, &config)?;
    let last = outcome.history.epochs.last();
    let report = json!({
        "model": outcome.model_path.display().to_string(),
        "scaler": outcome.scaler_path.as_ref().map(|p| p.display().to_string()),
        "class_indices": outcome.class_indices,
        "train_samples": outcome.train_samples,
        "val_samples": outcome.val_samples,
        "epochs_run": outcome.history.epochs.len(),
        "best_epoch": outcome.history.best_epoch,
        "best_val_loss": outcome.history.best_val_loss,
        "stopped_early": outcome.history.stopped_early,
        "final_val_accuracy": last.map(|m| m.val_accuracy),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn predict(
    image: &Path,
    model: Option<PathBuf>,
    require_scaler: bool,
    mut config: PipelineConfig,
) -> Result<()> {
    if let Some(m) = model {
        config.inference.model_candidates = vec![m];
    }
    config.inference.require_scaler |= require_scaler;

    let ctx = InferenceContext::load(&config.inference)?;
    let assessment = ctx.assess(ImageInput::Path(image));
    let report = json!({
        "prediction": assessment.prediction,
        "confidence": assessment.confidence,
        "interpretation": assessment.interpretation,
        "model_loaded": ctx.model_loaded(),
        "model_source": ctx.model_source().map(|p| p.display().to_string()),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn import(input: &Path, output: &Path, layout: LayoutArg, bn_epsilon: f64) -> Result<()> {
    let backbone = import_backbone(input, layout.into(), bn_epsilon)
        .with_context(|| format!("failed to import {}", input.display()))?;
    backbone.save_npz(output)?;
    let report = json!({
        "output": output.display().to_string(),
        "layers": backbone.layers.len(),
        "channels": backbone.layers.iter().map(|l| l.out_channels()).collect::<Vec<_>>(),
        "embedding_dim": backbone.embedding_dim(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Command::Features { image, resize } => features(&image, resize, &config),
        Command::Train {
            data_dir,
            output,
            epochs,
            batch_size,
        } => train(&data_dir, &output, epochs, batch_size, config),
        Command::Predict {
            image,
            model,
            require_scaler,
        } => predict(&image, model, require_scaler, config),
        Command::ImportBackbone {
            input,
            output,
            layout,
            bn_epsilon,
        } => import(&input, &output, layout, bn_epsilon),
    });

    if let Err(e) = result {
        if let Some(MindTrackError::DatasetStructure(msg)) = e.downcast_ref::<MindTrackError>() {
            tracing::error!(%msg, "dataset structure check failed");
        }
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
