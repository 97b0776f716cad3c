use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use skinlens_core::face::{DEFAULT_MIN_NEIGHBORS, DEFAULT_MIN_SIZE, DEFAULT_SCALE_FACTOR};
use skinlens_core::manifest::{manifest_path, ModelManifest};
use skinlens_core::policy::{
    DEFAULT_ADVISORY_HIGH, DEFAULT_ADVISORY_LOW, DEFAULT_CONFIDENCE_FLOOR,
};
use skinlens_core::preprocess::{Interpolation, SERVING_INPUT_SIZE};
use skinlens_core::{
    catalog, Analysis, CascadeParams, DecisionPolicy, FacePolicy, FaceStage, LoadOptions,
    Pipeline, PredictionVector,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "skinlens", about = "SkinLens skin analysis CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one or more face photos locally
    Analyze {
        /// JPEG or PNG files
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Print one JSON object per image instead of cards
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Write the label manifest for a model from its training dataset layout
    Labels {
        /// Dataset directory with one subfolder per class
        dataset: PathBuf,
        /// Model file the manifest belongs to
        #[arg(long, default_value = "model/skin_model.onnx")]
        model: PathBuf,
        /// Input resolution the model was trained at
        #[arg(long, default_value_t = SERVING_INPUT_SIZE)]
        input_size: u32,
        /// Resize filter: nearest, bilinear or bicubic
        #[arg(long, default_value = "bicubic")]
        interpolation: Interpolation,
        /// Print the manifest without writing it
        #[arg(long)]
        dry_run: bool,
    },
    /// Load the model, manifest and cascade and report what was found
    Check {
        #[command(flatten)]
        model: ModelArgs,
    },
}

#[derive(Args)]
struct ModelArgs {
    /// Directory containing the classifier and cascade model
    #[arg(long, env = "SKINLENS_MODEL_DIR", default_value = "model")]
    model_dir: PathBuf,
    #[arg(long, env = "SKINLENS_MODEL_FILE", default_value = "skin_model.onnx")]
    model_file: String,
    #[arg(long, env = "SKINLENS_CASCADE_FILE", default_value = "seeta_fd_frontal_v1.0.bin")]
    cascade_file: String,
    /// skip, fallback or require
    #[arg(long, env = "SKINLENS_FACE_POLICY", default_value = "fallback")]
    face_policy: FacePolicy,
    /// Ratio between cascade pyramid levels
    #[arg(long, env = "SKINLENS_SCALE_FACTOR", default_value_t = DEFAULT_SCALE_FACTOR)]
    scale_factor: f32,
    #[arg(long, env = "SKINLENS_MIN_NEIGHBORS", default_value_t = DEFAULT_MIN_NEIGHBORS)]
    min_neighbors: u32,
    /// Smallest face edge in pixels of the downscaled image
    #[arg(long, env = "SKINLENS_MIN_FACE_SIZE", default_value_t = DEFAULT_MIN_SIZE)]
    min_face_size: u32,
    #[arg(long, env = "SKINLENS_CONFIDENCE_FLOOR", default_value_t = DEFAULT_CONFIDENCE_FLOOR)]
    confidence_floor: f32,
    #[arg(long, env = "SKINLENS_ADVISORY_LOW", default_value_t = DEFAULT_ADVISORY_LOW)]
    advisory_low: f32,
    #[arg(long, env = "SKINLENS_ADVISORY_HIGH", default_value_t = DEFAULT_ADVISORY_HIGH)]
    advisory_high: f32,
    #[arg(long, env = "SKINLENS_INTRA_THREADS", default_value_t = 2)]
    intra_threads: usize,
}

impl ModelArgs {
    fn load_options(&self) -> Result<LoadOptions> {
        if self.advisory_low > self.advisory_high {
            bail!(
                "advisory band is empty: low {} > high {}",
                self.advisory_low,
                self.advisory_high
            );
        }
        Ok(LoadOptions {
            model_path: self.model_dir.join(&self.model_file),
            cascade_path: self.model_dir.join(&self.cascade_file),
            face_policy: self.face_policy,
            cascade: CascadeParams {
                scale_factor: self.scale_factor,
                min_neighbors: self.min_neighbors,
                min_size: self.min_face_size,
            },
            decision: DecisionPolicy {
                confidence_floor: self.confidence_floor,
                advisory_low: self.advisory_low,
                advisory_high: self.advisory_high,
            },
            intra_threads: self.intra_threads,
        })
    }
}

/// One `--json` output line.
#[derive(Serialize)]
struct JsonReport<'a> {
    file: String,
    #[serde(flatten)]
    analysis: &'a Analysis,
    scores: &'a PredictionVector,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze { images, json, model } => analyze(&images, json, &model),
        Commands::Labels {
            dataset,
            model,
            input_size,
            interpolation,
            dry_run,
        } => labels(&dataset, &model, input_size, interpolation, dry_run),
        Commands::Check { model } => check(&model),
    }
}

fn analyze(images: &[PathBuf], json: bool, args: &ModelArgs) -> Result<()> {
    let mut pipeline =
        Pipeline::load(&args.load_options()?).context("failed to load analysis pipeline")?;
    let mut failures = 0usize;

    for path in images {
        let bytes =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let report = match pipeline.analyze_bytes(&bytes) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("{}: {e}", path.display());
                failures += 1;
                continue;
            }
        };

        if json {
            let line = JsonReport {
                file: path.display().to_string(),
                analysis: &report.analysis,
                scores: &report.scores,
            };
            println!("{}", serde_json::to_string(&line)?);
            continue;
        }

        let card = report.analysis.card();
        println!("== {}", path.display());
        println!("  Diagnosis       {}", card.title);
        println!("  Confidence      {}", card.confidence);
        println!("  Description     {}", card.description);
        println!("  Recommendation  {}", card.recommendation);
        if let Some(note) = card.note {
            println!("  Note            {note}");
        }
        match report.face {
            FaceStage::Cropped(r) => {
                println!("  Face            {}x{} at ({}, {})", r.width, r.height, r.x, r.y)
            }
            FaceStage::FellBack => println!("  Face            not found, whole image used"),
            FaceStage::Skipped => {}
        }
        println!("  Scores");
        for (label, score) in report.scores.iter() {
            println!("    {:<18}{:>7.2}%", label.as_str(), score * 100.0);
        }
    }

    if failures > 0 {
        bail!("{failures} of {} images could not be analyzed", images.len());
    }
    Ok(())
}

fn labels(
    dataset: &Path,
    model: &Path,
    input_size: u32,
    interpolation: Interpolation,
    dry_run: bool,
) -> Result<()> {
    let manifest = ModelManifest {
        input_size,
        interpolation,
        ..ModelManifest::from_dataset_dir(dataset)?
    };
    manifest.validate()?;
    let rendered = serde_json::to_string_pretty(&manifest)?;

    if dry_run {
        println!("{rendered}");
        return Ok(());
    }

    let path = manifest_path(model);
    manifest.write(&path)?;
    println!(
        "wrote {} ({} labels: {})",
        path.display(),
        manifest.labels.len(),
        label_list(&manifest.labels)
    );
    Ok(())
}

fn check(args: &ModelArgs) -> Result<()> {
    let opts = args.load_options()?;
    let pipeline = Pipeline::load(&opts).context("failed to load analysis pipeline")?;

    println!("model          {}", opts.model_path.display());
    println!("manifest       {}", manifest_path(&opts.model_path).display());
    println!("labels         {}", label_list(pipeline.labels()));
    println!("input size     {0}x{0}", pipeline.input_size());
    println!("interpolation  {:?}", pipeline.interpolation());
    println!("face policy    {}", pipeline.face_policy());

    for &label in pipeline.labels() {
        let entry = catalog::entry(label);
        if entry.description.is_empty() || entry.recommendation.is_empty() {
            bail!("catalog entry for {label} is incomplete");
        }
    }
    println!("catalog        ok");
    Ok(())
}

fn label_list(labels: &[skinlens_core::Label]) -> String {
    labels.iter().map(|l| l.as_str()).collect::<Vec<_>>().join(", ")
}
