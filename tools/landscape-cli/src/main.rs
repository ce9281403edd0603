// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use clap::{Args, Parser, Subcommand, ValueHint};
use landscape_config::{
    init_tracing_with, AxisRange, DeterminismConfig, LandscapeConfig, TracingOptions,
};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use st_landscape::{
    apply_angle, apply_curvature, apply_zero_shift, evaluate_sharpness, pipeline, read_parameters,
    random_direction, target_direction, CoordinateAxis, CrunchOptions, DirectionSet,
    DirectionStore, EvalSet, FieldKeys, OpenMode, SoftmaxProbe, SurfaceEvaluator, SurfaceFile,
    SurfaceGrid, SurfaceModel, Y_AXIS,
};
use std::error::Error;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::info;

type DynError = Box<dyn Error>;

type Result<T> = std::result::Result<T, DynError>;

const DIRECTION_RNG_LABEL: &str = pipeline::DIRECTION_RNG_LABEL;

/// Evaluation samples stored row-major with one class label per row.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct DiskDataset {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
    labels: Vec<usize>,
}

impl DiskDataset {
    fn into_eval_set(self) -> Result<EvalSet> {
        if self.cols == 0 {
            return Err(invalid_input("dataset must have at least one feature column"));
        }
        let expected = self.rows.checked_mul(self.cols).ok_or_else(|| {
            io::Error::new(
                ErrorKind::InvalidData,
                format!("dataset dimensions {} x {} overflow", self.rows, self.cols),
            )
        })?;
        if self.data.len() != expected {
            return Err(Box::new(io::Error::new(
                ErrorKind::InvalidData,
                format!(
                    "dataset payload has {} values but expected {expected} (rows * cols)",
                    self.data.len(),
                ),
            )));
        }
        let inputs = Array2::from_shape_vec((self.rows, self.cols), self.data)?;
        Ok(EvalSet::new(inputs, self.labels)?)
    }
}

#[derive(Parser)]
#[command(author, version, about = "Loss-landscape surfaces for SpiralTorch probes")]
struct Cli {
    /// Emit progress logs (per-run summaries) on stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Draw filter-normalised directions for a saved probe
    Directions(DirectionsArgs),

    /// Create (or resume) a surface file over a coordinate grid
    Setup(SetupArgs),

    /// Evaluate every pending grid point of a surface file
    Crunch(CrunchArgs),

    /// Derive zero-shifted, curvature and angle fields and report sharpness
    Metrics(MetricsArgs),

    /// Directions, setup and crunch in one go, driven by a JSON config
    Run(RunArgs),
}

#[derive(Args)]
struct DirectionsArgs {
    /// Saved probe state (JSON or bincode)
    #[arg(long, value_hint = ValueHint::FilePath)]
    model: PathBuf,

    /// Destination direction file; `.json` selects JSON, anything else bincode
    #[arg(long, value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Also draw a `y` direction
    #[arg(long = "two-d")]
    two_d: bool,

    /// Explicit RNG seed; otherwise LANDSCAPE_SEED / LANDSCAPE_DETERMINISTIC apply
    #[arg(long)]
    seed: Option<u64>,

    /// Second probe state; the `x` direction becomes `target - model`
    #[arg(long, value_hint = ValueHint::FilePath)]
    target: Option<PathBuf>,
}

#[derive(Args)]
struct SetupArgs {
    /// Surface file to create
    #[arg(long, value_hint = ValueHint::FilePath)]
    surface: PathBuf,

    /// Direction file the surface is evaluated along
    #[arg(long, value_hint = ValueHint::FilePath)]
    directions: PathBuf,

    #[arg(long, default_value_t = -1.0, allow_negative_numbers = true)]
    xmin: f64,

    #[arg(long, default_value_t = 1.0, allow_negative_numbers = true)]
    xmax: f64,

    #[arg(long, default_value_t = 51)]
    xnum: usize,

    /// Lower `y` bound; giving any `y` option makes the surface 2D
    #[arg(long, allow_negative_numbers = true)]
    ymin: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    ymax: Option<f64>,

    #[arg(long)]
    ynum: Option<usize>,

    /// Reuse an existing surface file with the same axes
    #[arg(long)]
    resume: bool,
}

#[derive(Args)]
struct CrunchArgs {
    /// Saved probe state (JSON or bincode)
    #[arg(long, value_hint = ValueHint::FilePath)]
    model: PathBuf,

    #[arg(long, value_hint = ValueHint::FilePath)]
    directions: PathBuf,

    #[arg(long, value_hint = ValueHint::FilePath)]
    surface: PathBuf,

    /// Evaluation dataset (JSON `{rows, cols, data, labels}`)
    #[arg(long, value_hint = ValueHint::FilePath)]
    data: PathBuf,

    #[arg(long, default_value = "train_loss")]
    loss_key: String,

    #[arg(long, default_value = "train_acc")]
    acc_key: String,

    #[arg(long, default_value_t = 128)]
    batch_size: usize,

    /// Grid points between two checkpoints of the surface file
    #[arg(long, default_value_t = 1)]
    checkpoint_every: usize,
}

#[derive(Args)]
struct MetricsArgs {
    /// Source field, e.g. `train_loss`
    #[arg(long, default_value = "train_loss")]
    field: String,

    /// Write `<field>_zeros`
    #[arg(long)]
    zeros: bool,

    /// Write `<field>_curv`
    #[arg(long)]
    curvature: bool,

    /// Write `<field>_angle`
    #[arg(long)]
    angle: bool,

    /// Print sharpness indices
    #[arg(long)]
    sharpness: bool,

    /// Also print the third (absolute) sharpness index
    #[arg(long)]
    absolute: bool,

    /// Surface files to process
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    files: Vec<PathBuf>,
}

#[derive(Args)]
struct RunArgs {
    /// Run configuration (JSON)
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: PathBuf,

    #[arg(long, value_hint = ValueHint::FilePath)]
    model: PathBuf,

    #[arg(long, value_hint = ValueHint::FilePath)]
    data: PathBuf,

    /// Directory receiving the direction and surface files
    #[arg(long, value_hint = ValueHint::DirPath)]
    output_dir: PathBuf,
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let mut options = TracingOptions::from_env()?;
    if !cli.verbose {
        options.default_filter = "warn".to_string();
    }
    init_tracing_with(options)?;

    match &cli.command {
        Command::Directions(args) => run_directions(args),
        Command::Setup(args) => run_setup(args),
        Command::Crunch(args) => run_crunch(args),
        Command::Metrics(args) => run_metrics(args),
        Command::Run(args) => run_pipeline(args),
    }
}

fn run_directions(args: &DirectionsArgs) -> Result<()> {
    let probe = read_probe(&args.model)?;
    let weights = probe.snapshot()?;
    let mut rng = DeterminismConfig::from_env().rng_from_optional(args.seed, DIRECTION_RNG_LABEL);
    let model_ref = args.model.display().to_string();
    let set = match &args.target {
        Some(target) => {
            let target = read_probe(target)?.snapshot()?;
            DirectionSet {
                model: model_ref,
                x: target_direction(&weights, &target)?,
                y: args.two_d.then(|| random_direction(&weights, &mut rng)),
            }
        }
        None => DirectionSet::random(model_ref, &weights, args.two_d, &mut rng),
    };
    let mut store = DirectionStore::create(&args.output, set.model.clone());
    store.write_set(&set);
    store.save()?;
    println!(
        "direction file created: {} ({})",
        args.output.display(),
        if set.is_two_dimensional() { "2D" } else { "1D" }
    );
    Ok(())
}

fn run_setup(args: &SetupArgs) -> Result<()> {
    let x = CoordinateAxis::from_range(&AxisRange::new(args.xmin, args.xmax, args.xnum))?;
    let grid = match (args.ymin, args.ymax, args.ynum) {
        (None, None, None) => SurfaceGrid::one_dimensional(x),
        (ymin, ymax, ynum) => {
            let defaults = AxisRange::default();
            let y = AxisRange::new(
                ymin.unwrap_or(defaults.min),
                ymax.unwrap_or(defaults.max),
                ynum.unwrap_or(defaults.num),
            );
            SurfaceGrid::two_dimensional(x, CoordinateAxis::from_range(&y)?)
        }
    };
    let store = DirectionStore::open(&args.directions)?;
    if grid.is_two_dimensional() && !store.contains(Y_AXIS) {
        return Err(invalid_input(format!(
            "{} holds no {Y_AXIS} direction; a 2D surface needs one",
            args.directions.display()
        )));
    }
    let mode = if args.resume {
        OpenMode::Resume
    } else {
        OpenMode::Create
    };
    let shape = grid.shape();
    let surface = SurfaceFile::create(
        &args.surface,
        args.directions.display().to_string(),
        grid,
        mode,
    )?;
    println!("surface file ready: {} {:?}", surface.path().display(), shape);
    Ok(())
}

fn run_crunch(args: &CrunchArgs) -> Result<()> {
    let mut probe = read_probe(&args.model)?;
    let data = read_dataset(&args.data)?;
    let directions = DirectionStore::open(&args.directions)?.read_set()?;
    let mut surface = SurfaceFile::open(&args.surface)?;
    let mut evaluator = SurfaceEvaluator::new(probe.snapshot()?, directions)?;
    let report = evaluator.crunch(
        &mut surface,
        &mut probe,
        &data,
        &FieldKeys::new(args.loss_key.clone(), args.acc_key.clone()),
        CrunchOptions {
            batch_size: args.batch_size,
            checkpoint_every: args.checkpoint_every,
        },
    )?;
    println!(
        "evaluated {} points, skipped {} in {:.3}s",
        report.evaluated,
        report.skipped,
        report.elapsed.as_secs_f64()
    );
    Ok(())
}

fn run_metrics(args: &MetricsArgs) -> Result<()> {
    if !(args.zeros || args.curvature || args.angle || args.sharpness) {
        return Err(invalid_input(
            "select at least one of --zeros, --curvature, --angle, --sharpness",
        ));
    }
    for path in &args.files {
        let mut surface = SurfaceFile::open(path)?;
        if args.zeros {
            apply_zero_shift(&mut surface, &args.field)?;
        }
        if args.curvature {
            apply_curvature(&mut surface, &args.field)?;
        }
        if args.angle {
            apply_angle(&mut surface, &args.field)?;
        }
        if args.sharpness {
            let report = evaluate_sharpness(&surface, &args.field)?;
            if args.absolute {
                println!("{report},\tsharpness 3: {:.6}", report.absolute);
            } else {
                println!("{report}");
            }
            println!("{}", "-".repeat(66));
        }
    }
    Ok(())
}

fn run_pipeline(args: &RunArgs) -> Result<()> {
    let config = LandscapeConfig::from_path(&args.config)?;
    let mut probe = read_probe(&args.model)?;
    let data = read_dataset(&args.data)?;
    let model_name = args
        .model
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .ok_or_else(|| invalid_input("model path has no file name"))?;
    fs::create_dir_all(&args.output_dir)?;
    let output = pipeline::run(
        &config,
        &DeterminismConfig::from_env(),
        &mut probe,
        &model_name,
        &data,
        &args.output_dir,
    )?;
    info!(surface = %output.surface.display(), "pipeline finished");
    println!("directions: {}", output.directions.display());
    println!("surface: {}", output.surface.display());
    println!(
        "evaluated {} points, skipped {}",
        output.report.evaluated, output.report.skipped
    );
    Ok(())
}

fn read_probe(path: &Path) -> Result<SoftmaxProbe> {
    Ok(SoftmaxProbe::from_parameters(read_parameters(path)?)?)
}

fn read_dataset(path: &Path) -> Result<EvalSet> {
    let raw = fs::read_to_string(path)?;
    let dataset: DiskDataset = serde_json::from_str(&raw)?;
    dataset.into_eval_set()
}

fn invalid_input(message: impl Into<String>) -> DynError {
    Box::new(io::Error::new(ErrorKind::InvalidInput, message.into()))
}
