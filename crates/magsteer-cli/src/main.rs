//! magsteer CLI: calibration, planning and simulated delivery runs.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use magsteer::actuation::{
    CoilQuery, NeuralActuationModel, SurfaceFitModel, ACTUATION_SCHEMA_V1, FEATURES, HIDDEN_UNITS,
};
use magsteer::calibration::CalibrationStatus;
use magsteer::geometry::distance;
use magsteer::navigation::ControllerEvents;
use magsteer::path::{read_path_file, validate_path_params};
use magsteer::sim::SimRig;
use magsteer::{
    build_model, ActuationModel, Axis, BackgroundModel, CalibrationJog, CalibrationSnapshot, Clock, Coil,
    CoilSet, ControllerConfig, CoordinateCalibrator, DeliveryPath, HardwareDispatcher,
    MarkerDictionary, ModelKind, Operation, ParticleLocalizer, StagnationBoost,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "magsteer")]
#[command(about = "Closed-loop navigation of a magnetic micro-particle between four coils")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Calibrate the coordinate frame from camera frames showing the coil markers.
    Calibrate {
        /// Frames to sample (at most `calibration.sample_limit` are used).
        #[arg(long, num_args = 1.., required = true)]
        frames: Vec<PathBuf>,

        /// Controller config (JSON, `magsteer.config.v1`).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Where to write the calibration snapshot (JSON).
        #[arg(long)]
        out: PathBuf,
    },

    /// Locate the particle in one frame.
    Localize {
        /// Calibration snapshot written by `calibrate`.
        #[arg(long)]
        snapshot: PathBuf,

        /// Particle-free frames averaged into the background.
        #[arg(long, num_args = 1.., required = true)]
        background: Vec<PathBuf>,

        /// Frame to search.
        #[arg(long)]
        frame: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Discretize a checkpoint file into the traversal path.
    Plan {
        #[arg(long)]
        snapshot: PathBuf,

        /// Checkpoint file (`x,y` per line, physical units).
        #[arg(long)]
        path: PathBuf,

        /// Arrival tolerance (physical units).
        #[arg(long, default_value = "0.5")]
        tolerance: f64,

        /// Maximum gap between consecutive path points (physical units).
        #[arg(long, default_value = "2.0")]
        interpolation: f64,

        /// Write the discretized path (JSON) here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Run a full delivery on the simulated rig.
    Simulate {
        #[arg(long)]
        config: Option<PathBuf>,

        /// Checkpoint file; defaults to an L-shaped path from the origin.
        #[arg(long)]
        path: Option<PathBuf>,

        /// Stop (pause) after this many ticks.
        #[arg(long, default_value = "500")]
        max_ticks: u64,

        /// Write the data log (CSV) here.
        #[arg(long)]
        log: Option<PathBuf>,
    },

    /// Print actuation model parameters and sample outputs.
    ModelInfo {
        /// Network weights (JSON, `magsteer.actuation.v1`); embedded weights otherwise.
        #[arg(long)]
        weights: Option<PathBuf>,
    },

    /// Compute the coil command for one move.
    Command {
        /// Current particle position `x,y`.
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        from: [f64; 2],

        /// Target position `x,y`.
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        to: [f64; 2],

        #[arg(long, value_enum, default_value_t = ModelArg::Neural)]
        model: ModelArg,

        /// Calibration snapshot providing the coil locations; the simulated
        /// rig geometry is used otherwise.
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelArg {
    Neural,
    SurfaceFit,
}

impl ModelArg {
    fn to_core(self) -> ModelKind {
        match self {
            Self::Neural => ModelKind::Neural,
            Self::SurfaceFit => ModelKind::SurfaceFit,
        }
    }
}

fn parse_point(s: &str) -> Result<[f64; 2], String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected 'x,y', got '{}'", s))?;
    let x: f64 = x.trim().parse().map_err(|e| format!("bad x '{}': {}", x, e))?;
    let y: f64 = y.trim().parse().map_err(|e| format!("bad y '{}': {}", y, e))?;
    Ok([x, y])
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Calibrate {
            frames,
            config,
            out,
        } => run_calibrate(&frames, config.as_deref(), &out),
        Commands::Localize {
            snapshot,
            background,
            frame,
            config,
        } => run_localize(&snapshot, &background, &frame, config.as_deref()),
        Commands::Plan {
            snapshot,
            path,
            tolerance,
            interpolation,
            out,
        } => run_plan(&snapshot, &path, tolerance, interpolation, out.as_deref()),
        Commands::Simulate {
            config,
            path,
            max_ticks,
            log,
        } => run_simulate(config.as_deref(), path.as_deref(), max_ticks, log.as_deref()),
        Commands::ModelInfo { weights } => run_model_info(weights.as_deref()),
        Commands::Command {
            from,
            to,
            model,
            snapshot,
        } => run_command(from, to, model, snapshot.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> CliResult<ControllerConfig> {
    Ok(match path {
        Some(p) => ControllerConfig::from_json_file(p)?,
        None => ControllerConfig::default(),
    })
}

fn load_gray(path: &Path) -> CliResult<image::GrayImage> {
    Ok(image::open(path)
        .map_err(|e| format!("failed to open {}: {}", path.display(), e))?
        .to_luma8())
}

// ── calibrate ─────────────────────────────────────────────────────────

fn run_calibrate(frames: &[PathBuf], config: Option<&Path>, out: &Path) -> CliResult<()> {
    let config = load_config(config)?;
    let mut calibrator = CoordinateCalibrator::new(config.calibration.clone());
    for path in frames {
        let status = calibrator.sample_frame(&load_gray(path)?)?;
        if status == CalibrationStatus::Calibrated {
            break;
        }
    }
    if !calibrator.is_calibrated() {
        tracing::warn!(
            "only {} frame(s) given for a sample limit of {}; finalizing early",
            frames.len(),
            config.calibration.sample_limit
        );
    }
    let snapshot = calibrator.finalize()?.clone();
    snapshot.to_json_file(out)?;
    tracing::info!("wrote calibration snapshot to {}", out.display());

    let summary = serde_json::json!({
        "origin_px": snapshot.origin_px(),
        "axis_angle": snapshot.axis_angle(),
        "distance_per_pixel": snapshot.distance_per_pixel(),
        "field_of_view": snapshot.field_of_view(),
        "coil_physical_locations": snapshot.coil_physical_locations(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

// ── localize ──────────────────────────────────────────────────────────

fn run_localize(
    snapshot: &Path,
    background: &[PathBuf],
    frame: &Path,
    config: Option<&Path>,
) -> CliResult<()> {
    let config = load_config(config)?;
    let snapshot = CalibrationSnapshot::from_json_file(snapshot)?;

    let mut model = BackgroundModel::new(background.len());
    for path in background {
        model.add_frame(&load_gray(path)?)?;
    }
    let mut localizer = ParticleLocalizer::new(config.localize.clone(), &snapshot);
    localizer.set_background(&model)?;

    let pixel = localizer.locate(&load_gray(frame)?)?;
    let physical = pixel.map(|p| snapshot.map_to_physical(p));
    let result = serde_json::json!({
        "found": pixel.is_some(),
        "pixel": pixel,
        "physical": physical,
    });
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

// ── plan ──────────────────────────────────────────────────────────────

fn run_plan(
    snapshot: &Path,
    path: &Path,
    tolerance: f64,
    interpolation: f64,
    out: Option<&Path>,
) -> CliResult<()> {
    let snapshot = CalibrationSnapshot::from_json_file(snapshot)?;
    let points = read_path_file(path)?;
    validate_path_params(points.len(), tolerance, interpolation)?;

    let mut path = DeliveryPath::from_physical_checkpoints(&points, &snapshot, 1.0);
    let total = path.total_distance();
    let inserted = path.discretize(interpolation)?;
    tracing::info!(
        "{} checkpoints, {} interpolated points, total distance {:.3}",
        points.len(),
        inserted,
        total
    );

    let json = serde_json::to_string_pretty(&path)?;
    match out {
        Some(out) => {
            std::fs::write(out, json)?;
            tracing::info!("wrote path to {}", out.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

// ── simulate ──────────────────────────────────────────────────────────

/// Forwards controller events to the log.
struct LogEvents;

impl ControllerEvents for LogEvents {
    fn on_checkpoint_passed(&mut self, index: usize) {
        tracing::info!("checkpoint {} passed", index);
    }

    fn on_abort(&mut self, reason: &str) {
        tracing::warn!("{}", reason);
    }

    fn on_log_message(&mut self, text: &str) {
        tracing::info!("{}", text);
    }
}

fn run_simulate(
    config: Option<&Path>,
    path: Option<&Path>,
    max_ticks: u64,
    log: Option<&Path>,
) -> CliResult<()> {
    let config = load_config(config)?;
    let points = match path {
        Some(p) => read_path_file(p)?,
        None => vec![[0.0, 0.0], [4.0, 0.0], [4.0, 4.0]],
    };

    let mut rig = SimRig::new(config.sim.clone(), &MarkerDictionary::default());
    let dispatcher =
        || HardwareDispatcher::new(Box::new(rig.motor(Axis::X)), Box::new(rig.motor(Axis::Y)));
    let clock = rig.clock();

    let mut calibrator = CoordinateCalibrator::new(config.calibration.clone());
    while !calibrator.is_calibrated() {
        calibrator.sample_frame(&rig.render())?;
    }
    let snapshot = calibrator.snapshot()?.clone();

    let mut hw = dispatcher();
    let mut background = BackgroundModel::new(config.calibration.background_frames);
    for step in CalibrationJog::new(config.calibration.jog.clone()) {
        hw.dispatch(&step.command, clock.as_ref())?;
        if step.sample_background && background.add_frame(&rig.render())? {
            break;
        }
    }
    drop(hw);

    if let Some(&start) = points.first() {
        rig.set_particle(start);
    }
    let path = DeliveryPath::from_physical_checkpoints(&points, &snapshot, config.path.screen_scale);

    let mut op = Operation::new(
        &config,
        snapshot,
        &background,
        dispatcher(),
        clock.clone(),
        LogEvents,
    )?;
    op.start(&path)?;
    let summary = op.run(&mut rig, Some(max_ticks))?;

    if let Some(log) = log {
        std::fs::write(log, op.data_log().to_csv())?;
        tracing::info!("wrote {} log records to {}", op.data_log().len(), log.display());
    }

    let end = rig.particle();
    let result = serde_json::json!({
        "outcome": format!("{:?}", summary.outcome),
        "ticks": summary.ticks,
        "progress_percent": summary.progress_percent,
        "model": op.model_name(),
        "final_particle": end,
        "distance_to_last_checkpoint": points.last().map(|&p| distance(p, end)),
        "simulated_seconds": clock.elapsed().as_secs_f64(),
    });
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

// ── model-info ────────────────────────────────────────────────────────

fn run_model_info(weights: Option<&Path>) -> CliResult<()> {
    let limits = magsteer::ActuationConfig::default().limits();
    let neural = match weights {
        Some(p) => NeuralActuationModel::from_json_file(p, limits)?,
        None => NeuralActuationModel::embedded(limits)?,
    };
    let surface = SurfaceFitModel::new(limits);
    let coils = magsteer::sim::SimRigConfig::default().coil_locations();

    // one unit of travel from the origin toward each coil
    let samples: CoilSet<serde_json::Value> = CoilSet::from_fn(|coil| {
        let dir = coils[coil];
        let norm = distance(dir, [0.0, 0.0]).max(f64::EPSILON);
        let target = [dir[0] / norm, dir[1] / norm];
        let query = CoilQuery {
            coil,
            current: [0.0, 0.0],
            target,
            travel: 1.0,
            distance_to_coil: norm,
        };
        serde_json::json!({
            "neural": neural.raw_scale(&query),
            "surface_fit": surface.raw_scale(&query),
        })
    });

    let info = serde_json::json!({
        "schema": ACTUATION_SCHEMA_V1,
        "weights": weights.map(|p| p.display().to_string()).unwrap_or_else(|| "embedded".into()),
        "features": FEATURES,
        "hidden_units": HIDDEN_UNITS,
        "min_scale": limits.min_scale,
        "duration_ms": limits.duration_ms,
        "unit_travel_raw_scale": samples,
    });
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

// ── command ───────────────────────────────────────────────────────────

fn run_command(
    from: [f64; 2],
    to: [f64; 2],
    model: ModelArg,
    snapshot: Option<&Path>,
) -> CliResult<()> {
    let mut config = ControllerConfig::default();
    config.actuation.model = model.to_core();
    let model = build_model(&config.actuation)?;

    let coils = match snapshot {
        Some(p) => CalibrationSnapshot::from_json_file(p)?.coil_physical_locations(),
        None => config.sim.coil_locations(),
    };
    let command = model.compute(from, to, &coils, &StagnationBoost::default());
    for coil in Coil::ALL {
        let c = command.coils[coil];
        if c.is_active() {
            tracing::info!("{}: scale {} for {} ms", coil, c.scale, c.duration_ms);
        }
    }
    println!("{}", serde_json::to_string_pretty(&command)?);
    Ok(())
}
