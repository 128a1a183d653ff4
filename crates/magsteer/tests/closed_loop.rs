//! End-to-end runs against the simulated rig: calibrate, build the
//! background while jogging, then drive the particle along a path.

use magsteer::calibration::CalibrationStatus;
use magsteer::navigation::EventLog;
use magsteer::operation::{RunOutcome, TickOutcome, HARDWARE_ABORT_MESSAGE};
use magsteer::path::parse_path;
use magsteer::sim::{SimRig, SimRigConfig};
use magsteer::{
    Axis, BackgroundModel, CalibrationJog, CalibrationSnapshot, ControllerConfig,
    CoordinateCalibrator, DeliveryPath, HardwareDispatcher, MarkerDictionary, ModelKind,
    NavigationState, Operation,
};

fn dispatcher(rig: &SimRig) -> HardwareDispatcher {
    HardwareDispatcher::new(Box::new(rig.motor(Axis::X)), Box::new(rig.motor(Axis::Y)))
}

/// Calibrate from rendered frames and average a background while jogging.
fn prepare(rig: &SimRig, config: &ControllerConfig) -> (CalibrationSnapshot, BackgroundModel) {
    let mut calibrator = CoordinateCalibrator::new(config.calibration.clone());
    let mut status = CalibrationStatus::Uncalibrated;
    while status != CalibrationStatus::Calibrated {
        status = calibrator.sample_frame(&rig.render()).unwrap();
    }
    let snapshot = calibrator.snapshot().unwrap().clone();

    let mut hw = dispatcher(rig);
    let clock = rig.clock();
    let mut background = BackgroundModel::new(config.calibration.background_frames);
    for step in CalibrationJog::new(config.calibration.jog.clone()) {
        hw.dispatch(&step.command, clock.as_ref()).unwrap();
        if step.sample_background && background.add_frame(&rig.render()).unwrap() {
            break;
        }
    }
    assert!(background.is_ready());
    (snapshot, background)
}

fn config() -> ControllerConfig {
    let mut config = ControllerConfig::default();
    config.calibration.sample_limit = 3;
    config.path.tolerance = 0.5;
    config.path.interpolation_distance = 1.0;
    config
}

fn run_l_shaped_path(config: ControllerConfig) {
    let mut rig = SimRig::new(SimRigConfig::default(), &MarkerDictionary::default());
    let (snapshot, background) = prepare(&rig, &config);
    rig.set_particle([0.0, 0.0]);

    let points = parse_path("0,0\r\n4,0\r\n4,4\r\n").unwrap();
    let path = DeliveryPath::from_physical_checkpoints(&points, &snapshot, config.path.screen_scale);
    assert_eq!(path.checkpoint_count(), 3);

    let mut op = Operation::new(
        &config,
        snapshot,
        &background,
        dispatcher(&rig),
        rig.clock(),
        EventLog::default(),
    )
    .unwrap();
    op.start(&path).unwrap();
    let summary = op.run(&mut rig, Some(300)).unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed, "model {}", op.model_name());
    assert!((summary.progress_percent - 100.0).abs() < 1e-6);
    assert_eq!(op.state(), NavigationState::Completed);
    assert_eq!(op.events().checkpoints, vec![0, 1]);
    assert_eq!(op.events().completions, 1);
    assert!(op.events().aborts.is_empty());

    let end = rig.particle();
    let miss = ((end[0] - 4.0).powi(2) + (end[1] - 4.0).powi(2)).sqrt();
    assert!(miss < 0.8, "particle ended at {:?}", end);

    let csv = op.data_log().to_csv();
    assert_eq!(csv.lines().count(), op.data_log().len() + 1);
}

#[test]
fn neural_model_delivers_along_l_shaped_path() {
    run_l_shaped_path(config());
}

#[test]
fn surface_fit_model_delivers_along_l_shaped_path() {
    let mut config = config();
    config.actuation.model = ModelKind::SurfaceFit;
    run_l_shaped_path(config);
}

#[test]
fn losing_the_motors_mid_run_stops_the_particle() {
    let config = config();
    let mut rig = SimRig::new(SimRigConfig::default(), &MarkerDictionary::default());
    let (snapshot, background) = prepare(&rig, &config);
    rig.set_particle([0.0, 0.0]);

    let path = DeliveryPath::from_physical_checkpoints(&[[0.0, 0.0], [8.0, 0.0]], &snapshot, 1.0);
    let mut op = Operation::new(
        &config,
        snapshot,
        &background,
        dispatcher(&rig),
        rig.clock(),
        EventLog::default(),
    )
    .unwrap();
    op.start(&path).unwrap();
    for _ in 0..3 {
        assert!(matches!(op.tick(&mut rig).unwrap(), TickOutcome::Actuated(_)));
    }
    assert!(rig.particle()[0] > 0.0);

    rig.set_motors_available(false);
    let parked = rig.particle();
    assert_eq!(
        op.tick(&mut rig).unwrap(),
        TickOutcome::Aborted(HARDWARE_ABORT_MESSAGE.to_string())
    );
    assert_eq!(op.state(), NavigationState::Aborted);
    assert_eq!(rig.particle(), parked);
    assert_eq!(op.data_log().len(), 3);
}
