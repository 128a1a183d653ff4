use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use magsteer::actuation::{ActuationConfig, NeuralActuationModel, StagnationBoost};
use magsteer::sim::{SimRig, SimRigConfig};
use magsteer::{
    ActuationModel, BackgroundModel, CalibrationSnapshot, Coil, DeliveryPath, LocalizeConfig,
    MarkerDetector, MarkerDictionary, ParticleLocalizer,
};

fn rig() -> SimRig {
    SimRig::new(SimRigConfig::default(), &MarkerDictionary::default())
}

fn exact_snapshot(rig: &SimRig) -> CalibrationSnapshot {
    let cfg = rig.config();
    let pixels = cfg.coil_locations().map(|_, p| cfg.physical_to_pixel(*p));
    CalibrationSnapshot::from_coil_pixels(pixels, cfg.frame_size, cfg.coil_spacing)
        .expect("rig geometry is valid")
}

fn bench_marker_detection(c: &mut Criterion) {
    let frame = rig().render();
    let detector = MarkerDetector::default();

    c.bench_function("marker_detect_400x400", |b| {
        b.iter(|| black_box(detector.detect(black_box(&frame)).len()))
    });
}

fn bench_localize(c: &mut Criterion) {
    let rig = rig();
    let snapshot = exact_snapshot(&rig);
    let mut localizer = ParticleLocalizer::new(LocalizeConfig::default(), &snapshot);
    localizer
        .set_background(&BackgroundModel::from_image(rig.scenery()))
        .expect("background matches frame size");
    rig.set_particle([3.0, -2.0]);
    let frame = rig.render();

    c.bench_function("localize_400x400", |b| {
        b.iter(|| black_box(localizer.locate(black_box(&frame)).ok()))
    });
}

fn bench_neural_compute(c: &mut Criterion) {
    let limits = ActuationConfig::default().limits();
    let model = NeuralActuationModel::embedded(limits).expect("embedded weights load");
    let coils = SimRigConfig::default().coil_locations();
    let boost = StagnationBoost::default();
    let mut rng = StdRng::seed_from_u64(5);
    let pairs: Vec<([f64; 2], [f64; 2])> = (0..256)
        .map(|_| {
            let a = [rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0)];
            let b = [a[0] + rng.gen_range(-2.0..2.0), a[1] + rng.gen_range(-2.0..2.0)];
            (a, b)
        })
        .collect();

    c.bench_function("neural_compute_256", |b| {
        b.iter(|| {
            let mut acc = 0u32;
            for &(cur, tgt) in &pairs {
                let cmd = model.compute(black_box(cur), black_box(tgt), &coils, &boost);
                acc += cmd.coils[Coil::PlusX].scale as u32;
            }
            black_box(acc)
        })
    });
}

fn bench_discretize(c: &mut Criterion) {
    let rig = rig();
    let snapshot = exact_snapshot(&rig);
    let mut rng = StdRng::seed_from_u64(9);
    let points: Vec<[f64; 2]> = (0..20)
        .map(|_| [rng.gen_range(-20.0..20.0), rng.gen_range(-20.0..20.0)])
        .collect();
    let base = DeliveryPath::from_physical_checkpoints(&points, &snapshot, 1.0);

    c.bench_function("discretize_20_checkpoints", |b| {
        b.iter(|| {
            let mut path = base.clone();
            black_box(path.discretize(black_box(0.5)).ok())
        })
    });
}

criterion_group!(
    hotpaths,
    bench_marker_detection,
    bench_localize,
    bench_neural_compute,
    bench_discretize
);
criterion_main!(hotpaths);
