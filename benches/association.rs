use std::f64::consts::PI;
use std::time::Instant;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use muloss::{
    AnalysisConfig, CaloDeposit, ChamberId, DeltaRMatcher, EstimatorConfig, EventBatch, ExitMomentumExtractor,
    FittedModel, GeneratedParticle, LossParameters, MomentumEstimator, MomentumLossProcessor, RawEvent, SimHit,
};

fn random_deposits(rng: &mut StdRng, n: usize) -> Vec<CaloDeposit> {
    (0..n)
        .map(|_| CaloDeposit {
            hadronic: rng.gen_range(0.0..2.0),
            electromagnetic: rng.gen_range(0.0..2.0),
            eta: rng.gen_range(-2.5..2.5),
            phi: rng.gen_range(-PI..PI),
        })
        .collect()
}

fn random_particles(rng: &mut StdRng, n: usize) -> Vec<GeneratedParticle> {
    (0..n)
        .map(|_| {
            GeneratedParticle::from_pt_eta_phi(rng.gen_range(10.0..1000.0), rng.gen_range(-2.4..2.4), rng.gen_range(-PI..PI))
                .unwrap()
        })
        .collect()
}

fn bench_energy_sum(c: &mut Criterion) {
    let mut group = c.benchmark_group("association/energy_sum");
    let matcher = DeltaRMatcher::default();
    for objects in [16usize, 64, 256] {
        let mut rng = StdRng::seed_from_u64(7);
        let particles = random_particles(&mut rng, 4);
        let deposits = random_deposits(&mut rng, objects);
        group.throughput(Throughput::Elements((particles.len() * objects) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(objects), &deposits, |b, deposits| {
            b.iter(|| matcher.associated_energy(&particles, deposits));
        });
    }
    group.finish();
}

fn bench_exit_momentum(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(11);
    let particles = random_particles(&mut rng, 4);
    let hits: Vec<SimHit> = (0..64)
        .map(|_| {
            SimHit::from_theta(
                ChamberId::new(953),
                13,
                rng.gen_range(-PI..PI),
                rng.gen_range(0.2..2.9),
                rng.gen_range(5.0..900.0),
                0.0,
            )
        })
        .collect();
    let extractor = ExitMomentumExtractor::default();
    c.bench_function("association/exit_momentum_64", |b| {
        b.iter(|| extractor.extract(&particles, &hits));
    });
}

fn bench_process_batch(c: &mut Criterion) {
    c.bench_function("processor/batch_100_events", |b| {
        // Fresh batch per sample, setup excluded from timing.
        b.iter_custom(|iters| {
            let mut rng = StdRng::seed_from_u64(3);
            let events: Vec<RawEvent> = (0..100).map(|_| random_event(&mut rng)).collect();
            let batch = EventBatch::new("bench", events);
            let processor = MomentumLossProcessor::from_config(&AnalysisConfig::default()).unwrap();

            let start = Instant::now();
            for _ in 0..iters {
                let _ = processor.process(&batch).unwrap();
            }
            start.elapsed()
        });
    });
}

fn bench_estimate(c: &mut Criterion) {
    let model = FittedModel::new(LossParameters {
        offset: 5.0,
        slope_mean: 0.01,
        slope_scale: 0.002,
        norm: 4000.0,
    })
    .unwrap();
    let estimator = MomentumEstimator::new(model, &EstimatorConfig::default()).unwrap();
    c.bench_function("estimator/interval_399_points", |b| {
        b.iter(|| estimator.estimate(20.0));
    });
}

fn random_event(rng: &mut StdRng) -> RawEvent {
    let n_gen = 2;
    let n_hits = 12;
    let mut raw = RawEvent::new()
        .with_floats("gen_pt", (0..n_gen).map(|_| rng.gen_range(50.0..1000.0)).collect())
        .with_floats("gen_eta", (0..n_gen).map(|_| rng.gen_range(-2.4..2.4)).collect())
        .with_floats("gen_phi", (0..n_gen).map(|_| rng.gen_range(-PI..PI)).collect())
        .with_ints("sim_id", (0..n_hits).map(|_| rng.gen_range(0..2048)).collect())
        .with_ints("sim_type", (0..n_hits).map(|_| if rng.gen_bool(0.8) { 13 } else { 11 }).collect())
        .with_floats("sim_phi", (0..n_hits).map(|_| rng.gen_range(-PI..PI)).collect())
        .with_floats("sim_theta", (0..n_hits).map(|_| rng.gen_range(0.2..2.9)).collect())
        .with_floats("sim_p", (0..n_hits).map(|_| rng.gen_range(5.0..900.0)).collect())
        .with_floats("sim_eloss", vec![0.0; n_hits]);
    for (calo, n) in [("hcal", 40), ("ecalPreshower", 10), ("ecalBarrel", 60), ("ecalEndcap", 20)] {
        let deposits = random_deposits(rng, n);
        raw = raw
            .with_floats(format!("{calo}_calo_hits_energyHad"), deposits.iter().map(|d| d.hadronic).collect())
            .with_floats(format!("{calo}_calo_hits_energyEM"), deposits.iter().map(|d| d.electromagnetic).collect())
            .with_floats(format!("{calo}_calo_hits_eta"), deposits.iter().map(|d| d.eta).collect())
            .with_floats(format!("{calo}_calo_hits_phi"), deposits.iter().map(|d| d.phi).collect());
    }
    raw
}

criterion_group!(
    association,
    bench_energy_sum,
    bench_exit_momentum,
    bench_process_batch,
    bench_estimate
);
criterion_main!(association);
