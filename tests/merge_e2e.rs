//! Partition-independence tests for the batch processor.
//!
//! Splitting a run into batches, processing them in any order and merging the
//! partials must give the same histograms and counters as processing the
//! whole run at once. Sample rows compare as multisets.

use std::f64::consts::PI;

use muloss::geometry::{momentum_from_pt_eta, theta_from_eta};
use muloss::{
    run_iterative, Accumulator, AnalysisConfig, EventBatch, ExecutorConfig, MomentumLossProcessor, PartitionExecutor,
    RawEvent, RunAccumulator,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

fn calo(raw: RawEvent, prefix: &str, had: Vec<f64>, em: Vec<f64>, eta: Vec<f64>, phi: Vec<f64>) -> RawEvent {
    raw.with_floats(format!("{prefix}_calo_hits_energyHad"), had)
        .with_floats(format!("{prefix}_calo_hits_energyEM"), em)
        .with_floats(format!("{prefix}_calo_hits_eta"), eta)
        .with_floats(format!("{prefix}_calo_hits_phi"), phi)
}

/// One or two muons per event. Each muon gets nearby deposits and an
/// outer-station hit with some probability, so every cut stage is populated.
fn random_event(rng: &mut StdRng) -> RawEvent {
    let n = rng.gen_range(1..=2);
    let mut pt = Vec::new();
    let mut eta = Vec::new();
    let mut phi = Vec::new();
    let (mut hit_id, mut hit_type, mut hit_phi, mut hit_theta, mut hit_p) =
        (Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new());
    let (mut h_e, mut h_eta, mut h_phi) = (Vec::new(), Vec::new(), Vec::new());
    let (mut e_e, mut e_eta, mut e_phi) = (Vec::new(), Vec::new(), Vec::new());

    for k in 0..n {
        // Muons in opposite hemispheres never share a cone.
        let m_eta = if k == 0 { rng.gen_range(0.3..2.0) } else { rng.gen_range(-2.0..-0.3) };
        let m_phi = rng.gen_range(-PI..PI);
        let m_pt = rng.gen_range(20.0..800.0);
        pt.push(m_pt);
        eta.push(m_eta);
        phi.push(m_phi);

        if rng.gen_bool(0.85) {
            hit_id.push(953);
            hit_type.push(if rng.gen_bool(0.5) { 13 } else { -13 });
            hit_phi.push(m_phi + 0.01);
            hit_theta.push(theta_from_eta(m_eta));
            hit_p.push(momentum_from_pt_eta(m_pt, m_eta) - rng.gen_range(1.0..40.0));
        }
        if rng.gen_bool(0.8) {
            h_e.push(rng.gen_range(0.05..5.0));
            h_eta.push(m_eta - 0.02);
            h_phi.push(m_phi);
        }
        if rng.gen_bool(0.8) {
            e_e.push(rng.gen_range(0.05..5.0));
            e_eta.push(m_eta + 0.03);
            e_phi.push(m_phi);
        }
    }

    let n_hits = hit_id.len();
    let n_h = h_e.len();
    let n_e = e_e.len();
    let raw = RawEvent::new()
        .with_floats("gen_pt", pt)
        .with_floats("gen_eta", eta)
        .with_floats("gen_phi", phi)
        .with_ints("sim_id", hit_id)
        .with_ints("sim_type", hit_type)
        .with_floats("sim_phi", hit_phi)
        .with_floats("sim_theta", hit_theta)
        .with_floats("sim_p", hit_p)
        .with_floats("sim_eloss", vec![0.0; n_hits]);
    let raw = calo(raw, "hcal", h_e, vec![0.0; n_h], h_eta, h_phi);
    let raw = calo(raw, "ecalPreshower", vec![], vec![], vec![], vec![]);
    let raw = calo(raw, "ecalBarrel", vec![0.0; n_e], e_e, e_eta, e_phi);
    calo(raw, "ecalEndcap", vec![], vec![], vec![], vec![])
}

fn events(seed: u64, n: usize) -> Vec<RawEvent> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| random_event(&mut rng)).collect()
}

fn batches(events: &[RawEvent], size: usize) -> Vec<EventBatch> {
    events
        .chunks(size)
        .map(|chunk| EventBatch::new("synthetic", chunk.to_vec()))
        .collect()
}

fn processor() -> MomentumLossProcessor {
    MomentumLossProcessor::from_config(&AnalysisConfig::default()).unwrap()
}

fn sorted_rows(acc: &RunAccumulator) -> Vec<[f64; 6]> {
    let mut rows: Vec<[f64; 6]> = acc
        .samples
        .rows()
        .map(|s| [s.p, s.dp, s.features[0], s.features[1], s.features[2], s.features[3]])
        .collect();
    rows.sort_by(|a, b| a.partial_cmp(b).unwrap());
    rows
}

fn assert_equivalent(a: &RunAccumulator, b: &RunAccumulator) {
    assert_eq!(a.all_events, b.all_events);
    assert_eq!(a.cutflow, b.cutflow);
    assert_eq!(a.muons, b.muons);
    assert_eq!(a.p_loss, b.p_loss);
    assert_eq!(sorted_rows(a), sorted_rows(b));
}

#[test]
fn test_single_batch_matches_split_batches() {
    let events = events(42, 400);
    let processor = processor();

    let whole = processor.process(&EventBatch::new("synthetic", events.clone())).unwrap();
    assert!(!whole.samples.is_empty(), "synthetic run should select muons");
    assert!(whole.cutflow.get("muons") > whole.cutflow.get("ecal_energy"));

    for size in [1, 7, 64, 400] {
        let split = run_iterative(&processor, &batches(&events, size)).unwrap();
        assert_equivalent(&whole, &split);
    }
}

#[test]
fn test_merge_order_does_not_matter() {
    let events = events(7, 300);
    let processor = processor();
    let mut partials: Vec<RunAccumulator> = batches(&events, 25)
        .iter()
        .map(|b| processor.process(b).unwrap())
        .collect();

    let forward = partials
        .iter()
        .try_fold(processor.identity(), |acc, p| acc.merged(p))
        .unwrap();

    let mut rng = StdRng::seed_from_u64(99);
    partials.shuffle(&mut rng);
    let shuffled = partials
        .iter()
        .try_fold(processor.identity(), |acc, p| acc.merged(p))
        .unwrap();

    // Pairwise tree reduction.
    let mut level = partials;
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [a, b] => a.clone().merged(b).unwrap(),
                [a] => a.clone(),
                _ => unreachable!(),
            })
            .collect();
    }
    let tree = level.pop().unwrap();

    assert_equivalent(&forward, &shuffled);
    assert_equivalent(&forward, &tree);
}

#[test]
fn test_identity_is_neutral() {
    let events = events(3, 50);
    let processor = processor();
    let acc = processor.process(&EventBatch::new("synthetic", events)).unwrap();

    let left = processor.identity().merged(&acc).unwrap();
    let right = acc.clone().merged(&processor.identity()).unwrap();
    assert_eq!(left, acc);
    assert_eq!(right, acc);
}

#[test]
fn test_executor_matches_iterative() {
    let events = events(11, 500);
    let batches = batches(&events, 20);
    let processor = processor();
    let expected = run_iterative(&processor, &batches).unwrap();

    for workers in [1, 3, 8] {
        let executor = PartitionExecutor::new(
            processor.clone(),
            ExecutorConfig {
                workers,
                queue_capacity: 4,
            },
        );
        let actual = executor.run(batches.clone()).unwrap();
        assert_equivalent(&expected, &actual);
    }
}

#[test]
fn test_executor_fails_on_malformed_batch() {
    let mut batches = batches(&events(5, 40), 10);
    batches.push(EventBatch::new("broken", vec![RawEvent::new().with_floats("gen_pt", vec![1.0])]));

    let executor = PartitionExecutor::new(processor(), ExecutorConfig::default());
    let err = executor.run(batches).unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_datasets_are_counted_separately() {
    let processor = processor();
    let a = EventBatch::new("signal", events(1, 12));
    let b = EventBatch::new("control", events(2, 5));
    let acc = run_iterative(&processor, [&a, &b]).unwrap();
    assert_eq!(acc.all_events.get("signal"), 12);
    assert_eq!(acc.all_events.get("control"), 5);
    assert_eq!(acc.all_events.total(), 17);
}
