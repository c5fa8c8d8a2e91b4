//! Model file persistence tests.
//!
//! These tests verify that:
//! - A saved model loads back unchanged
//! - Flipped payload bytes are caught by the checksum
//! - Foreign files and truncated files are rejected
//! - Accumulator JSON with malformed histograms is rejected on read

use std::fs;
use std::io::ErrorKind;

use muloss::storage::{CODEC_VERSION, MAGIC};
use muloss::{
    load_model, save_model, BinningConfig, EstimatorConfig, FitOutcome, LossParameters, MomentumEstimator,
    PersistedModel, RunAccumulator, StorageError,
};
use tempfile::tempdir;

fn outcome() -> FitOutcome {
    FitOutcome {
        params: LossParameters {
            offset: 5.0,
            slope_mean: 0.01,
            slope_scale: 0.002,
            norm: 4000.0,
        },
        uncertainties: None,
        chi_square: 12.5,
        dof: 3996,
        iterations: 7,
        dataset_digest: blake3::hash(b"p_loss").to_hex().to_string(),
    }
}

#[test]
fn test_save_load_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("loss.model");
    let record = PersistedModel::from_outcome(&outcome()).unwrap();

    save_model(&path, &record).unwrap();
    assert!(!path.with_extension("tmp").exists(), "temporary file should be renamed away");

    let loaded = load_model(&path).unwrap();
    assert_eq!(loaded, record);

    // A loaded model estimates exactly like the original.
    let a = MomentumEstimator::new(record.model, &EstimatorConfig::default()).unwrap();
    let b = MomentumEstimator::new(loaded.model, &EstimatorConfig::default()).unwrap();
    assert_eq!(a.estimate(20.0), b.estimate(20.0));
}

#[test]
fn test_overwrite_replaces_model() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("loss.model");
    let first = PersistedModel::from_outcome(&outcome()).unwrap();
    let second = PersistedModel::from_outcome(&outcome()).unwrap();
    assert_ne!(first.model_id, second.model_id);

    save_model(&path, &first).unwrap();
    save_model(&path, &second).unwrap();
    assert_eq!(load_model(&path).unwrap().model_id, second.model_id);
}

#[test]
fn test_header_layout() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("loss.model");
    save_model(&path, &PersistedModel::from_outcome(&outcome()).unwrap()).unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[..4], &MAGIC);
    assert_eq!(bytes[4], CODEC_VERSION);
    assert_eq!(bytes[5], CODEC_VERSION);
}

#[test]
fn test_flipped_payload_byte_is_detected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("loss.model");
    save_model(&path, &PersistedModel::from_outcome(&outcome()).unwrap()).unwrap();

    // Header (5) + frame version (1) + length (4) puts the payload at byte 10.
    let mut bytes = fs::read(&path).unwrap();
    bytes[20] ^= 0x01;
    fs::write(&path, &bytes).unwrap();

    let err = load_model(&path).unwrap_err();
    assert!(matches!(err, StorageError::Corrupt { .. }), "got {err:?}");
}

#[test]
fn test_bad_magic_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("loss.model");
    save_model(&path, &PersistedModel::from_outcome(&outcome()).unwrap()).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    bytes[..4].copy_from_slice(b"KYRO");
    fs::write(&path, &bytes).unwrap();

    let err = load_model(&path).unwrap_err();
    assert!(matches!(err, StorageError::Corrupt { .. }), "got {err:?}");
}

#[test]
fn test_truncated_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("loss.model");
    save_model(&path, &PersistedModel::from_outcome(&outcome()).unwrap()).unwrap();

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

    match load_model(&path).unwrap_err() {
        StorageError::Io(e) => assert_eq!(e.kind(), ErrorKind::UnexpectedEof),
        other => panic!("expected I/O error, got {other:?}"),
    }
}

#[test]
fn test_missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let err = load_model(dir.path().join("absent.model")).unwrap_err();
    assert!(matches!(err, StorageError::Io(_)));
}

#[test]
fn test_accumulator_json_roundtrip_and_rejection() {
    let acc = RunAccumulator::new(&BinningConfig::default()).unwrap();
    let json = serde_json::to_value(&acc).unwrap();
    let back: RunAccumulator = serde_json::from_value(json.clone()).unwrap();
    assert_eq!(back, acc);

    // Count vector no longer matches the axes.
    let mut short = json.clone();
    short["p_loss"]["counts"] = serde_json::json!([]);
    assert!(serde_json::from_value::<RunAccumulator>(short).is_err());

    // Axis without edges.
    let mut no_edges = json;
    no_edges["p_loss"]["axes"][0]["edges"] = serde_json::json!([]);
    assert!(serde_json::from_value::<RunAccumulator>(no_edges).is_err());
}

#[test]
fn test_failed_save_leaves_no_temporary_file() {
    let dir = tempdir().unwrap();
    // A directory in the way makes the final rename fail.
    let path = dir.path().join("loss.model");
    fs::create_dir(&path).unwrap();

    let err = save_model(&path, &PersistedModel::from_outcome(&outcome()).unwrap()).unwrap_err();
    assert!(matches!(err, StorageError::Io(_)));
    assert!(!path.with_extension("tmp").exists());
    assert!(path.is_dir());
}
