//! Full runs over small synthetic caches.

use dynkg::config::RunConfig;
use dynkg::dataset::{write_cache, SequenceCache};
use dynkg::graph::{SceneGraph, Sequence};
use dynkg::trainer::{CsvResultStore, DynKGTrainer, ResultStore, TrainerState, SIDECAR_NAME};
use std::path::Path;

const FEATURES: usize = 5;

fn frame(label: u8, seq: usize, t: usize) -> SceneGraph {
    SceneGraph {
        node_features: (0..4)
            .map(|i| {
                (0..FEATURES)
                    .map(|j| {
                        let noise = ((seq * 31 + t * 7 + i * FEATURES + j) as f32 * 0.29).sin() * 0.2;
                        let signal = if j == usize::from(label) { 1.0 } else { 0.0 };
                        signal + noise
                    })
                    .collect()
            })
            .collect(),
        edge_index: vec![(0, 1), (1, 2), (2, 3), (3, 0), (0, 2), (1, 3)],
        edge_attr: vec![0, 2, 4, 6, 8, 10],
    }
}

fn cache(prefix: &str) -> SequenceCache {
    let sequences = (0..10)
        .map(|i| {
            let label = (i % 2) as u8;
            Sequence::new(
                (0..3).map(|t| frame(label, i, t)).collect(),
                label,
                &format!("{}_{:02}", prefix, i),
            )
        })
        .collect();
    SequenceCache::new(
        sequences,
        (0..FEATURES).map(|i| format!("feature_{}", i)).collect(),
    )
}

fn config(dir: &Path) -> RunConfig {
    RunConfig {
        cache_path: dir.join("cache.bin"),
        model_save_path: dir.join("model/model_best_val_loss_.vec.pt"),
        model_load_path: dir.join("model/model_best_val_loss_.vec.pt"),
        stats_path: dir.join("best_stats.csv"),
        split_ratio: 0.3,
        epochs: 1,
        test_step: 1,
        batch_size: 4,
        seed: 3,
        hidden_dim: 8,
        num_layers: 2,
        lstm_input_dim: 8,
        lstm_output_dim: 4,
        learning_rate: 0.01,
        ..Default::default()
    }
}

fn run(config: RunConfig) -> DynKGTrainer {
    let mut trainer = DynKGTrainer::new(config, "dynkg train --epochs 1 --test_step 1").unwrap();
    trainer.build_model().unwrap();
    trainer.train().unwrap();
    trainer
}

#[test]
fn test_single_epoch_run() {
    let dir = tempfile::tempdir().unwrap();
    write_cache(&dir.path().join("cache.bin"), &cache("clip")).unwrap();
    let config = config(dir.path());

    let trainer = run(config.clone());
    assert_eq!(trainer.state(), TrainerState::Completed);
    assert_eq!(trainer.dataset().train.len() + trainer.dataset().test.len(), 10);
    assert_eq!(trainer.best_epoch(), 0);

    let rows = CsvResultStore::new(&config.stats_path).rows().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].config, config.key().unwrap());
    assert_eq!(rows[0].epoch, 0);
    assert_eq!(rows[0].val_loss, trainer.best_val_loss());

    assert!(config.model_save_path.exists());
    let sidecar = std::fs::read_to_string(dir.path().join("model").join(SIDECAR_NAME)).unwrap();
    assert!(sidecar.starts_with(&config.to_pretty().unwrap()));
    assert!(sidecar.ends_with("dynkg train --epochs 1 --test_step 1"));
}

#[test]
fn test_repeated_run_keeps_one_row() {
    let dir = tempfile::tempdir().unwrap();
    write_cache(&dir.path().join("cache.bin"), &cache("clip")).unwrap();
    let config = config(dir.path());

    run(config.clone());
    let mut second = run(config.clone());
    second.evaluate(None).unwrap();

    let store = CsvResultStore::new(&config.stats_path);
    assert_eq!(store.rows().unwrap().len(), 1);

    // a different configuration gets its own row
    run(RunConfig { seed: 4, ..config });
    assert_eq!(store.rows().unwrap().len(), 2);
}

#[test]
fn test_transfer_cache_is_test_set() {
    let dir = tempfile::tempdir().unwrap();
    write_cache(&dir.path().join("cache.bin"), &cache("clip")).unwrap();
    write_cache(&dir.path().join("transfer.json"), &cache("other")).unwrap();

    let trainer = run(RunConfig {
        transfer_path: Some(dir.path().join("transfer.json")),
        ..config(dir.path())
    });
    assert_eq!(trainer.dataset().train.len(), 10);
    assert_eq!(trainer.dataset().test.len(), 10);
    assert!(trainer.dataset().test.iter().all(|s| s.folder_name.starts_with("other_")));
}

#[test]
fn test_missing_cache_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = match DynKGTrainer::new(config(dir.path()), "dynkg train") {
        Err(err) => err,
        Ok(_) => panic!("trainer built without a cache"),
    };
    assert!(err.is_configuration());
}

#[test]
fn test_infer_from_saved_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    write_cache(&dir.path().join("cache.bin"), &cache("clip")).unwrap();
    let config = config(dir.path());
    let trained = run(config.clone());
    // the checkpoint holds the best epoch, which is the only one
    let test = trained.dataset().test.clone();

    let mut fresh = DynKGTrainer::new(config, "dynkg infer").unwrap();
    assert!(fresh.load_model().unwrap());
    let out = fresh.inference(&test).unwrap();
    assert_eq!(out.outputs.len(), test.len());
    assert!(out.loss.is_finite());
    assert_eq!(
        out.outputs,
        trained.inference(&test).unwrap().outputs
    );
}
