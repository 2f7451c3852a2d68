use std::fs;
use tempfile::TempDir;

use materia_core::config::ModelSettings;
use materia_core::error::Error;
use materia_core::traits::Embedder;
use materia_embed::{load_embedder, resolve_model_dir, HashEmbedder, ModelSnapshot};

#[test]
fn hash_embedder_shapes_and_determinism() {
    let embedder = HashEmbedder::new(64);
    let texts = vec!["坚持 梦想".to_string(), "坚持 梦想".to_string(), "完全 不同".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    assert_eq!(embs.len(), 3);
    assert_eq!(embs[0].len(), 64, "embedding dim is 64");

    let norm: f32 = embs[0].iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in embs[0].iter().zip(embs[1].iter()) { assert!((a - b).abs() <= 1e-6); }
    assert_ne!(embs[0], embs[2]);
}

#[test]
fn hash_embedder_single_matches_batch() {
    let embedder = HashEmbedder::new(32);
    let single = embedder.embed("hello world").unwrap();
    let batch = embedder.embed_batch(&["hello world".to_string()]).unwrap();
    assert_eq!(single, batch[0]);
    assert!(embedder.embed("").unwrap().iter().all(|x| *x == 0.0));
}

#[test]
fn model_dir_prefers_fine_tuned() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("pretrained")).unwrap();
    let (dir, snap) = resolve_model_dir(tmp.path(), true).unwrap();
    assert_eq!(snap, ModelSnapshot::Pretrained);
    assert_eq!(dir, tmp.path().join("pretrained"));

    fs::create_dir_all(tmp.path().join("fine_tuned")).unwrap();
    assert_eq!(resolve_model_dir(tmp.path(), true).unwrap().1, ModelSnapshot::FineTuned);
    assert_eq!(resolve_model_dir(tmp.path(), false).unwrap().1, ModelSnapshot::Pretrained);
}

#[test]
fn missing_model_is_a_configuration_error() {
    let tmp = TempDir::new().unwrap();
    let settings = ModelSettings { dir: tmp.path().to_path_buf(), ..ModelSettings::default() };
    let err = load_embedder(&settings).err().expect("no model present");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Configuration(_))), "got {err:#}");

    // a model dir without weights is also a configuration error
    fs::create_dir_all(tmp.path().join("pretrained")).unwrap();
    assert!(load_embedder(&settings).is_err());
}

#[test]
fn fake_setting_selects_hash_embedder() {
    let settings = ModelSettings { use_fake: true, fake_dim: 16, ..ModelSettings::default() };
    let loaded = load_embedder(&settings).unwrap();
    assert_eq!(loaded.snapshot, ModelSnapshot::Hashing);
    assert_eq!(loaded.embedder.dim(), 16);
    assert_eq!(loaded.embedder.device(), "cpu");
}
