use std::fs;
use std::time::Duration;

use tempfile::TempDir;

use materia_core::config::Settings;
use materia_core::corpus::CorpusLoader;
use materia_core::types::{CategoryFilter, SearchRequest};
use materia_embed::{HashEmbedder, ModelSnapshot};
use materia_vector::{spawn_engine_load, spawn_load, IndexBuilder, LoadEvent, SearchMode};

fn fake_settings(tmp: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.data.corpus_dir = tmp.path().join("data");
    settings.data.index_dir = tmp.path().join("model");
    settings.model.dir = tmp.path().join("model");
    settings.model.use_fake = true;
    settings.model.fake_dim = 48;
    settings
}

fn write_quotes(tmp: &TempDir) {
    let data = tmp.path().join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(
        data.join("quotes.json"),
        r#"[{"content": "Practice makes perfect", "keywords": ["practice"]},
            {"content": "Time is money", "keywords": ["time", "money"]}]"#,
    )
    .unwrap();
}

#[tokio::test]
async fn load_reports_realtime_engine_without_index() {
    let tmp = TempDir::new().unwrap();
    write_quotes(&tmp);
    match spawn_engine_load(fake_settings(&tmp)).wait().await {
        LoadEvent::Ready(loaded) => {
            assert_eq!(loaded.mode, SearchMode::Realtime);
            assert_eq!(loaded.snapshot, ModelSnapshot::Hashing);
            assert_eq!(loaded.engine.len(), 2);
            let results = loaded.engine.search("practice", &SearchRequest::new(1).threshold(-1.0));
            assert_eq!(results.len(), 1);
        }
        LoadEvent::Failed(msg) => panic!("load failed: {msg}"),
    }
}

#[tokio::test]
async fn load_reports_precomputed_engine_with_index() {
    let tmp = TempDir::new().unwrap();
    write_quotes(&tmp);
    let corpus = CorpusLoader::new(tmp.path().join("data")).load(CategoryFilter::All);
    IndexBuilder::new(&HashEmbedder::new(48)).build_and_save(&corpus, &tmp.path().join("model")).unwrap();

    match spawn_engine_load(fake_settings(&tmp)).wait().await {
        LoadEvent::Ready(loaded) => {
            assert_eq!(loaded.mode, SearchMode::Precomputed);
            assert_eq!(loaded.engine.len(), 2);
        }
        LoadEvent::Failed(msg) => panic!("load failed: {msg}"),
    }
}

#[tokio::test]
async fn missing_model_is_reported_as_failure() {
    let tmp = TempDir::new().unwrap();
    let mut settings = fake_settings(&tmp);
    settings.model.use_fake = false;
    match spawn_engine_load(settings).wait().await {
        LoadEvent::Failed(msg) => assert!(msg.contains("no model found"), "unexpected message: {msg}"),
        LoadEvent::Ready(_) => panic!("expected failure without model weights"),
    }
}

#[test]
fn task_can_be_polled_without_blocking() {
    let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
    let mut task = spawn_load(move || {
        gate_rx.recv()?;
        Ok(7usize)
    });
    assert!(task.try_take().is_none());
    gate_tx.send(()).unwrap();

    let mut event = None;
    for _ in 0..200 {
        event = task.try_take();
        if event.is_some() { break; }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(matches!(event, Some(LoadEvent::Ready(7))));
}

#[test]
fn panicking_load_reports_failure() {
    let task = spawn_load::<usize, _>(|| panic!("boom"));
    assert!(matches!(task.wait_blocking(), LoadEvent::Failed(_)));
}
