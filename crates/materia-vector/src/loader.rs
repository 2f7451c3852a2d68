//! Background engine construction.
//!
//! Loading model weights can take seconds. `spawn_load` runs the work on a
//! dedicated thread and reports a single `LoadEvent` over a oneshot channel,
//! so it can be awaited from async code or polled from a sync UI loop.
//! Dropping the `LoadTask` abandons the result; the thread runs to completion.

use anyhow::Result;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{error, info};

use materia_core::config::Settings;
use materia_core::corpus::CorpusLoader;
use materia_embed::{load_embedder, ModelSnapshot};

use crate::search::{RetrievalEngine, SearchMode};

#[derive(Debug)]
pub enum LoadEvent<T> {
    Ready(T),
    Failed(String),
}

pub struct LoadTask<T> {
    rx: oneshot::Receiver<LoadEvent<T>>,
}

impl<T> LoadTask<T> {
    pub async fn wait(self) -> LoadEvent<T> { self.rx.await.unwrap_or_else(|_| exited()) }

    /// Blocks the current thread. Must not be called from within an async runtime.
    pub fn wait_blocking(self) -> LoadEvent<T> { self.rx.blocking_recv().unwrap_or_else(|_| exited()) }

    /// `None` while the load is still running.
    pub fn try_take(&mut self) -> Option<LoadEvent<T>> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(exited()),
        }
    }
}

fn exited<T>() -> LoadEvent<T> { LoadEvent::Failed("loader exited without reporting a result".to_string()) }

pub fn spawn_load<T, F>(work: F) -> LoadTask<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let spawned = std::thread::Builder::new().name("materia-load".to_string()).spawn(move || {
        let event = match work() {
            Ok(value) => LoadEvent::Ready(value),
            Err(e) => {
                let msg = format!("{:#}", e);
                error!(error = %msg, "background load failed");
                LoadEvent::Failed(msg)
            }
        };
        // receiver gone means the caller abandoned the load
        let _ = tx.send(event);
    });
    if let Err(e) = spawned {
        error!(error = %e, "failed to spawn loader thread");
    }
    LoadTask { rx }
}

/// A constructed engine plus what front-ends display about it.
pub struct LoadedEngine {
    pub engine: RetrievalEngine,
    pub snapshot: ModelSnapshot,
    pub mode: SearchMode,
}

/// Load the embedder described by `settings` and open the engine over its
/// index directory, falling back to the raw corpus.
pub fn spawn_engine_load(settings: Settings) -> LoadTask<LoadedEngine> {
    spawn_load(move || {
        let start = Instant::now();
        let loaded = load_embedder(&settings.model)?;
        let corpus = CorpusLoader::new(&settings.data.corpus_dir);
        let engine = RetrievalEngine::open(loaded.embedder, &settings.data.index_dir, Some(&corpus))?
            .with_batch_size(settings.index.batch_size);
        let mode = engine.mode();
        info!(
            mode = mode.as_str(),
            snapshot = ?loaded.snapshot,
            rows = engine.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "engine ready"
        );
        Ok(LoadedEngine { engine, snapshot: loaded.snapshot, mode })
    })
}
