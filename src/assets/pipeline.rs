//! Async import pipeline with bounded concurrent artifact production
//!
//! Requests are sent to a worker loop on a dedicated tokio runtime. Each
//! finished import comes back tagged with the caller's `tag`, so the caller
//! can decide whether the result is still wanted.

use crate::assets::artifact_store::ArtifactStore;
use crate::assets::importer::{ArtifactKey, Importer};
use crate::core::{ArtifactId, AssetId, Error, Result};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

/// Request to import one asset
#[derive(Debug, Clone)]
pub struct ImportRequest<T> {
    pub tag: T,
    pub key: ArtifactKey,
    /// Absolute source path, `None` if the asset is unknown to the database
    pub source_path: Option<PathBuf>,
}

/// How an import ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// Artifact produced (or found) in the store
    Imported {
        artifact: ArtifactId,
        paths: Vec<PathBuf>,
    },
    /// Source file does not exist
    Missing,
    /// Source exists but could not be imported
    Failed(String),
}

impl ImportOutcome {
    /// Artifact id, `ArtifactId::ZERO` for missing or failed imports
    pub fn artifact(&self) -> ArtifactId {
        match self {
            ImportOutcome::Imported { artifact, .. } => *artifact,
            _ => ArtifactId::ZERO,
        }
    }
}

/// Result of an import request
#[derive(Debug, Clone)]
pub struct ImportResult<T> {
    pub tag: T,
    pub asset: AssetId,
    pub outcome: ImportOutcome,
}

/// Concurrent importer running on its own runtime
pub struct ImportPipeline<T> {
    /// Channel for sending requests to the worker loop
    request_tx: Option<mpsc::UnboundedSender<ImportRequest<T>>>,
    /// Channel for receiving finished imports
    result_rx: mpsc::UnboundedReceiver<ImportResult<T>>,
    /// Requests sent but not yet polled back
    in_flight: usize,
    store: Arc<ArtifactStore>,
    runtime: Option<Runtime>,
}

impl<T: Send + 'static> ImportPipeline<T> {
    /// Create a pipeline that runs at most `max_concurrent` imports at once
    pub fn new(store: ArtifactStore, importer: Arc<dyn Importer>, max_concurrent: usize) -> Result<Self> {
        if max_concurrent == 0 {
            return Err(Error::Config("max_concurrent_imports must be at least 1".into()));
        }

        let (request_tx, request_rx) = mpsc::unbounded_channel::<ImportRequest<T>>();
        let (result_tx, result_rx) = mpsc::unbounded_channel::<ImportResult<T>>();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(max_concurrent.min(4))
            .thread_name("scenedeps-import")
            .enable_all()
            .build()?;

        let store = Arc::new(store);
        let worker_store = Arc::clone(&store);
        runtime.spawn(async move {
            Self::worker_loop(worker_store, importer, max_concurrent, request_rx, result_tx).await;
        });

        log::info!("Import pipeline started ({} concurrent imports)", max_concurrent);

        Ok(Self {
            request_tx: Some(request_tx),
            result_rx,
            in_flight: 0,
            store,
            runtime: Some(runtime),
        })
    }

    async fn worker_loop(
        store: Arc<ArtifactStore>,
        importer: Arc<dyn Importer>,
        max_concurrent: usize,
        mut request_rx: mpsc::UnboundedReceiver<ImportRequest<T>>,
        result_tx: mpsc::UnboundedSender<ImportResult<T>>,
    ) {
        use tokio::task::JoinSet;

        let mut active_tasks = JoinSet::new();
        let mut queued: VecDeque<ImportRequest<T>> = VecDeque::new();

        loop {
            tokio::select! {
                Some(request) = request_rx.recv() => {
                    queued.push_back(request);
                }

                Some(result) = active_tasks.join_next(), if !active_tasks.is_empty() => {
                    match result {
                        Ok(import_result) => {
                            // Receiver gone means the pipeline was dropped
                            let _ = result_tx.send(import_result);
                        }
                        Err(e) => {
                            log::error!("Import task panicked: {}", e);
                        }
                    }
                }

                else => {
                    if queued.is_empty() && active_tasks.is_empty() {
                        break;
                    }
                }
            }

            // FIFO: requests are started in submission order
            while active_tasks.len() < max_concurrent {
                let Some(request) = queued.pop_front() else { break };
                let store = Arc::clone(&store);
                let importer = Arc::clone(&importer);
                active_tasks.spawn(async move {
                    Self::import_task(store, importer, request).await
                });
            }
        }

        log::debug!("Import worker loop stopped");
    }

    async fn import_task(
        store: Arc<ArtifactStore>,
        importer: Arc<dyn Importer>,
        request: ImportRequest<T>,
    ) -> ImportResult<T> {
        let asset = request.key.asset;

        let outcome = match &request.source_path {
            None => ImportOutcome::Missing,
            Some(path) => match tokio::fs::read(path).await {
                Ok(source) => {
                    // Importers are synchronous and may be CPU heavy
                    let key = request.key.clone();
                    let produced = tokio::task::spawn_blocking(move || {
                        store.produce(&key, importer.as_ref(), &source)
                    })
                    .await;

                    match produced {
                        Ok(Ok((artifact, paths))) => ImportOutcome::Imported { artifact, paths },
                        Ok(Err(e)) => ImportOutcome::Failed(e.to_string()),
                        Err(e) => ImportOutcome::Failed(format!("import task failed: {}", e)),
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => ImportOutcome::Missing,
                Err(e) => ImportOutcome::Failed(e.to_string()),
            },
        };

        ImportResult { tag: request.tag, asset, outcome }
    }

    /// Queue an import
    pub fn submit(&mut self, request: ImportRequest<T>) -> Result<()> {
        let tx = self.request_tx.as_ref().ok_or(Error::Disposed)?;
        tx.send(request)
            .map_err(|_| Error::Import("import worker stopped".into()))?;
        self.in_flight += 1;
        Ok(())
    }

    /// Append every finished import to `out` (non-blocking).
    /// Returns the number of results appended.
    pub fn poll(&mut self, out: &mut Vec<ImportResult<T>>) -> usize {
        let mut count = 0;
        while let Ok(result) = self.result_rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            out.push(result);
            count += 1;
        }
        count
    }

    /// Number of submitted imports not yet polled back
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Artifact store used by the workers
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Stop accepting requests and shut the runtime down without waiting
    /// for running imports. Their results are dropped.
    pub fn shutdown(&mut self) {
        self.request_tx = None;
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
            log::info!("Import pipeline shut down");
        }
    }
}

impl<T> Drop for ImportPipeline<T> {
    fn drop(&mut self) {
        self.request_tx = None;
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
