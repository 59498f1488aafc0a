use likeness_core::{
    AttributeAnalyzer, EngineError, FaceComparer, GalleryEntry, GalleryStore, Identification,
    MatchingEngine, ProbeImage, StoreError,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to start engine: {0}")]
    Startup(String),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from async callers to the engine thread.
enum EngineRequest {
    Identify {
        probe: ProbeImage,
        reply: oneshot::Sender<Result<Identification, EngineError>>,
    },
    Enroll {
        label: String,
        probe: ProbeImage,
        reply: oneshot::Sender<Result<GalleryEntry, EngineError>>,
    },
    List {
        reply: oneshot::Sender<Result<Vec<GalleryEntry>, StoreError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Estimate attributes and scan the gallery for `probe`.
    pub async fn identify(&self, probe: ProbeImage) -> Result<Identification, WorkerError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Identify { probe, reply }).await?;
        Ok(rx.await.map_err(|_| WorkerError::ChannelClosed)??)
    }

    /// Enroll `probe` under `label`, replacing any previous image.
    pub async fn enroll(&self, label: String, probe: ProbeImage) -> Result<GalleryEntry, WorkerError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Enroll {
            label,
            probe,
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| WorkerError::ChannelClosed)??)
    }

    /// List enrolled gallery entries.
    pub async fn list(&self) -> Result<Vec<GalleryEntry>, WorkerError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::List { reply }).await?;
        Ok(rx.await.map_err(|_| WorkerError::ChannelClosed)??)
    }

    async fn send(&self, request: EngineRequest) -> Result<(), WorkerError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| WorkerError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// `build` runs on that thread, so blocking clients are created and dropped
/// outside the async runtime. Resolves once `build` has finished and fails
/// fast if it failed. Requests are handled one at a time in arrival order.
pub async fn spawn_engine<F, S, C, A, E>(build: F) -> Result<EngineHandle, WorkerError>
where
    F: FnOnce() -> Result<MatchingEngine<S, C, A>, E> + Send + 'static,
    S: GalleryStore + 'static,
    C: FaceComparer + 'static,
    A: AttributeAnalyzer + 'static,
    E: std::fmt::Display,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    let (ready_tx, ready_rx) = oneshot::channel::<Result<(), String>>();

    std::thread::Builder::new()
        .name("likeness-engine".into())
        .spawn(move || {
            let engine = match build() {
                Ok(engine) => {
                    let _ = ready_tx.send(Ok(()));
                    engine
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err.to_string()));
                    return;
                }
            };

            tracing::debug!(tolerant = engine.options().tolerant, "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Identify { probe, reply } => {
                        let _ = reply.send(engine.identify(&probe));
                    }
                    EngineRequest::Enroll {
                        label,
                        probe,
                        reply,
                    } => {
                        let _ = reply.send(engine.enroll(&label, &probe));
                    }
                    EngineRequest::List { reply } => {
                        let _ = reply.send(engine.store().list_entries());
                    }
                }
            }
            tracing::debug!("engine thread exiting");
        })
        .map_err(|e| WorkerError::Startup(format!("failed to spawn engine thread: {e}")))?;

    match ready_rx.await {
        Ok(Ok(())) => Ok(EngineHandle { tx }),
        Ok(Err(message)) => Err(WorkerError::Startup(message)),
        Err(_) => Err(WorkerError::ChannelClosed),
    }
}
