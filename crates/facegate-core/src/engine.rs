//! Dedicated inference thread that owns the model handle.
//!
//! The model session is not safe for concurrent calls, so exactly one thread
//! owns it and serves embed requests in arrival order. Any number of
//! [`EngineHandle`] clones may submit work.

use crate::embedder::{ensure_finite, Embed, InferenceError};
use crate::preprocess::FaceTensor;
use crate::types::Embedding;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const REQUEST_QUEUE_DEPTH: usize = 4;

/// Messages sent from pipeline callers to the engine thread.
enum EngineRequest {
    Embed {
        tensor: FaceTensor,
        reply: oneshot::Sender<Result<Embedding, InferenceError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    timeout: Option<Duration>,
}

impl EngineHandle {
    /// Run one inference on the engine thread.
    ///
    /// With a timeout configured, an overrun is reported as
    /// [`InferenceError::Timeout`]; the in-flight call still runs to completion
    /// on the engine thread and its result is discarded.
    pub async fn embed(&self, tensor: FaceTensor) -> Result<Embedding, InferenceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Embed {
                tensor,
                reply: reply_tx,
            })
            .await
            .map_err(|_| InferenceError::EngineClosed)?;

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, reply_rx)
                .await
                .map_err(|_| InferenceError::Timeout(limit))?
                .map_err(|_| InferenceError::EngineClosed)?,
            None => reply_rx.await.map_err(|_| InferenceError::EngineClosed)?,
        }
    }
}

/// Spawn the engine on a dedicated OS thread, taking ownership of `embedder`.
///
/// The thread exits, dropping the embedder and its model, once every
/// [`EngineHandle`] has been dropped.
pub fn spawn_engine<E>(mut embedder: E, timeout: Option<Duration>) -> std::io::Result<EngineHandle>
where
    E: Embed + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(REQUEST_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Embed { tensor, reply } => {
                        let result = embedder.embed(&tensor).and_then(ensure_finite);
                        if let Err(e) = &result {
                            tracing::warn!(error = %e, "inference failed");
                        }
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx, timeout })
}
