//! FaceNet-512 face embedder via ONNX Runtime.
//!
//! Feeds a preprocessed 160x160 RGB tensor to the model and reads back the
//! 512-dimensional embedding. No caching, no retries, no normalization.

use crate::preprocess::FaceTensor;
use crate::types::{Embedding, EMBEDDING_DIM};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("model file not found: {0}")]
    NotFound(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("model not loaded")]
    ModelNotLoaded,
    #[error("expected 512-dim embedding, got {0}")]
    OutputShape(usize),
    #[error("model produced a non-finite value at index {0}")]
    NonFinite(usize),
    #[error("inference failed: {0}")]
    Failed(String),
    #[error("inference timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("engine thread exited")]
    EngineClosed,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A single-shot, synchronous embedding backend.
///
/// Implementations need not be safe for concurrent use; the engine owns
/// exactly one and calls it from one thread.
pub trait Embed: Send {
    fn embed(&mut self, tensor: &FaceTensor) -> Result<Embedding, InferenceError>;
}

/// ONNX Runtime embedder. The session is released on drop or [`release`](Self::release).
pub struct OnnxEmbedder {
    session: Option<Session>,
}

impl OnnxEmbedder {
    /// Load the embedding ONNX model from the given path.
    pub fn load(model_path: &Path, intra_threads: usize) -> Result<Self, ModelLoadError> {
        if !model_path.exists() {
            return Err(ModelLoadError::NotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads)
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded embedding model"
        );

        Ok(Self {
            session: Some(session),
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.session.is_some()
    }

    /// Drop the session. Later `embed` calls fail with [`InferenceError::ModelNotLoaded`].
    pub fn release(&mut self) {
        if self.session.take().is_some() {
            tracing::info!("embedding model released");
        }
    }
}

impl Embed for OnnxEmbedder {
    fn embed(&mut self, tensor: &FaceTensor) -> Result<Embedding, InferenceError> {
        let session = self.session.as_mut().ok_or(InferenceError::ModelNotLoaded)?;

        let input = tensor
            .view()
            .map_err(|e| InferenceError::Failed(format!("input layout: {e}")))?;
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input)?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::Failed(format!("embedding extraction: {e}")))?;

        let raw: Vec<f32> = raw_data.to_vec();
        if raw.len() != EMBEDDING_DIM {
            return Err(InferenceError::OutputShape(raw.len()));
        }

        let embedding = Embedding::new(raw).map_err(|e| InferenceError::Failed(e.to_string()))?;
        ensure_finite(embedding)
    }
}

/// Reject embeddings carrying NaN or infinity before they reach a gallery.
pub fn ensure_finite(embedding: Embedding) -> Result<Embedding, InferenceError> {
    match embedding.first_non_finite() {
        Some(index) => Err(InferenceError::NonFinite(index)),
        None => Ok(embedding),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_model() {
        let err = OnnxEmbedder::load(Path::new("/nonexistent/facenet512.onnx"), 1)
            .err()
            .unwrap();
        assert!(matches!(err, ModelLoadError::NotFound(ref p) if p.ends_with("facenet512.onnx")));
    }

    #[test]
    fn test_ensure_finite() {
        let mut values = vec![0.1; EMBEDDING_DIM];
        assert!(ensure_finite(Embedding::new(values.clone()).unwrap()).is_ok());

        values[3] = f32::NAN;
        assert!(matches!(
            ensure_finite(Embedding::new(values.clone()).unwrap()),
            Err(InferenceError::NonFinite(3))
        ));

        values[3] = 0.0;
        values[511] = f32::NEG_INFINITY;
        assert!(matches!(
            ensure_finite(Embedding::new(values).unwrap()),
            Err(InferenceError::NonFinite(511))
        ));
    }

    #[test]
    fn test_released_embedder_rejects_embed() {
        let mut embedder = OnnxEmbedder { session: None };
        embedder.release();
        assert!(!embedder.is_loaded());

        let tensor = crate::preprocess::prepare(&image::RgbImage::new(160, 160)).unwrap();
        assert!(matches!(
            embedder.embed(&tensor),
            Err(InferenceError::ModelNotLoaded)
        ));
    }
}
