//! Enroll / recognize orchestration.
//!
//! One invocation runs: face gate -> preprocess -> embed -> (append | match).
//! Collaborators are injected once at construction and shared across calls.

use crate::embedder::InferenceError;
use crate::engine::EngineHandle;
use crate::gallery::{GalleryStore, StoreError};
use crate::labels::LabelSource;
use crate::matcher::{match_gallery, CosineMatcher, DEFAULT_THRESHOLD};
use crate::preprocess::{self, PreprocessError};
use crate::types::{Embedding, MatchResult, RecordId};
use async_trait::async_trait;
use image::RgbImage;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    InvalidImage(#[from] PreprocessError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("face detector failed: {0}")]
    Detector(String),
}

/// Upstream "is there a face in this image" gate.
#[async_trait]
pub trait FacePresence: Send + Sync {
    async fn has_face(&self, image: &RgbImage) -> Result<bool, PipelineError>;
}

/// A verdict already computed by an external detector.
#[derive(Debug, Clone, Copy)]
pub struct StaticPresence(pub bool);

#[async_trait]
impl FacePresence for StaticPresence {
    async fn has_face(&self, _image: &RgbImage) -> Result<bool, PipelineError> {
        Ok(self.0)
    }
}

/// Synchronous, possibly slow face detector (a local model, a subprocess).
pub trait FaceDetector: Send + Sync + 'static {
    fn detect(&self, image: &RgbImage) -> Result<bool, PipelineError>;
}

/// Runs a [`FaceDetector`] on the blocking pool so async workers stay free.
pub struct BlockingPresence<D> {
    detector: Arc<D>,
}

impl<D: FaceDetector> BlockingPresence<D> {
    pub fn new(detector: D) -> Self {
        Self {
            detector: Arc::new(detector),
        }
    }
}

#[async_trait]
impl<D: FaceDetector> FacePresence for BlockingPresence<D> {
    async fn has_face(&self, image: &RgbImage) -> Result<bool, PipelineError> {
        let detector = Arc::clone(&self.detector);
        let image = image.clone();
        tokio::task::spawn_blocking(move || detector.detect(&image))
            .await
            .map_err(|e| PipelineError::Detector(format!("detector task failed: {e}")))?
    }
}

/// Operation mode, chosen per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Enroll,
    Recognize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Enrolled { record_id: RecordId, identity: String },
    Recognized(MatchResult),
    NoFaceDetected,
}

pub struct Orchestrator {
    engine: EngineHandle,
    gallery: Arc<dyn GalleryStore>,
    presence: Arc<dyn FacePresence>,
    labels: Arc<dyn LabelSource>,
    matcher: CosineMatcher,
    threshold: f32,
}

impl Orchestrator {
    pub fn new(
        engine: EngineHandle,
        gallery: Arc<dyn GalleryStore>,
        presence: Arc<dyn FacePresence>,
        labels: Arc<dyn LabelSource>,
    ) -> Self {
        Self {
            engine,
            gallery,
            presence,
            labels,
            matcher: CosineMatcher,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub async fn run(&self, image: &RgbImage, mode: Mode) -> Result<Outcome, PipelineError> {
        match mode {
            Mode::Enroll => self.enroll(image).await,
            Mode::Recognize => self.recognize(image).await,
        }
    }

    /// Embed the face and store it under a freshly generated label.
    pub async fn enroll(&self, image: &RgbImage) -> Result<Outcome, PipelineError> {
        let Some(embedding) = self.embed_if_face(image).await? else {
            return Ok(Outcome::NoFaceDetected);
        };

        let identity = self.labels.next_label();
        let gallery = Arc::clone(&self.gallery);
        let label = identity.clone();
        let record_id = blocking(move || gallery.append(&label, &embedding)).await?;

        tracing::info!(%record_id, %identity, "enrolled");
        Ok(Outcome::Enrolled {
            record_id,
            identity,
        })
    }

    /// Recognize against the gallery with the configured threshold.
    pub async fn recognize(&self, image: &RgbImage) -> Result<Outcome, PipelineError> {
        self.recognize_with_threshold(image, self.threshold).await
    }

    pub async fn recognize_with_threshold(
        &self,
        image: &RgbImage,
        threshold: f32,
    ) -> Result<Outcome, PipelineError> {
        let Some(embedding) = self.embed_if_face(image).await? else {
            return Ok(Outcome::NoFaceDetected);
        };

        let gallery = Arc::clone(&self.gallery);
        let matcher = self.matcher;
        let result =
            blocking(move || match_gallery(gallery.as_ref(), &matcher, &embedding, threshold))
                .await?;

        Ok(Outcome::Recognized(result))
    }

    /// `None` when the gate reports no face; nothing downstream runs in that case.
    async fn embed_if_face(&self, image: &RgbImage) -> Result<Option<Embedding>, PipelineError> {
        if !self.presence.has_face(image).await? {
            tracing::info!("no face detected; skipping inference");
            return Ok(None);
        }

        let tensor = preprocess::prepare(image)?;
        let embedding = self.engine.embed(tensor).await?;
        Ok(Some(embedding))
    }
}

async fn blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}
