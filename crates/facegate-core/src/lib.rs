//! facegate-core — Face embedding and gallery matching engine.
//!
//! Turns a face photo into a 512-dimensional FaceNet embedding via ONNX
//! Runtime and identifies it against a gallery of enrolled embeddings by
//! cosine similarity.

pub mod embedder;
pub mod engine;
pub mod gallery;
pub mod labels;
pub mod matcher;
pub mod pipeline;
pub mod preprocess;
pub mod types;

use std::path::PathBuf;

pub use embedder::{ensure_finite, Embed, InferenceError, ModelLoadError, OnnxEmbedder};
pub use engine::{spawn_engine, EngineHandle};
pub use gallery::{GallerySnapshot, GalleryStore, MemoryGallery, ScanPolicy, SqliteGallery, StoreError};
pub use labels::{LabelSource, TimestampLabels};
pub use matcher::{match_gallery, CosineMatcher, Matcher, DEFAULT_THRESHOLD};
pub use pipeline::{
    BlockingPresence, FaceDetector, FacePresence, Mode, Orchestrator, Outcome, PipelineError,
    StaticPresence,
};
pub use preprocess::{prepare, FaceTensor, PreprocessError};
pub use types::{Decision, Embedding, GalleryRecord, MatchResult, RecordId, EMBEDDING_DIM};

/// File name of the bundled FaceNet-512 embedding model.
pub const MODEL_FILE_NAME: &str = "facenet512.onnx";

/// Directory searched for model files when none is configured.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("/usr/share/facegate/models")
}
