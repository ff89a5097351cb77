use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of values in every face embedding produced by the recognition model.
pub const EMBEDDING_DIM: usize = 512;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("expected 512-dim embedding, got {0}")]
    WrongLength(usize),
}

/// Face embedding vector, always exactly [`EMBEDDING_DIM`] values.
///
/// Values are the raw model output; no normalization is applied here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Embedding {
    values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Result<Self, EmbeddingError> {
        if values.len() != EMBEDDING_DIM {
            return Err(EmbeddingError::WrongLength(values.len()));
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f32> {
        self.values
    }

    /// Index of the first NaN or infinite value, if any.
    pub fn first_non_finite(&self) -> Option<usize> {
        self.values.iter().position(|v| !v.is_finite())
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        cosine_similarity(&self.values, &other.values)
    }
}

impl TryFrom<Vec<f32>> for Embedding {
    type Error = EmbeddingError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(embedding: Embedding) -> Self {
        embedding.values
    }
}

/// Cosine similarity `dot(a, b) / (|a| * |b|)`.
///
/// Defined as `0.0` when either norm is zero. Accumulates in f64 and clamps
/// the result to [-1, 1] so rounding never escapes the documented range.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

/// Opaque identifier of a stored gallery record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An enrolled (identity, embedding) pair. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryRecord {
    pub id: RecordId,
    pub identity: String,
    pub embedding: Embedding,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// Whether the best gallery score cleared the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Matched,
    Unknown,
}

/// Result of matching a query embedding against a gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    /// Identity of the best-scoring record, `None` for an empty gallery.
    pub identity: Option<String>,
    pub record_id: Option<RecordId>,
    /// Cosine similarity of the best match [-1, 1].
    pub similarity: f32,
    pub decision: Decision,
}

impl MatchResult {
    pub fn matched(&self) -> bool {
        self.decision == Decision::Matched
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Unit vector along `axis`, scaled by `scale`.
    pub(crate) fn axis(axis: usize, scale: f32) -> Embedding {
        let mut values = vec![0.0; EMBEDDING_DIM];
        values[axis] = scale;
        Embedding::new(values).unwrap()
    }

    /// Unit vector whose cosine similarity with `axis(0, _)` is exactly `cos`.
    pub(crate) fn at_angle(cos: f32) -> Embedding {
        let mut values = vec![0.0; EMBEDDING_DIM];
        values[0] = cos;
        values[1] = (1.0 - cos * cos).sqrt();
        Embedding::new(values).unwrap()
    }

    fn ramp() -> Embedding {
        Embedding::new((0..EMBEDDING_DIM).map(|i| (i as f32 * 0.37).sin()).collect()).unwrap()
    }

    #[test]
    fn test_embedding_rejects_wrong_length() {
        assert_eq!(Embedding::new(vec![1.0; 3]), Err(EmbeddingError::WrongLength(3)));
        assert!(Embedding::new(vec![]).is_err());
        assert!(Embedding::new(vec![0.0; EMBEDDING_DIM + 1]).is_err());
    }

    #[test]
    fn test_first_non_finite() {
        assert_eq!(ramp().first_non_finite(), None);
        let mut values = vec![0.5; EMBEDDING_DIM];
        values[17] = f32::INFINITY;
        values[40] = f32::NAN;
        assert_eq!(Embedding::new(values).unwrap().first_non_finite(), Some(17));
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let v = ramp();
        assert!((v.similarity(&v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let v = ramp();
        let neg = Embedding::new(v.values().iter().map(|x| -x).collect()).unwrap();
        assert!((v.similarity(&neg) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        assert!(axis(0, 1.0).similarity(&axis(1, 1.0)).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let zero = Embedding::new(vec![0.0; EMBEDDING_DIM]).unwrap();
        assert_eq!(zero.similarity(&ramp()), 0.0);
        assert_eq!(ramp().similarity(&zero), 0.0);
        assert_eq!(zero.similarity(&zero), 0.0);
    }

    #[test]
    fn test_cosine_similarity_scale_invariant() {
        assert!((axis(3, 0.01).similarity(&axis(3, 250.0)) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_at_angle_helper() {
        assert!((axis(0, 1.0).similarity(&at_angle(0.7)) - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_embedding_serde_is_plain_sequence() {
        let json = serde_json::to_string(&axis(0, 1.5)).unwrap();
        assert!(json.starts_with("[1.5,0.0"));
        let back: Embedding = serde_json::from_str(&json).unwrap();
        assert_eq!(back, axis(0, 1.5));

        let short: Result<Embedding, _> = serde_json::from_str("[1.0, 2.0]");
        assert!(short.is_err());
    }
}
