use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Face embedding produced by the recognizer.
///
/// Serializes as a plain JSON array of numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<f32>", into = "Vec<f32>")]
pub struct Embedding {
    vector: Array1<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            vector: Array1::from_vec(values),
        }
    }

    pub fn len(&self) -> usize {
        self.vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        self.vector
            .as_slice()
            .unwrap_or_default()
    }

    pub fn values(&self) -> impl Iterator<Item = f32> + '_ {
        self.vector.iter().copied()
    }

    /// Returns a unit-length copy. A zero vector is returned unchanged.
    pub fn normalized(&self) -> Self {
        let norm = self.vector.dot(&self.vector).sqrt();
        if norm > 0.0 {
            Self {
                vector: &self.vector / norm,
            }
        } else {
            self.clone()
        }
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(embedding: Embedding) -> Self {
        embedding.vector.to_vec()
    }
}

/// How two embeddings are compared. Smaller is closer for every metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Euclidean,
    /// `1 - cosine similarity`, in `[0, 2]`.
    Cosine,
}

impl Metric {
    /// Distance between `a` and `b`, or `None` when their lengths differ.
    pub fn distance(self, a: &Embedding, b: &Embedding) -> Option<f32> {
        if a.len() != b.len() {
            return None;
        }
        let d = match self {
            Metric::Euclidean => euclidean_distance(a, b),
            Metric::Cosine => 1.0 - cosine_similarity(a, b),
        };
        Some(d)
    }
}

pub fn euclidean_distance(a: &Embedding, b: &Embedding) -> f32 {
    let diff = &a.vector - &b.vector;
    diff.dot(&diff).sqrt()
}

/// Cosine similarity clamped to `[-1, 1]`. Zero vectors have similarity 0.
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> f32 {
    let na = a.vector.dot(&a.vector).sqrt();
    let nb = b.vector.dot(&b.vector).sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (a.vector.dot(&b.vector) / (na * nb)).clamp(-1.0, 1.0)
}
