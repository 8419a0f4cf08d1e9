//! Data types for passages, indexed records, retrieval matches, and chat turns.

use serde::{Deserialize, Serialize};

/// A trimmed, non-empty segment of a document.
///
/// The `id` is the passage's position within the document being indexed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Passage {
    /// Position of the passage, rendered as a decimal string.
    pub id: String,
    /// The passage text.
    pub text: String,
}

impl Passage {
    /// Number passages `0..n-1` in order.
    pub fn from_chunks(chunks: Vec<String>) -> Vec<Passage> {
        chunks
            .into_iter()
            .enumerate()
            .map(|(i, text)| Passage { id: i.to_string(), text })
            .collect()
    }
}

/// Payload stored next to each vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RecordMetadata {
    /// The passage text the vector was computed from.
    pub text: String,
}

/// The unit persisted in a vector index.
///
/// Writing a record whose `id` already exists replaces the stored vector and
/// metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedRecord {
    /// Unique identifier within the index.
    pub id: String,
    /// Embedding of `metadata.text`.
    #[serde(rename = "values")]
    pub vector: Vec<f32>,
    /// The stored payload.
    pub metadata: RecordMetadata,
}

impl IndexedRecord {
    /// Pair a passage with its embedding.
    pub fn new(passage: Passage, vector: Vec<f32>) -> Self {
        Self { id: passage.id, vector, metadata: RecordMetadata { text: passage.text } }
    }
}

/// One nearest-neighbour hit returned by a query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalMatch {
    /// Identifier of the matched record.
    pub id: String,
    /// Similarity score (higher is more relevant).
    pub score: f32,
    /// Payload of the matched record.
    #[serde(default)]
    pub metadata: RecordMetadata,
}

impl RetrievalMatch {
    /// The matched passage text.
    pub fn text(&self) -> &str {
        &self.metadata.text
    }
}

/// Similarity metric of a vector index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Cosine similarity.
    #[default]
    Cosine,
    /// Negated Euclidean distance.
    Euclidean,
    /// Raw dot product.
    #[serde(rename = "dotproduct")]
    DotProduct,
}

impl Metric {
    /// Score `a` against `b`; higher always means more similar.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Cosine => cosine_similarity(a, b),
            Metric::Euclidean => {
                -a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
            }
            Metric::DotProduct => a.iter().zip(b.iter()).map(|(x, y)| x * y).sum(),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Metric::Cosine => "cosine",
            Metric::Euclidean => "euclidean",
            Metric::DotProduct => "dotproduct",
        })
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Who said a [`ChatTurn`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person asking questions.
    User,
    /// The generated answer.
    Assistant,
}

/// One entry of the session's append-only chat history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTurn {
    /// Speaker.
    pub role: Role,
    /// What was said.
    pub text: String,
}

impl ChatTurn {
    /// A question from the user.
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into() }
    }

    /// An answer from the assistant.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, text: text.into() }
    }
}
