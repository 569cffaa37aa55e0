mod members;

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;

use crate::members::{BuildUpdate, Member, Project};
use crate::semantic::{Embedder, EmbeddingError};

pub fn member(id: &str, name: &str, skills: &[&str], embedding: Option<Vec<f32>>) -> Member {
    Member {
        id: id.to_string(),
        name: name.to_string(),
        building: format!("{name}'s product"),
        past_work: String::new(),
        linkedin_url: String::new(),
        skills: skills.iter().map(|s| s.to_string()).collect(),
        profile_image: String::new(),
        text_repr: format!("Name: {name}"),
        embedding,
        projects: vec![],
        synced_at: Utc::now(),
    }
}

pub fn build_update(member_id: &str, text: &str, embedding: Option<Vec<f32>>) -> BuildUpdate {
    BuildUpdate {
        member_id: member_id.to_string(),
        date: "2024-06-01".to_string(),
        text: text.to_string(),
        embedding,
        ..Default::default()
    }
}

pub fn project(name: &str, build_updates: Vec<BuildUpdate>) -> Project {
    Project {
        name: name.to_string(),
        build_updates,
    }
}

/// Embedder that answers every request with the same fixed vector.
pub struct StubEmbedder(pub Vec<f32>);

impl Embedder for StubEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.0.clone())
    }
}

/// Embedder that fails every request; used to prove a code path never
/// reaches the embedding endpoint.
pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Api {
            status: 500,
            body: "embedder must not be called here".to_string(),
        })
    }
}

/// Embedder that counts how many times it was asked for a vector.
pub struct CountingEmbedder {
    pub vector: Vec<f32>,
    pub calls: AtomicUsize,
}

impl CountingEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for CountingEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector.clone())
    }
}
