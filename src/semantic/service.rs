//! Query-time semantic search over the cached member set.
//!
//! Built from a snapshot of the member cache: every record carrying an
//! embedding is indexed (members and build updates separately); records
//! without one are excluded up front, never scored as zero.

use crate::members::{member_update_cards, Member, UpdateCard};
use crate::semantic::embeddings::{Embedder, EmbeddingError};
use crate::semantic::index::{IndexError, VectorIndex};

/// Errors that can occur during semantic search operations.
#[derive(Debug, thiserror::Error)]
pub enum SemanticSearchError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ScoredMember {
    pub score: f32,
    #[serde(flatten)]
    pub member: Member,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ScoredUpdate {
    pub score: f32,
    #[serde(flatten)]
    pub update: UpdateCard,
}

pub struct SemanticSearchService {
    embedder: Box<dyn Embedder>,

    /// Members carrying an embedding; index keys are positions in this vec
    members: Vec<Member>,
    member_index: VectorIndex,

    /// Flattened build updates carrying an embedding, positional keys again
    updates: Vec<UpdateCard>,
    update_index: VectorIndex,
}

impl SemanticSearchService {
    /// Build the in-memory indexes from a member cache snapshot.
    ///
    /// Records with a missing or malformed embedding are filtered out here,
    /// with a warning, rather than failing the build.
    pub fn build(embedder: Box<dyn Embedder>, cached: &[Member]) -> Self {
        // dimensionality comes from the first usable vector; all vectors were
        // produced by the same model
        let dimensions = cached
            .iter()
            .filter_map(|m| m.embedding.as_ref().map(Vec::len))
            .chain(cached.iter().flat_map(|m| {
                m.projects.iter().flat_map(|p| {
                    p.build_updates
                        .iter()
                        .filter_map(|u| u.embedding.as_ref().map(Vec::len))
                })
            }))
            .next()
            .unwrap_or(0);

        let mut members = Vec::new();
        let mut member_index = VectorIndex::with_capacity(dimensions, cached.len());

        for member in cached {
            let Some(ref embedding) = member.embedding else {
                log::debug!("member {} has no embedding, excluded from search", member.id);
                continue;
            };

            match member_index.insert(members.len() as u64, embedding.clone()) {
                Ok(()) => members.push(member.clone()),
                Err(err) => {
                    log::warn!("member {} excluded from search: {err}", member.id);
                }
            }
        }

        let mut updates = Vec::new();
        let mut update_index = VectorIndex::new(dimensions);

        for member in cached {
            let cards = member_update_cards(member);
            let embeddings = member
                .projects
                .iter()
                .flat_map(|p| p.build_updates.iter().map(|u| u.embedding.clone()));

            for (card, embedding) in cards.into_iter().zip(embeddings) {
                let Some(embedding) = embedding else {
                    continue;
                };

                match update_index.insert(updates.len() as u64, embedding) {
                    Ok(()) => updates.push(card),
                    Err(err) => {
                        log::warn!(
                            "build update of member {} excluded from search: {err}",
                            member.id
                        );
                    }
                }
            }
        }

        log::info!(
            "semantic index ready: {} members, {} build updates",
            members.len(),
            updates.len()
        );

        Self {
            embedder,
            members,
            member_index,
            updates,
            update_index,
        }
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn update_count(&self) -> usize {
        self.updates.len()
    }

    /// Top-K members by cosine similarity against the query text.
    ///
    /// `skills` restricts candidates to members carrying every requested
    /// skill (case-insensitive), matching the UI's filter chips.
    pub fn search_members(
        &self,
        query: &str,
        skills: Option<&[String]>,
        limit: usize,
    ) -> Result<Vec<ScoredMember>, SemanticSearchError> {
        if self.member_index.is_empty() {
            return Ok(vec![]);
        }

        let candidates = skills.filter(|s| !s.is_empty()).map(|skills| {
            self.members
                .iter()
                .enumerate()
                .filter(|(_, member)| has_all_skills(member, skills))
                .map(|(idx, _)| idx as u64)
                .collect::<Vec<_>>()
        });

        if let Some(ref candidates) = candidates {
            if candidates.is_empty() {
                return Ok(vec![]);
            }
        }

        let query_embedding = self.embedder.embed(query)?;
        let results =
            self.member_index
                .search(&query_embedding, candidates.as_deref(), limit)?;

        Ok(results
            .into_iter()
            .map(|r| ScoredMember {
                score: r.score,
                member: self.members[r.id as usize].clone(),
            })
            .collect())
    }

    /// Top-K build updates by cosine similarity against the query text.
    pub fn search_updates(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ScoredUpdate>, SemanticSearchError> {
        if self.update_index.is_empty() {
            return Ok(vec![]);
        }

        let query_embedding = self.embedder.embed(query)?;
        let results = self.update_index.search(&query_embedding, None, limit)?;

        Ok(results
            .into_iter()
            .map(|r| ScoredUpdate {
                score: r.score,
                update: self.updates[r.id as usize].clone(),
            })
            .collect())
    }
}

fn has_all_skills(member: &Member, skills: &[String]) -> bool {
    skills.iter().all(|wanted| {
        member
            .skills
            .iter()
            .any(|have| have.eq_ignore_ascii_case(wanted))
    })
}
