use std::{
    collections::HashSet,
    hash::Hash,
    sync::{Arc, RwLock},
    time::Instant,
};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{BackendLocal, StorageManager};

const MEMBERS_FILE: &str = "members.json";

/// One dated entry in a project's update log. Updates have no standalone ID;
/// identity is positional inside the owning project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildUpdate {
    pub member_id: String,

    #[serde(default)]
    pub date: String,

    /// The week's build goal; this is the text that gets embedded
    #[serde(default)]
    pub text: String,

    #[serde(default)]
    pub build_url: String,

    #[serde(default)]
    pub asks: String,

    #[serde(default)]
    pub customers_talked_to: String,

    #[serde(default)]
    pub milestones: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Projects exist only inside a member record, grouped by display name.
/// There is no global project identity across members.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Project {
    pub name: String,

    #[serde(default)]
    pub build_updates: Vec<BuildUpdate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    /// External ID issued by the remote table, stable across fetches
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub building: String,

    #[serde(default)]
    pub past_work: String,

    #[serde(default)]
    pub linkedin_url: String,

    #[serde(default)]
    pub skills: Vec<String>,

    /// Relative path into the image cache, empty when no image was cached
    #[serde(default)]
    pub profile_image: String,

    /// The labeled text summary the member embedding was computed from
    #[serde(default)]
    pub text_repr: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    #[serde(default)]
    pub projects: Vec<Project>,

    #[serde(default = "Utc::now")]
    pub synced_at: DateTime<Utc>,
}

impl Hash for Member {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl PartialEq for Member {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Member {}

/// A build update flattened out of its member/project nesting, used by the
/// updates tab and update search results.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateCard {
    pub member_id: String,
    pub member_name: String,
    pub project_name: String,
    pub date: String,
    pub text: String,
    pub build_url: String,
    pub asks: String,
    pub customers_talked_to: String,
    pub milestones: String,
}

pub trait MemberStore: Send + Sync {
    fn all(&self) -> Vec<Member>;
    fn ids(&self) -> HashSet<String>;
    fn get(&self, id: &str) -> Option<Member>;
    /// Append-only merge: records whose ID is already present are ignored.
    /// Returns the number of records actually added.
    fn merge_new(&self, members: Vec<Member>) -> anyhow::Result<usize>;
    fn total(&self) -> usize;
}

/// Member cache persisted as a single JSON array, rewritten wholesale through
/// an atomic temp-file-then-rename.
#[derive(Clone)]
pub struct BackendJson {
    list: Arc<RwLock<Vec<Member>>>,
    store: BackendLocal,
}

impl BackendJson {
    pub fn load(base_path: &str) -> anyhow::Result<Self> {
        let store = BackendLocal::new(base_path).context("cannot create data directory")?;

        let members = if store.exists(MEMBERS_FILE) {
            let now = Instant::now();
            let data = store.read(MEMBERS_FILE)?;
            let members = parse_members(&data);
            log::debug!(
                "took {}ms to read member cache",
                now.elapsed().as_micros() as f64 / 1000.0
            );
            members
        } else {
            log::info!("no member cache at {base_path}/{MEMBERS_FILE}, starting empty");
            vec![]
        };

        Ok(BackendJson {
            list: Arc::new(RwLock::new(members)),
            store,
        })
    }

    fn save(&self) -> anyhow::Result<()> {
        let members = self.list.read().unwrap();
        let data = serde_json::to_vec_pretty(&*members)?;
        self.store
            .write(MEMBERS_FILE, &data)
            .context("cannot write member cache")?;
        Ok(())
    }

    /// Distinct skills across all cached members, sorted, for the filter chips.
    pub fn skills(&self) -> Vec<String> {
        let members = self.list.read().unwrap();
        let mut skills: Vec<String> = members
            .iter()
            .flat_map(|m| m.skills.iter().cloned())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        skills.sort();
        skills
    }

    /// All build updates flattened for the updates tab, newest-fetched first.
    pub fn update_cards(&self) -> Vec<UpdateCard> {
        let members = self.list.read().unwrap();
        members.iter().flat_map(member_update_cards).collect()
    }

    #[cfg(test)]
    pub fn wipe_database(self) -> Self {
        let _ = self.store.delete(MEMBERS_FILE);
        *self.list.write().unwrap() = vec![];
        self
    }
}

pub fn member_update_cards(member: &Member) -> Vec<UpdateCard> {
    member
        .projects
        .iter()
        .flat_map(|project| {
            project.build_updates.iter().map(|update| UpdateCard {
                member_id: member.id.clone(),
                member_name: member.name.clone(),
                project_name: project.name.clone(),
                date: update.date.clone(),
                text: update.text.clone(),
                build_url: update.build_url.clone(),
                asks: update.asks.clone(),
                customers_talked_to: update.customers_talked_to.clone(),
                milestones: update.milestones.clone(),
            })
        })
        .collect()
}

/// Parse the cache file, quarantining entries that fail schema validation
/// instead of failing the whole load. A completely unreadable file degrades to
/// an empty cache.
fn parse_members(data: &[u8]) -> Vec<Member> {
    let values: Vec<serde_json::Value> = match serde_json::from_slice(data) {
        Ok(values) => values,
        Err(err) => {
            log::warn!("member cache is malformed, treating as empty: {err}");
            return vec![];
        }
    };

    let total = values.len();
    let members: Vec<Member> = values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<Member>(value) {
            Ok(member) if !member.id.is_empty() && !member.name.is_empty() => Some(member),
            Ok(member) => {
                log::warn!("discarding cached member with empty id or name: {:?}", member.id);
                None
            }
            Err(err) => {
                log::warn!("discarding malformed cache entry: {err}");
                None
            }
        })
        .collect();

    if members.len() < total {
        log::warn!("kept {}/{} entries from member cache", members.len(), total);
    }

    members
}

impl MemberStore for BackendJson {
    fn all(&self) -> Vec<Member> {
        self.list.read().unwrap().clone()
    }

    fn ids(&self) -> HashSet<String> {
        self.list
            .read()
            .unwrap()
            .iter()
            .map(|m| m.id.clone())
            .collect()
    }

    fn get(&self, id: &str) -> Option<Member> {
        self.list.read().unwrap().iter().find(|m| m.id == id).cloned()
    }

    fn merge_new(&self, members: Vec<Member>) -> anyhow::Result<usize> {
        let mut added = 0;
        {
            let mut list = self.list.write().unwrap();
            let mut seen: HashSet<String> = list.iter().map(|m| m.id.clone()).collect();

            for member in members {
                if !seen.insert(member.id.clone()) {
                    log::debug!("member {} already cached, skipping", member.id);
                    continue;
                }
                list.push(member);
                added += 1;
            }
        }

        if added > 0 {
            self.save()?;
        }

        Ok(added)
    }

    fn total(&self) -> usize {
        self.list.read().unwrap().len()
    }
}
