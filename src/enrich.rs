//! Enrichment pipeline: turn raw remote records into cached `Member`s.
//!
//! Each newly-seen member record gets a deterministic text summary, an
//! embedding, a cached profile image and its build updates grouped into
//! projects. Independent per-member tasks run on a bounded worker pool and
//! are aggregated strictly after all of them finish (fork-join, no pipeline).

use std::{
    sync::atomic::{AtomicU16, Ordering},
    thread::sleep,
    time::Duration,
};

use anyhow::anyhow;
use chrono::Utc;
use indicatif::ProgressBar;

use crate::{
    airtable::{fields, Record, TableClient},
    config::Config,
    images::ImageCache,
    members::{BuildUpdate, Member, MemberStore, Project},
    semantic::{text_repr, Embedder, EmbeddingClient},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOutcome {
    /// Records returned by the remote members table
    pub fetched: usize,
    /// Records not yet present in the local cache
    pub new: usize,
    /// New records skipped for a missing name
    pub skipped: usize,
    /// Records actually appended to the cache
    pub added: usize,
}

/// Full sync run: fetch, diff against the cache, enrich, merge.
pub fn run_sync(
    config: &Config,
    store: &dyn MemberStore,
    view_override: Option<&str>,
    max_threads_override: Option<u16>,
) -> anyhow::Result<SyncOutcome> {
    let table = TableClient::new(&config.airtable, config.airtable_key())?;

    let view = view_override.or(config.airtable.member_view.as_deref());
    let fetched = table.list_all(&config.airtable.members_table, view)?;
    let fetched_count = fetched.len();

    let existing = store.ids();
    let new_records: Vec<Record> = fetched
        .into_iter()
        .filter(|r| !existing.contains(&r.id))
        .collect();

    log::info!(
        "{} members fetched, {} new to process",
        fetched_count,
        new_records.len()
    );

    if new_records.is_empty() {
        return Ok(SyncOutcome {
            fetched: fetched_count,
            ..Default::default()
        });
    }

    // build updates are fetched once per run and shared by all workers
    let updates = table.list_all(&config.airtable.updates_table, None)?;

    let embedder = EmbeddingClient::new(&config.embedding, config.embedding_key())?;
    let images = ImageCache::new(config.base_path(), &config.images)?;
    let max_threads = max_threads_override
        .unwrap_or(config.sync_max_threads)
        .max(1);

    let members = enrich_all(&new_records, &updates, &embedder, &images, max_threads)?;

    let outcome = SyncOutcome {
        fetched: fetched_count,
        new: new_records.len(),
        skipped: new_records.len() - members.len(),
        added: store.merge_new(members)?,
    };

    log::info!(
        "sync done: {} added, {} skipped out of {} new",
        outcome.added,
        outcome.skipped,
        outcome.new
    );

    Ok(outcome)
}

/// Claim a worker slot, sleeping while all of them are taken. The
/// compare-and-swap keeps the bound exact even though every worker thread is
/// spawned upfront.
fn acquire_slot(counter: &AtomicU16, max_threads: u16) {
    loop {
        let active = counter.load(Ordering::Relaxed);
        if active < max_threads
            && counter
                .compare_exchange(active, active + 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            return;
        }
        sleep(Duration::from_millis(50));
    }
}

/// Enrich every record on the worker pool, aggregating after all tasks
/// complete. An embedding failure aborts the whole run; a record skipped for
/// a missing name just doesn't show up in the output.
pub fn enrich_all(
    records: &[Record],
    updates: &[Record],
    embedder: &dyn Embedder,
    images: &ImageCache,
    max_threads: u16,
) -> anyhow::Result<Vec<Member>> {
    let total = records.len();
    log::info!("enriching {total} members with {max_threads} workers");

    let progress = ProgressBar::new(total as u64);
    let thread_ctr = AtomicU16::new(0);

    let results: Vec<anyhow::Result<Option<Member>>> = std::thread::scope(|s| {
        let handles: Vec<_> = records
            .iter()
            .map(|record| {
                let thread_ctr = &thread_ctr;
                let progress = &progress;
                s.spawn(move || {
                    acquire_slot(thread_ctr, max_threads);

                    let result = enrich_member(record, updates, embedder, images);

                    thread_ctr.fetch_sub(1, Ordering::Relaxed);
                    progress.inc(1);
                    result
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow!("enrichment worker panicked")))
            })
            .collect()
    });

    progress.finish_and_clear();

    let mut members = vec![];
    for result in results {
        if let Some(member) = result? {
            members.push(member);
        }
    }

    Ok(members)
}

/// Enrich one raw member record. Returns `Ok(None)` when the record has no
/// usable name; embedding errors propagate.
pub fn enrich_member(
    record: &Record,
    updates: &[Record],
    embedder: &dyn Embedder,
    images: &ImageCache,
) -> anyhow::Result<Option<Member>> {
    let Some(name) = record.text(fields::NAME) else {
        log::warn!("skipping member {}: name is missing", record.id);
        return Ok(None);
    };

    let building = record.text_or_empty(fields::BUILDING);
    let past_work = record.text_or_empty(fields::PAST_WORK);
    let text = text_repr::member_text(&name, &building, &past_work);

    // image failures degrade the record, never the run
    let profile_image = record
        .attachment_url(fields::PROFILE_PICTURE)
        .and_then(|url| images.fetch(&record.id, &url))
        .unwrap_or_default();

    let projects = collect_projects(&record.id, &name, updates, embedder)?;

    let embedding = embedder.embed(&text)?;

    Ok(Some(Member {
        id: record.id.clone(),
        name,
        building,
        past_work,
        linkedin_url: record.text_or_empty(fields::LINKEDIN),
        skills: record.string_list(fields::EXPERTISE),
        profile_image,
        text_repr: text,
        embedding: Some(embedding),
        projects,
        synced_at: Utc::now(),
    }))
}

/// Group a member's build updates into projects keyed by project name,
/// first-seen order. An update naming no project is dropped; a member with no
/// matching updates gets an empty project list.
fn collect_projects(
    member_id: &str,
    member_name: &str,
    updates: &[Record],
    embedder: &dyn Embedder,
) -> anyhow::Result<Vec<Project>> {
    let needle = member_name.to_lowercase();

    let mut projects: Vec<Project> = vec![];

    for update in updates {
        let matches_member = update
            .text(fields::FULL_NAME)
            .map(|full_name| full_name.to_lowercase().contains(&needle))
            .unwrap_or(false);
        if !matches_member {
            continue;
        }

        let Some(project_name) = update
            .text(fields::PROJECT)
            .or_else(|| update.text(fields::PROJECT_ALT))
        else {
            continue;
        };

        let text = update.text_or_empty(fields::BUILD_GOAL);
        let embedding = match text_repr::update_text(&text) {
            Some(input) => Some(embedder.embed(&input)?),
            None => None,
        };

        let build_update = BuildUpdate {
            member_id: member_id.to_string(),
            date: update.text_or_empty(fields::UPDATE_DATE),
            text,
            build_url: update.text_or_empty(fields::BUILD_URL),
            asks: update.text_or_empty(fields::ASKS),
            customers_talked_to: update.text_or_empty(fields::CUSTOMERS),
            milestones: update.text_or_empty(fields::MILESTONES),
            embedding,
        };

        match projects.iter_mut().find(|p| p.name == project_name) {
            Some(project) => project.build_updates.push(build_update),
            None => projects.push(Project {
                name: project_name,
                build_updates: vec![build_update],
            }),
        }
    }

    Ok(projects)
}
