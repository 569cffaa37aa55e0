use clap::Parser;

mod airtable;
mod cli;
mod config;
mod enrich;
mod images;
mod members;
mod semantic;
mod storage;
#[cfg(test)]
mod tests;
mod web;

use config::Config;
use members::{BackendJson, MemberStore};
use semantic::{EmbeddingClient, SemanticSearchService};

pub fn parse_skills(skills: String) -> Vec<String> {
    skills
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = cli::Args::parse();
    let config = Config::load_with(&args.data_dir);

    match args.command {
        cli::Command::Sync { view, max_threads } => {
            let store = BackendJson::load(config.base_path())?;
            let outcome = enrich::run_sync(&config, &store, view.as_deref(), max_threads)?;

            println!(
                "{} fetched, {} new, {} skipped, {} added (cache holds {} members)",
                outcome.fetched,
                outcome.new,
                outcome.skipped,
                outcome.added,
                store.total()
            );
            Ok(())
        }

        cli::Command::Daemon {} => {
            let store = BackendJson::load(config.base_path())?;
            web::start_daemon(config, store);
            Ok(())
        }

        cli::Command::Search {
            query,
            limit,
            skills,
            updates,
        } => {
            let store = BackendJson::load(config.base_path())?;
            let client = EmbeddingClient::new(&config.embedding, config.embedding_key())?;
            let service = SemanticSearchService::build(Box::new(client), &store.all());

            if updates {
                let results = service.search_updates(&query, limit)?;
                let rows: Vec<_> = results
                    .iter()
                    .map(|r| {
                        serde_json::json!({
                            "score": r.score,
                            "member": r.update.member_name,
                            "project": r.update.project_name,
                            "date": r.update.date,
                            "update": r.update.text,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                let skills = skills.map(parse_skills);
                let results = service.search_members(&query, skills.as_deref(), limit)?;
                let rows: Vec<_> = results
                    .iter()
                    .map(|r| {
                        serde_json::json!({
                            "score": r.score,
                            "id": r.member.id,
                            "name": r.member.name,
                            "building": r.member.building,
                            "skills": r.member.skills,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            }
            Ok(())
        }

        cli::Command::Skills {} => {
            let store = BackendJson::load(config.base_path())?;
            for skill in store.skills() {
                println!("{skill}");
            }
            Ok(())
        }
    }
}
