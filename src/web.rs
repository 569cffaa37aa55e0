//! JSON API consumed by the directory UI.
//!
//! Serves the tabbed member/project/update views, the semantic search box,
//! skill filter chips and the cached profile images. Rendering itself lives
//! in the UI; this layer only exposes the data.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::signal;

use crate::{
    config::Config,
    images::IMAGES_DIR,
    members::{BackendJson, Member, MemberStore, UpdateCard},
    semantic::{
        EmbeddingClient, ScoredUpdate, SemanticSearchError, SemanticSearchService,
    },
};

const DEFAULT_PER_PAGE: usize = 12;
const MAX_PER_PAGE: usize = 100;

#[derive(Clone)]
struct SharedState {
    store: BackendJson,
    semantic: Option<Arc<SemanticSearchService>>,
}

pub fn start_daemon(config: Config, store: BackendJson) {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("cannot build tokio runtime")
        .block_on(async { start_app(config, store).await });
}

async fn start_app(config: Config, store: BackendJson) {
    // query-time search needs the embedding endpoint; without a key the
    // daemon still serves listings
    let semantic = match EmbeddingClient::new(&config.embedding, config.embedding_key()) {
        Ok(client) => Some(Arc::new(SemanticSearchService::build(
            Box::new(client),
            &store.all(),
        ))),
        Err(err) => {
            log::warn!("semantic search disabled: {err}");
            None
        }
    };

    let images_dir = format!("{}/{IMAGES_DIR}", config.base_path());
    let listen = config.web.listen.clone();

    let shared_state = Arc::new(SharedState { store, semantic });

    let app = Router::new()
        .nest_service("/api/image/", tower_http::services::ServeDir::new(images_dir))
        .route("/api/members/search", post(search_members))
        .route("/api/updates/search", post(search_updates))
        .route("/api/members", get(list_members))
        .route("/api/members/total", get(total))
        .route("/api/projects", get(list_projects))
        .route("/api/updates", get(list_updates))
        .route("/api/skills", get(list_skills))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state);

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .expect("cannot bind listen address");
    log::info!("listening on {listen}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[derive(Debug, thiserror::Error)]
enum WebError {
    #[error("semantic search is unavailable: {0}")]
    Unavailable(&'static str),

    #[error(transparent)]
    Semantic(#[from] SemanticSearchError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug)]
struct HttpError(WebError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        match self.0 {
            WebError::Unavailable(_) => (
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                json!({"error": self.0.to_string()}).to_string(),
            ),
            WebError::Semantic(SemanticSearchError::Embedding(_)) => {
                log::error!("{self:?}");
                (
                    axum::http::StatusCode::BAD_GATEWAY,
                    json!({"error": self.0.to_string()}).to_string(),
                )
            }
            WebError::Semantic(_) => {
                log::error!("{self:?}");
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": self.0.to_string()}).to_string(),
                )
            }
            WebError::Other(_) => {
                log::error!("{self:?}");
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": self.0.to_string()}).to_string(),
                )
            }
        }
        .into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<WebError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Member record as the UI sees it: everything but the embedding vectors.
#[derive(Debug, Clone, Serialize)]
struct MemberCard {
    id: String,
    name: String,
    building: String,
    past_work: String,
    linkedin_url: String,
    skills: Vec<String>,
    profile_image: String,
    projects: Vec<ProjectCard>,
}

#[derive(Debug, Clone, Serialize)]
struct ProjectCard {
    name: String,
    build_updates: Vec<UpdateView>,
}

#[derive(Debug, Clone, Serialize)]
struct UpdateView {
    date: String,
    text: String,
    build_url: String,
    asks: String,
    customers_talked_to: String,
    milestones: String,
}

impl From<&Member> for MemberCard {
    fn from(member: &Member) -> Self {
        Self {
            id: member.id.clone(),
            name: member.name.clone(),
            building: member.building.clone(),
            past_work: member.past_work.clone(),
            linkedin_url: member.linkedin_url.clone(),
            skills: member.skills.clone(),
            profile_image: member.profile_image.clone(),
            projects: member
                .projects
                .iter()
                .map(|p| ProjectCard {
                    name: p.name.clone(),
                    build_updates: p
                        .build_updates
                        .iter()
                        .map(|u| UpdateView {
                            date: u.date.clone(),
                            text: u.text.clone(),
                            build_url: u.build_url.clone(),
                            asks: u.asks.clone(),
                            customers_talked_to: u.customers_talked_to.clone(),
                            milestones: u.milestones.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct MemberHit {
    /// Cosine similarity; absent for plain listings
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<f32>,
    #[serde(flatten)]
    member: MemberCard,
}

#[derive(Debug, Clone, Serialize)]
struct MemberPage {
    total: usize,
    page: usize,
    per_page: usize,
    total_pages: usize,
    members: Vec<MemberHit>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MemberSearchRequest {
    /// Free-text semantic query; empty means plain listing
    query: Option<String>,

    /// Skill chips; a member must carry every requested skill
    skills: Option<Vec<String>>,

    #[serde(default)]
    page: usize,

    per_page: Option<usize>,
}

fn page_bounds(total: usize, page: usize, per_page: usize) -> (usize, usize, usize, usize) {
    let per_page = per_page.clamp(1, MAX_PER_PAGE);
    let total_pages = total.div_ceil(per_page).max(1);
    let page = page.clamp(1, total_pages);
    let start = (page - 1) * per_page;
    let end = (start + per_page).min(total);
    (start, end, page, total_pages)
}

fn has_all_skills(member: &Member, skills: &[String]) -> bool {
    skills.iter().all(|wanted| {
        member
            .skills
            .iter()
            .any(|have| have.eq_ignore_ascii_case(wanted))
    })
}

fn member_page(
    state: &SharedState,
    query: Option<&str>,
    skills: Option<&[String]>,
    page: usize,
    per_page: usize,
) -> Result<MemberPage, WebError> {
    let query = query.map(str::trim).filter(|q| !q.is_empty());

    let hits: Vec<MemberHit> = match query {
        Some(query) => {
            let semantic = state
                .semantic
                .as_ref()
                .ok_or(WebError::Unavailable("no embedding api key configured"))?;

            semantic
                .search_members(query, skills, semantic.member_count())?
                .into_iter()
                .map(|scored| MemberHit {
                    score: Some(scored.score),
                    member: MemberCard::from(&scored.member),
                })
                .collect()
        }
        None => state
            .store
            .all()
            .iter()
            .filter(|member| skills.map(|s| has_all_skills(member, s)).unwrap_or(true))
            .map(|member| MemberHit {
                score: None,
                member: MemberCard::from(member),
            })
            .collect(),
    };

    let total = hits.len();
    let (start, end, page, total_pages) = page_bounds(total, page, per_page);

    Ok(MemberPage {
        total,
        page,
        per_page: per_page.clamp(1, MAX_PER_PAGE),
        total_pages,
        members: hits[start..end].to_vec(),
    })
}

async fn search_members(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<MemberSearchRequest>,
) -> Result<Json<MemberPage>, HttpError> {
    log::debug!("payload: {payload:?}");

    tokio::task::block_in_place(move || {
        member_page(
            &state,
            payload.query.as_deref(),
            payload.skills.as_deref(),
            payload.page,
            payload.per_page.unwrap_or(DEFAULT_PER_PAGE),
        )
        .map(Json)
        .map_err(Into::into)
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ListQuery {
    #[serde(default)]
    page: usize,
    per_page: Option<usize>,
}

async fn list_members(
    State(state): State<Arc<SharedState>>,
    Query(params): Query<ListQuery>,
) -> Result<Json<MemberPage>, HttpError> {
    tokio::task::block_in_place(move || {
        member_page(
            &state,
            None,
            None,
            params.page,
            params.per_page.unwrap_or(DEFAULT_PER_PAGE),
        )
        .map(Json)
        .map_err(Into::into)
    })
}

#[derive(Debug, Clone, Deserialize)]
struct UpdateSearchRequest {
    query: String,
    limit: Option<usize>,
}

async fn search_updates(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<UpdateSearchRequest>,
) -> Result<Json<Vec<ScoredUpdate>>, HttpError> {
    log::debug!("payload: {payload:?}");

    tokio::task::block_in_place(move || {
        let semantic = state
            .semantic
            .as_ref()
            .ok_or(WebError::Unavailable("no embedding api key configured"))?;

        let limit = payload
            .limit
            .unwrap_or(crate::semantic::DEFAULT_SEARCH_LIMIT);

        semantic
            .search_updates(&payload.query, limit)
            .map(Json)
            .map_err(|err| HttpError::from(WebError::from(err)))
    })
}

/// One project entry for the projects tab. Projects are identified by display
/// name inside one member; same-named projects of different members stay
/// separate entries.
#[derive(Debug, Clone, Serialize)]
struct ProjectEntry {
    member_id: String,
    member_name: String,
    #[serde(flatten)]
    project: ProjectCard,
}

async fn list_projects(
    State(state): State<Arc<SharedState>>,
) -> Result<Json<Vec<ProjectEntry>>, HttpError> {
    tokio::task::block_in_place(move || {
        let entries: Vec<ProjectEntry> = state
            .store
            .all()
            .iter()
            .flat_map(|member| {
                let card = MemberCard::from(member);
                card.projects.into_iter().map(move |project| ProjectEntry {
                    member_id: member.id.clone(),
                    member_name: member.name.clone(),
                    project,
                })
            })
            .collect();

        Ok(Json(entries))
    })
}

async fn list_updates(
    State(state): State<Arc<SharedState>>,
) -> Result<Json<Vec<UpdateCard>>, HttpError> {
    tokio::task::block_in_place(move || Ok(Json(state.store.update_cards())))
}

async fn list_skills(
    State(state): State<Arc<SharedState>>,
) -> Result<Json<Vec<String>>, HttpError> {
    tokio::task::block_in_place(move || Ok(Json(state.store.skills())))
}

#[derive(Debug, Deserialize, Serialize, Clone)]
struct TotalResponse {
    total: usize,
}

async fn total(State(state): State<Arc<SharedState>>) -> Result<Json<TotalResponse>, HttpError> {
    tokio::task::block_in_place(move || {
        Ok(Json(TotalResponse {
            total: state.store.total(),
        }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds_empty_set_is_one_empty_page() {
        let (start, end, page, total_pages) = page_bounds(0, 1, 12);
        assert_eq!((start, end, page, total_pages), (0, 0, 1, 1));
    }

    #[test]
    fn test_page_bounds_page_zero_clamps_to_first() {
        let (start, end, page, _) = page_bounds(30, 0, 12);
        assert_eq!((start, end, page), (0, 12, 1));
    }

    #[test]
    fn test_page_bounds_overshoot_clamps_to_last() {
        // 30 members at 12 per page: 3 pages, the last one holds 6
        let (start, end, page, total_pages) = page_bounds(30, 99, 12);
        assert_eq!(total_pages, 3);
        assert_eq!((start, end, page), (24, 30, 3));
    }

    #[test]
    fn test_page_bounds_per_page_is_clamped() {
        let (start, end, _, _) = page_bounds(5, 1, 0);
        assert_eq!((start, end), (0, 1));

        let (start, end, _, total_pages) = page_bounds(250, 1, 10_000);
        assert_eq!((start, end), (0, MAX_PER_PAGE));
        assert_eq!(total_pages, 3);
    }

    #[test]
    fn test_page_bounds_exact_multiple() {
        let (start, end, page, total_pages) = page_bounds(24, 2, 12);
        assert_eq!((start, end, page, total_pages), (12, 24, 2, 2));
    }
}
