use axum::extract::{Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::{AppError, AppState};
use crate::sources::{fitting_thumbnail, VideoEntry, VideoInfo};
use crate::terms;

/// Resultados por página en listados, como en la interfaz clásica
const RESULTS_PER_PAGE: usize = 10;

/// Ancho objetivo de las miniaturas de listado
const THUMBNAIL_WIDTH: u32 = 256;

#[derive(Debug, Serialize)]
pub struct FeedEntry {
    pub id: String,
    pub title: String,
    pub author: String,
    pub author_id: String,
    pub duration_secs: u64,
    pub view_count: u64,
    pub thumbnail: Option<String>,
    pub watch_url: String,
    pub seen: bool,
}

#[derive(Debug, Serialize)]
pub struct FeedPage {
    pub page_title: String,
    pub query: String,
    pub page: u32,
    pub entries: Vec<FeedEntry>,
    pub prev_page: Option<u32>,
    pub next_page: u32,
}

impl FeedPage {
    fn empty(page_title: &str) -> Self {
        Self {
            page_title: page_title.to_string(),
            query: String::new(),
            page: 1,
            entries: Vec::new(),
            prev_page: None,
            next_page: 2,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VideoDetail {
    #[serde(flatten)]
    pub info: VideoInfo,
    pub small_thumbnail: Option<String>,
    pub watch_url: String,
    pub comments_url: String,
    pub related_query: String,
    pub seen: bool,
}

#[derive(Debug, Serialize)]
pub struct CommentView {
    pub comment_id: String,
    pub text: String,
    pub author: String,
    pub author_channel_id: String,
    pub is_reply: bool,
    pub channel_url: String,
}

#[derive(Debug, Serialize)]
pub struct CommentsPage {
    pub video_id: String,
    pub page: u32,
    pub comments: Vec<CommentView>,
    pub reached_end: bool,
    pub prev_page: Option<u32>,
    pub next_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct HomeParams {
    pub page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ResultsParams {
    pub search_query: String,
    pub page: Option<u32>,
    pub exclude_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub page: Option<u32>,
    pub exclude_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewParams {
    pub video_id: String,
}

#[derive(Debug, Deserialize)]
pub struct WatchParams {
    pub v: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentsParams {
    pub video_id: String,
    pub page: Option<u32>,
}

/// Página de inicio: busca con los términos recomendados por el historial.
/// Sin historial no hay consulta, y no se toca el backend.
pub async fn home(
    State(state): State<AppState>,
    Query(params): Query<HomeParams>,
) -> Result<Json<FeedPage>, AppError> {
    let query = state
        .store
        .recommendations_query(state.config.recommendation_terms)
        .await;

    if query.trim().is_empty() {
        debug!("🏠 Sin historial todavía, feed vacío");
        return Ok(Json(FeedPage::empty("OpenTube")));
    }

    let page = params.page.unwrap_or(1).max(1);
    Ok(Json(feed(&state, "OpenTube", &query, page, None).await?))
}

pub async fn results(
    State(state): State<AppState>,
    Query(params): Query<ResultsParams>,
) -> Result<Json<FeedPage>, AppError> {
    let page = params.page.unwrap_or(1).max(1);
    let title = params.search_query.clone();
    Ok(Json(
        feed(&state, &title, &params.search_query, page, params.exclude_id).await?,
    ))
}

/// Alias de `/results` con el parámetro corto `q`
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<FeedPage>, AppError> {
    let page = params.page.unwrap_or(1).max(1);
    let title = params.q.clone();
    Ok(Json(
        feed(&state, &title, &params.q, page, params.exclude_id).await?,
    ))
}

pub async fn preview(
    State(state): State<AppState>,
    Query(params): Query<PreviewParams>,
) -> Result<Json<VideoDetail>, AppError> {
    let info = state.backend.video_info(&params.video_id).await?;
    let seen = state.store.is_seen(&info.id).await;
    Ok(Json(detail(info, seen)))
}

/// Detalle de un video. La vista se registra en segundo plano para no
/// demorar la respuesta; un fallo de persistencia se reporta en el log.
pub async fn watch(
    State(state): State<AppState>,
    Query(params): Query<WatchParams>,
) -> Result<Json<VideoDetail>, AppError> {
    let info = state.backend.video_info(&params.v).await?;
    let seen = state.store.is_seen(&info.id).await;

    let store = state.store.clone();
    let video_id = info.id.clone();
    let tags = info.tags.clone();
    tokio::spawn(async move {
        if let Err(err) = store.record_view(&video_id, &tags).await {
            error!("❌ No se pudo registrar la vista de {}: {}", video_id, err);
        }
    });

    Ok(Json(detail(info, seen)))
}

pub async fn comments(
    State(state): State<AppState>,
    Query(params): Query<CommentsParams>,
) -> Result<Json<CommentsPage>, AppError> {
    let page = params.page.unwrap_or(1).max(1);
    let result = state.comments.page(&params.video_id, page).await?;

    let comments = result
        .comments
        .into_iter()
        .map(|comment| CommentView {
            is_reply: comment.is_reply(),
            channel_url: format!("/channel/{}", comment.author_channel_id),
            comment_id: comment.comment_id,
            text: comment.text,
            author: comment.author,
            author_channel_id: comment.author_channel_id,
        })
        .collect();

    Ok(Json(CommentsPage {
        video_id: params.video_id,
        page,
        comments,
        reached_end: result.reached_end,
        prev_page: (page > 1).then(|| page - 1),
        next_page: (!result.reached_end).then(|| page + 1),
    }))
}

/// Listado paginado sobre la búsqueda del backend: se sobremuestrea hasta
/// `10 × página` resultados y se recorta la ventana pedida.
async fn feed(
    state: &AppState,
    page_title: &str,
    search_query: &str,
    page: u32,
    exclude_id: Option<String>,
) -> Result<FeedPage, AppError> {
    let wanted = RESULTS_PER_PAGE * page as usize;
    let oversample = wanted + usize::from(exclude_id.is_some());

    info!("🔍 Buscando \"{}\" (página {})", search_query, page);
    let entries = state.backend.search(search_query, oversample).await?;

    let entries: Vec<VideoEntry> = entries
        .into_iter()
        .filter(|entry| Some(&entry.id) != exclude_id.as_ref())
        .collect();

    let (start, end) = page_bounds(entries.len(), wanted, RESULTS_PER_PAGE);

    let mut feed_entries = Vec::with_capacity(end - start);
    for entry in &entries[start..end] {
        feed_entries.push(FeedEntry {
            seen: state.store.is_seen(&entry.id).await,
            thumbnail: fitting_thumbnail(&entry.thumbnails, THUMBNAIL_WIDTH)
                .map(str::to_owned),
            watch_url: format!("/watch?v={}", entry.id),
            id: entry.id.clone(),
            title: entry.title.clone(),
            author: entry.author.clone(),
            author_id: entry.author_id.clone(),
            duration_secs: entry.duration_secs,
            view_count: entry.view_count,
        });
    }

    Ok(FeedPage {
        page_title: page_title.to_string(),
        query: search_query.to_string(),
        page,
        entries: feed_entries,
        prev_page: (page > 1).then(|| page - 1),
        next_page: page + 1,
    })
}

fn detail(info: VideoInfo, seen: bool) -> VideoDetail {
    VideoDetail {
        small_thumbnail: fitting_thumbnail(&info.thumbnails, THUMBNAIL_WIDTH)
            .map(str::to_owned),
        watch_url: format!("/watch?v={}", info.id),
        comments_url: format!("/comments?video_id={}", info.id),
        related_query: terms::search_terms(&info.tags, &info.title, &info.description)
            .join(" "),
        seen,
        info,
    }
}

/// Ventana `[wanted - per_page, wanted)` recortada al total disponible
fn page_bounds(total: usize, wanted: usize, per_page: usize) -> (usize, usize) {
    let start = wanted.saturating_sub(per_page).min(total);
    let end = wanted.min(total);
    (start, end)
}
