use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{Comment, CommentStream, ExtractionBackend, Thumbnail, VideoEntry, VideoInfo};
use crate::cache::{OutboundRequest, RequestCache};

/// Cliente para la API de Invidious (frontend alternativo de YouTube).
///
/// Todas las llamadas salen por el [`RequestCache`] compartido, así que
/// requests idénticos dentro de la vida del proceso no vuelven a la red.
pub struct InvidiousClient {
    http: Arc<RequestCache>,
    instances: Vec<String>,
    current_instance: AtomicUsize,
}

#[derive(Debug, Deserialize)]
struct InvidiousVideo {
    #[serde(rename = "videoId")]
    video_id: String,
    title: String,
    description: Option<String>,
    keywords: Option<Vec<String>>,
    author: Option<String>,
    #[serde(rename = "authorId")]
    author_id: Option<String>,
    #[serde(rename = "lengthSeconds")]
    length_seconds: Option<u64>,
    #[serde(rename = "viewCount")]
    view_count: Option<u64>,
    #[serde(rename = "likeCount")]
    like_count: Option<u64>,
    #[serde(rename = "videoThumbnails")]
    video_thumbnails: Option<Vec<InvidiousThumbnail>>,
}

impl InvidiousVideo {
    fn into_info(self) -> VideoInfo {
        VideoInfo {
            id: self.video_id,
            title: self.title,
            description: self.description.unwrap_or_default(),
            tags: self.keywords.unwrap_or_default(),
            author: self.author.unwrap_or_default(),
            author_id: self.author_id.unwrap_or_default(),
            duration_secs: self.length_seconds.unwrap_or_default(),
            view_count: self.view_count.unwrap_or_default(),
            like_count: self.like_count.unwrap_or_default(),
            thumbnails: self
                .video_thumbnails
                .unwrap_or_default()
                .into_iter()
                .map(InvidiousThumbnail::into_thumbnail)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct InvidiousThumbnail {
    url: String,
    width: u32,
    height: u32,
}

impl InvidiousThumbnail {
    fn into_thumbnail(self) -> Thumbnail {
        Thumbnail {
            url: self.url,
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InvidiousSearchResult {
    // canales y playlists no traen videoId; se filtran
    #[serde(rename = "videoId")]
    video_id: Option<String>,
    title: Option<String>,
    author: Option<String>,
    #[serde(rename = "authorId")]
    author_id: Option<String>,
    #[serde(rename = "lengthSeconds")]
    length_seconds: Option<u64>,
    #[serde(rename = "viewCount")]
    view_count: Option<u64>,
    #[serde(rename = "videoThumbnails")]
    video_thumbnails: Option<Vec<InvidiousThumbnail>>,
}

impl InvidiousSearchResult {
    fn into_entry(self) -> Option<VideoEntry> {
        Some(VideoEntry {
            id: self.video_id?,
            title: self.title.unwrap_or_default(),
            author: self.author.unwrap_or_default(),
            author_id: self.author_id.unwrap_or_default(),
            duration_secs: self.length_seconds.unwrap_or_default(),
            view_count: self.view_count.unwrap_or_default(),
            thumbnails: self
                .video_thumbnails
                .unwrap_or_default()
                .into_iter()
                .map(InvidiousThumbnail::into_thumbnail)
                .collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct InvidiousComments {
    comments: Vec<InvidiousComment>,
    continuation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InvidiousComment {
    #[serde(rename = "commentId")]
    comment_id: String,
    content: String,
    author: Option<String>,
    #[serde(rename = "authorId")]
    author_id: Option<String>,
}

impl InvidiousComment {
    fn into_comment(self) -> Comment {
        Comment {
            comment_id: self.comment_id,
            text: self.content,
            author: self.author.unwrap_or_default(),
            author_channel_id: self.author_id.unwrap_or_default(),
        }
    }
}

async fn fetch_json<T: DeserializeOwned>(
    http: &RequestCache,
    instance: &str,
    path: &str,
) -> Result<T> {
    let url = format!("{instance}{path}");
    let response = http.execute(&OutboundRequest::get(&url)).await?;

    if !response.is_success() {
        bail!("instancia {} respondió {}", instance, response.status);
    }

    serde_json::from_slice(&response.body)
        .with_context(|| format!("respuesta inválida de {url}"))
}

impl InvidiousClient {
    pub fn new(http: Arc<RequestCache>, instances: Vec<String>) -> Self {
        Self {
            http,
            instances,
            current_instance: AtomicUsize::new(0),
        }
    }

    /// Instancias en orden de intento, rotando el punto de partida para
    /// repartir la carga entre instancias públicas
    fn instance_rotation(&self) -> Vec<String> {
        if self.instances.is_empty() {
            return Vec::new();
        }

        let start = self.current_instance.fetch_add(1, Ordering::SeqCst) % self.instances.len();
        self.instances
            .iter()
            .cycle()
            .skip(start)
            .take(self.instances.len())
            .cloned()
            .collect()
    }

    /// Intenta el mismo path contra cada instancia hasta que una responda
    async fn api_get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let mut last_error = None;

        for instance in self.instance_rotation() {
            match fetch_json(&self.http, &instance, path).await {
                Ok(parsed) => {
                    debug!("✅ {} sirvió {}", instance, path);
                    return Ok(parsed);
                }
                Err(err) => {
                    warn!("⚠️ Instancia {} falló para {}: {}", instance, path, err);
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("sin instancias de Invidious configuradas")))
    }
}

#[async_trait]
impl ExtractionBackend for InvidiousClient {
    async fn video_info(&self, video_id: &str) -> Result<VideoInfo> {
        let video: InvidiousVideo = self
            .api_get(&format!("/api/v1/videos/{video_id}"))
            .await?;
        Ok(video.into_info())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<VideoEntry>> {
        let mut entries = Vec::new();
        let max_pages = limit / 20 + 1;

        for page in 1..=max_pages {
            let path = format!(
                "/api/v1/search?q={}&type=video&page={}",
                urlencoding::encode(query),
                page
            );
            let results: Vec<InvidiousSearchResult> = self.api_get(&path).await?;

            if results.is_empty() {
                break;
            }

            entries.extend(results.into_iter().filter_map(InvidiousSearchResult::into_entry));

            if entries.len() >= limit {
                break;
            }
        }

        entries.truncate(limit);
        Ok(entries)
    }

    async fn open_comments(&self, video_id: &str) -> Result<Box<dyn CommentStream>> {
        Ok(Box::new(InvidiousCommentStream {
            http: self.http.clone(),
            instances: self.instances.clone(),
            pinned: None,
            video_id: video_id.to_string(),
            buffer: VecDeque::new(),
            continuation: None,
            exhausted: false,
        }))
    }
}

/// Stream de comentarios sobre el token de continuación de Invidious.
///
/// La primera página fija la instancia que respondió; las continuaciones
/// siguientes van siempre contra esa misma instancia.
struct InvidiousCommentStream {
    http: Arc<RequestCache>,
    instances: Vec<String>,
    pinned: Option<String>,
    video_id: String,
    buffer: VecDeque<Comment>,
    continuation: Option<String>,
    exhausted: bool,
}

impl InvidiousCommentStream {
    fn batch_path(&self) -> String {
        match &self.continuation {
            Some(token) => format!(
                "/api/v1/comments/{}?continuation={}",
                self.video_id,
                urlencoding::encode(token)
            ),
            None => format!("/api/v1/comments/{}", self.video_id),
        }
    }

    async fn fetch_batch(&mut self) -> Result<()> {
        let path = self.batch_path();

        let batch: InvidiousComments = match &self.pinned {
            Some(instance) => fetch_json(&self.http, instance, &path).await?,
            None => {
                let instances = self.instances.clone();
                let mut last_error = None;
                let mut found = None;

                for instance in instances {
                    match fetch_json(&self.http, &instance, &path).await {
                        Ok(batch) => {
                            self.pinned = Some(instance);
                            found = Some(batch);
                            break;
                        }
                        Err(err) => {
                            warn!("⚠️ Instancia {} sin comentarios de {}: {}", instance, self.video_id, err);
                            last_error = Some(err);
                        }
                    }
                }

                match found {
                    Some(batch) => batch,
                    None => {
                        return Err(last_error.unwrap_or_else(|| {
                            anyhow::anyhow!("sin instancias de Invidious configuradas")
                        }))
                    }
                }
            }
        };

        if batch.comments.is_empty() || batch.continuation.is_none() {
            self.exhausted = true;
        }
        self.continuation = batch.continuation;

        self.buffer
            .extend(batch.comments.into_iter().map(InvidiousComment::into_comment));

        Ok(())
    }
}

#[async_trait]
impl CommentStream for InvidiousCommentStream {
    async fn next(&mut self) -> Result<Option<Comment>> {
        loop {
            if let Some(comment) = self.buffer.pop_front() {
                return Ok(Some(comment));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch_batch().await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::request_cache::MockHttpTransport;
    use crate::cache::CachedResponse;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn json_response(body: &str) -> CachedResponse {
        CachedResponse {
            status: 200,
            body: Bytes::copy_from_slice(body.as_bytes()),
        }
    }

    fn client_with(transport: MockHttpTransport) -> InvidiousClient {
        let http = Arc::new(RequestCache::new(Arc::new(transport), 64));
        InvidiousClient::new(http, vec!["https://inv.test".to_string()])
    }

    #[tokio::test]
    async fn test_video_info_maps_fields() {
        let mut transport = MockHttpTransport::new();
        transport.expect_send().times(1).returning(|req| {
            assert_eq!(req.url, "https://inv.test/api/v1/videos/dQw4w9WgXcQ");
            Ok(json_response(
                r#"{
                    "videoId": "dQw4w9WgXcQ",
                    "title": "Example",
                    "description": "a video",
                    "keywords": ["cats", "kittens"],
                    "author": "Channel",
                    "authorId": "UC123",
                    "lengthSeconds": 212,
                    "viewCount": 1000,
                    "likeCount": 10,
                    "videoThumbnails": [{"url": "https://inv.test/t.jpg", "width": 320, "height": 180}]
                }"#,
            ))
        });

        let client = client_with(transport);
        let info = client.video_info("dQw4w9WgXcQ").await.unwrap();

        assert_eq!(info.id, "dQw4w9WgXcQ");
        assert_eq!(info.tags, vec!["cats".to_string(), "kittens".to_string()]);
        assert_eq!(info.duration_secs, 212);
        assert_eq!(info.thumbnails.len(), 1);
    }

    #[tokio::test]
    async fn test_search_filters_non_videos() {
        let mut transport = MockHttpTransport::new();
        transport.expect_send().times(1).returning(|_| {
            Ok(json_response(
                r#"[
                    {"videoId": "v1", "title": "one", "author": "a", "authorId": "c1"},
                    {"title": "a channel, no videoId", "author": "b"},
                    {"videoId": "v2", "title": "two", "author": "a", "authorId": "c1"}
                ]"#,
            ))
        });

        let client = client_with(transport);
        let entries = client.search("cats", 10).await.unwrap();

        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["v1", "v2"]);
    }

    #[tokio::test]
    async fn test_failed_instance_falls_through_to_next() {
        let mut transport = MockHttpTransport::new();
        transport.expect_send().times(2).returning(|req| {
            if req.url.starts_with("https://down.test") {
                Ok(CachedResponse {
                    status: 502,
                    body: Bytes::new(),
                })
            } else {
                Ok(json_response(r#"{"videoId": "v1", "title": "ok"}"#))
            }
        });

        let http = Arc::new(RequestCache::new(Arc::new(transport), 64));
        let client = InvidiousClient::new(
            http,
            vec!["https://down.test".to_string(), "https://up.test".to_string()],
        );

        let info = client.video_info("v1").await.unwrap();
        assert_eq!(info.title, "ok");
    }

    #[tokio::test]
    async fn test_comment_stream_follows_continuations() {
        let mut transport = MockHttpTransport::new();
        transport.expect_send().times(2).returning(|req| {
            if req.url.contains("continuation=") {
                Ok(json_response(
                    r#"{"comments": [{"commentId": "c3", "content": "three", "author": "x", "authorId": "ch"}]}"#,
                ))
            } else {
                Ok(json_response(
                    r#"{
                        "comments": [
                            {"commentId": "c1", "content": "one", "author": "x", "authorId": "ch"},
                            {"commentId": "c1.r1", "content": "reply", "author": "y", "authorId": "ch2"}
                        ],
                        "continuation": "tok"
                    }"#,
                ))
            }
        });

        let http = Arc::new(RequestCache::new(Arc::new(transport), 64));
        let client = InvidiousClient::new(http, vec!["https://inv.test".to_string()]);

        let mut stream = client.open_comments("v1").await.unwrap();
        let mut drained = Vec::new();
        while let Some(comment) = stream.next().await.unwrap() {
            drained.push(comment);
        }

        let ids: Vec<&str> = drained.iter().map(|c| c.comment_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c1.r1", "c3"]);
        assert!(drained[1].is_reply());
    }

    #[tokio::test]
    async fn test_exhausted_stream_keeps_returning_none() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_| Ok(json_response(r#"{"comments": []}"#)));

        let http = Arc::new(RequestCache::new(Arc::new(transport), 64));
        let client = InvidiousClient::new(http, vec!["https://inv.test".to_string()]);

        let mut stream = client.open_comments("v1").await.unwrap();
        assert!(stream.next().await.unwrap().is_none());
        assert!(stream.next().await.unwrap().is_none());
    }
}
