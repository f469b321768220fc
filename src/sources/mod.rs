pub mod invidious;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use invidious::InvidiousClient;

/// Miniatura de un video en una resolución concreta
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// Metadata completa de un video, tal como la entrega el backend de extracción
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub author: String,
    pub author_id: String,
    pub duration_secs: u64,
    pub view_count: u64,
    pub like_count: u64,
    pub thumbnails: Vec<Thumbnail>,
}

/// Miniatura más pequeña que cubre el ancho pedido
pub fn fitting_thumbnail(thumbnails: &[Thumbnail], for_width: u32) -> Option<&str> {
    let mut ascending: Vec<&Thumbnail> = thumbnails.iter().collect();
    ascending.sort_by_key(|t| t.width);

    ascending
        .iter()
        .find(|t| t.width >= for_width)
        .or_else(|| ascending.last())
        .map(|t| t.url.as_str())
}

/// Entrada liviana de un listado o resultado de búsqueda
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoEntry {
    pub id: String,
    pub title: String,
    pub author: String,
    pub author_id: String,
    pub duration_secs: u64,
    pub view_count: u64,
    pub thumbnails: Vec<Thumbnail>,
}

/// Comentario individual de un video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub comment_id: String,
    pub text: String,
    pub author: String,
    pub author_channel_id: String,
}

impl Comment {
    /// Las respuestas llevan el id del padre como prefijo separado por punto
    pub fn is_reply(&self) -> bool {
        self.comment_id.contains('.')
    }
}

/// Secuencia de comentarios de un solo paso, solo hacia adelante.
///
/// Cada stream abierto se consume una única vez; retroceder exige abrir
/// un stream nuevo desde el backend.
#[async_trait]
pub trait CommentStream: Send {
    /// Siguiente comentario, o `None` cuando el stream se agotó
    async fn next(&mut self) -> Result<Option<Comment>>;
}

/// Capacidades del backend externo de catálogo/extracción.
///
/// Las llamadas pueden ser lentas o fallar; los errores se propagan sin
/// reintentos — la política de retry vive fuera de este núcleo.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Metadata completa de un video por id
    async fn video_info(&self, video_id: &str) -> Result<VideoInfo>;

    /// Búsqueda de videos, hasta `limit` resultados
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<VideoEntry>>;

    /// Abre un stream de comentarios nuevo, posicionado al inicio
    async fn open_comments(&self, video_id: &str) -> Result<Box<dyn CommentStream>>;
}
