use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::sources::{Comment, CommentStream, ExtractionBackend};

/// Página de comentarios ya materializada
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentPage {
    pub comments: Vec<Comment>,
    pub reached_end: bool,
}

type PageKey = (String, u32);

/// Cursor vivo sobre el stream de comentarios de un video
struct StreamCursor {
    stream: Box<dyn CommentStream>,
    pages_yielded: u32,
}

/// Motor de paginación de comentarios.
///
/// El backend solo ofrece una secuencia perezosa de un solo paso por video;
/// este motor la convierte en una API paginada e idempotente por página.
/// El caso común (avance secuencial) reutiliza un cursor vivo por video;
/// cualquier otro patrón de acceso reinicia el stream desde el principio y
/// avanza en rápido hasta la página pedida, a costa de trabajo repetido.
///
/// Exclusión mutua por `(video, página)`: solo un caller computa una página
/// no cacheada; los demás esperan y releen el resultado ya publicado. Es el
/// único punto del servicio que exige single-flight estricto.
pub struct CommentPaginator {
    backend: Arc<dyn ExtractionBackend>,
    page_size: usize,
    capacity: usize,
    pages: parking_lot::Mutex<IndexMap<PageKey, CommentPage>>,
    cursors: AsyncMutex<IndexMap<String, StreamCursor>>,
    locks: DashMap<PageKey, Arc<AsyncMutex<()>>>,
}

impl CommentPaginator {
    pub fn new(backend: Arc<dyn ExtractionBackend>, page_size: usize, capacity: usize) -> Self {
        Self {
            backend,
            page_size,
            capacity,
            pages: parking_lot::Mutex::new(IndexMap::new()),
            cursors: AsyncMutex::new(IndexMap::new()),
            locks: DashMap::new(),
        }
    }

    /// Devuelve la página pedida, computándola del stream si hace falta.
    ///
    /// Pedir una página más allá del final no es un error: llega vacía y con
    /// `reached_end = true`.
    pub async fn page(&self, video_id: &str, page: u32) -> Result<CommentPage> {
        let key = (video_id.to_string(), page);

        if let Some(hit) = self.pages.lock().get(&key).cloned() {
            return Ok(hit);
        }

        let section = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let _guard = section.lock().await;

        // quien esperó la sección relee la página ya publicada
        if let Some(hit) = self.pages.lock().get(&key).cloned() {
            return Ok(hit);
        }

        let mut cursor = self.take_cursor(video_id, page).await?;

        let mut comments = Vec::with_capacity(self.page_size);
        let mut reached_end = false;

        while comments.len() < self.page_size {
            match cursor.stream.next().await? {
                Some(comment) => comments.push(comment),
                None => {
                    reached_end = true;
                    break;
                }
            }
        }

        cursor.pages_yielded = page;
        self.park_cursor(video_id, cursor).await;

        let result = CommentPage {
            comments,
            reached_end,
        };
        self.publish(key, result.clone());

        Ok(result)
    }

    /// Saca el cursor del video de la tabla, decidiendo si sirve tal cual o
    /// hay que reiniciar el stream.
    ///
    /// El cursor queda FUERA de la tabla mientras se drena: una carrera rara
    /// (lock desalojado a mitad de cómputo) termina en dos streams
    /// independientes, nunca en dos lectores del mismo stream.
    async fn take_cursor(&self, video_id: &str, page: u32) -> Result<StreamCursor> {
        let existing = self.cursors.lock().await.shift_remove(video_id);

        match existing {
            Some(cursor) if page == cursor.pages_yielded + 1 => Ok(cursor),
            _ => {
                debug!(
                    "🔄 Reiniciando stream de comentarios de {} para la página {}",
                    video_id, page
                );
                let stream = self.backend.open_comments(video_id).await?;
                let mut cursor = StreamCursor {
                    stream,
                    pages_yielded: 0,
                };
                self.fast_forward(&mut cursor, page).await?;
                Ok(cursor)
            }
        }
    }

    /// Avanza un cursor recién reiniciado hasta justo antes de `page`,
    /// descartando lo drenado. Si el stream se agota antes, la página
    /// pedida saldrá vacía con `reached_end`.
    async fn fast_forward(&self, cursor: &mut StreamCursor, page: u32) -> Result<()> {
        let skip = page.saturating_sub(1) as usize * self.page_size;

        for _ in 0..skip {
            if cursor.stream.next().await?.is_none() {
                break;
            }
        }

        cursor.pages_yielded = page.saturating_sub(1);
        Ok(())
    }

    async fn park_cursor(&self, video_id: &str, cursor: StreamCursor) {
        let mut cursors = self.cursors.lock().await;
        if !cursors.contains_key(video_id) && cursors.len() >= self.capacity {
            cursors.shift_remove_index(0);
        }
        cursors.insert(video_id.to_string(), cursor);
    }

    /// Publica la página en el caché acotado, desalojando la entrada más
    /// vieja (y su lock, si nadie lo sostiene) al superar la capacidad.
    fn publish(&self, key: PageKey, page: CommentPage) {
        let mut pages = self.pages.lock();

        if pages.len() >= self.capacity {
            if let Some((evicted, _)) = pages.shift_remove_index(0) {
                self.locks
                    .remove_if(&evicted, |_, lock| Arc::strong_count(lock) == 1);
            }
        }

        pages.insert(key, page);
    }

    #[cfg(test)]
    fn cached_pages(&self) -> usize {
        self.pages.lock().len()
    }
}
