use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::terms;

/// Horizonte de la función de decaimiento: observaciones más viejas que esto
/// puntúan negativo y hunden al tag en el ranking
const DECAY_HORIZON_DAYS: i64 = 30;

/// Exponente de descuento por rango: la observación n-ésima más reciente
/// pesa 1/n^5
const RANK_EXPONENT: i32 = 5;

/// Errores del almacenamiento de historial.
///
/// Un archivo ausente NO es un error (estado inicial vacío); un archivo
/// presente pero ilegible sí lo es, y es fatal: descartar historial en
/// silencio corrompería las recomendaciones sin síntoma visible.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no se pudo acceder a {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("documento de historial corrupto en {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Historial persistente de reproducciones y afinidad de tags.
///
/// Mantiene dos documentos JSON en disco: el mapa de videos vistos
/// (`seen.json`) y el historial de tags (`tags.json`). Cada mutación
/// reescribe el documento completo en una sola operación, así un lector
/// nunca observa un archivo a medio escribir.
pub struct InteractionStore {
    seen_file: PathBuf,
    tags_file: PathBuf,
    cooldown: Duration,
    seen: RwLock<HashMap<String, DateTime<Utc>>>,
    tags: RwLock<IndexMap<String, Vec<DateTime<Utc>>>>,
}

impl InteractionStore {
    /// Carga el historial desde `data_dir`, creando el directorio si falta.
    pub async fn load(data_dir: &Path, cooldown_secs: u64) -> Result<Self, StoreError> {
        fs::create_dir_all(data_dir).await.map_err(|source| StoreError::Io {
            path: data_dir.to_path_buf(),
            source,
        })?;

        let seen_file = data_dir.join("seen.json");
        let tags_file = data_dir.join("tags.json");

        let seen: HashMap<String, DateTime<Utc>> = read_document(&seen_file).await?;
        let tags: IndexMap<String, Vec<DateTime<Utc>>> = read_document(&tags_file).await?;

        info!(
            "📂 Historial cargado: {} videos vistos, {} tags",
            seen.len(),
            tags.len()
        );

        Ok(Self {
            seen_file,
            tags_file,
            cooldown: Duration::seconds(cooldown_secs as i64),
            seen: RwLock::new(seen),
            tags: RwLock::new(tags),
        })
    }

    /// Registra una reproducción.
    ///
    /// El timestamp de visto se actualiza y persiste SIEMPRE. El historial de
    /// tags solo se actualiza si pasó más del período de enfriamiento desde
    /// la última vista del video; el timestamp previo de visto es el ancla
    /// del enfriamiento, así que sobrevive reinicios del proceso.
    pub async fn record_view(&self, video_id: &str, raw_tags: &[String]) -> Result<(), StoreError> {
        let now = Utc::now();

        let last_view = {
            let mut seen = self.seen.write().await;
            let previous = seen.insert(video_id.to_string(), now);
            write_document(&self.seen_file, &*seen).await?;
            previous.unwrap_or(DateTime::UNIX_EPOCH)
        };

        if now - last_view < self.cooldown {
            debug!("⏳ Tags ya actualizados hace poco para {}", video_id);
            return Ok(());
        }

        let cleaned = terms::clean_tags(raw_tags);
        info!("🏷️ Actualizando tags de {}: {:?}", video_id, cleaned);

        let mut tags = self.tags.write().await;
        for tag in cleaned {
            tags.entry(tag).or_default().push(now);
        }
        write_document(&self.tags_file, &*tags).await?;

        Ok(())
    }

    /// Devuelve si el video ya fue visto alguna vez
    pub async fn is_seen(&self, video_id: &str) -> bool {
        self.seen.read().await.contains_key(video_id)
    }

    /// Los `count` tags mejor puntuados por la función de decaimiento,
    /// en orden descendente. Empates se resuelven por orden de inserción.
    pub async fn recommendation_terms(&self, count: usize) -> Vec<String> {
        let now = Utc::now();
        let horizon = now - Duration::days(DECAY_HORIZON_DAYS);
        let tags = self.tags.read().await;

        let mut scored: Vec<(&String, f64)> = tags
            .iter()
            .map(|(tag, stamps)| (tag, decay_score(stamps, horizon)))
            .collect();

        // sort estable: los empates conservan el orden de inserción del mapa
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(count)
            .map(|(tag, _)| tag.clone())
            .collect()
    }

    /// Consulta de búsqueda para la página de inicio: los mejores términos
    /// unidos por espacios. Vacía si no hay historial.
    pub async fn recommendations_query(&self, count: usize) -> String {
        self.recommendation_terms(count).await.join(" ")
    }
}

/// Puntaje de un tag: suma sobre sus observaciones, más recientes primero,
/// de los segundos transcurridos desde el horizonte divididos por 1000 y
/// amortiguados por el rango de la observación.
fn decay_score(stamps: &[DateTime<Utc>], horizon: DateTime<Utc>) -> f64 {
    let mut recent: Vec<&DateTime<Utc>> = stamps.iter().collect();
    recent.sort_unstable_by(|a, b| b.cmp(a));

    recent
        .iter()
        .enumerate()
        .map(|(index, stamp)| {
            let seconds = (**stamp - horizon).num_milliseconds() as f64 / 1000.0;
            seconds / 1000.0 / ((index + 1) as f64).powi(RANK_EXPONENT)
        })
        .sum()
}

async fn read_document<T>(path: &Path) -> Result<T, StoreError>
where
    T: serde::de::DeserializeOwned + Default,
{
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_str(&raw).map_err(|source| StoreError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

async fn write_document<T: Serialize>(path: &Path, document: &T) -> Result<(), StoreError> {
    let dumped = serde_json::to_string_pretty(document).map_err(|source| StoreError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;

    fs::write(path, dumped).await.map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    const HOUR: u64 = 3600;

    fn strings(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_empty_store_has_no_recommendations() {
        let dir = tempdir().unwrap();
        let store = InteractionStore::load(dir.path(), HOUR).await.unwrap();

        assert!(store.recommendation_terms(9).await.is_empty());
        assert_eq!(store.recommendations_query(9).await, "");
    }

    #[tokio::test]
    async fn test_record_view_produces_recommendations() {
        let dir = tempdir().unwrap();
        let store = InteractionStore::load(dir.path(), HOUR).await.unwrap();

        store
            .record_view("v1", &strings(&["Cats", "Kittens"]))
            .await
            .unwrap();

        let terms = store.recommendation_terms(9).await;
        assert_eq!(terms, strings(&["cats", "kittens"]));
        assert!(store.is_seen("v1").await);
    }

    #[tokio::test]
    async fn test_cooldown_skips_tag_recording_but_not_seen() {
        let dir = tempdir().unwrap();
        let store = InteractionStore::load(dir.path(), HOUR).await.unwrap();

        store.record_view("v1", &strings(&["cats"])).await.unwrap();
        store.record_view("v1", &strings(&["cats"])).await.unwrap();

        let tags = store.tags.read().await;
        assert_eq!(tags["cats"].len(), 1);

        // la segunda vista sí actualizó el timestamp de visto
        let seen = store.seen.read().await;
        assert!(seen["v1"] >= tags["cats"][0]);
    }

    #[tokio::test]
    async fn test_zero_cooldown_records_every_view() {
        let dir = tempdir().unwrap();
        let store = InteractionStore::load(dir.path(), 0).await.unwrap();

        store.record_view("v1", &strings(&["cats"])).await.unwrap();
        store.record_view("v1", &strings(&["cats"])).await.unwrap();

        let tags = store.tags.read().await;
        assert_eq!(tags["cats"].len(), 2);
    }

    #[tokio::test]
    async fn test_state_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        {
            let store = InteractionStore::load(dir.path(), HOUR).await.unwrap();
            store
                .record_view("v1", &strings(&["cats", "kittens"]))
                .await
                .unwrap();
        }

        let reloaded = InteractionStore::load(dir.path(), HOUR).await.unwrap();
        assert!(reloaded.is_seen("v1").await);
        assert_eq!(
            reloaded.recommendation_terms(9).await,
            strings(&["cats", "kittens"])
        );
    }

    #[tokio::test]
    async fn test_corrupt_document_is_fatal() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("tags.json"), "{not json")
            .await
            .unwrap();

        let result = InteractionStore::load(dir.path(), HOUR).await;
        assert!(matches!(result, Err(StoreError::Malformed { .. })));
    }

    #[tokio::test]
    async fn test_missing_files_mean_empty_state() {
        let dir = tempdir().unwrap();
        let store = InteractionStore::load(dir.path(), HOUR).await.unwrap();

        assert!(!store.is_seen("v1").await);
        assert!(store.recommendation_terms(3).await.is_empty());
    }

    #[tokio::test]
    async fn test_more_recent_observation_scores_higher() {
        let dir = tempdir().unwrap();
        let store = InteractionStore::load(dir.path(), HOUR).await.unwrap();

        let now = Utc::now();
        {
            let mut tags = store.tags.write().await;
            tags.insert("old".to_string(), vec![now - Duration::days(10)]);
            tags.insert("fresh".to_string(), vec![now - Duration::hours(1)]);
        }

        let terms = store.recommendation_terms(2).await;
        assert_eq!(terms, strings(&["fresh", "old"]));
    }

    #[tokio::test]
    async fn test_more_observations_score_higher() {
        let dir = tempdir().unwrap();
        let store = InteractionStore::load(dir.path(), HOUR).await.unwrap();

        let stamp = Utc::now() - Duration::hours(1);
        {
            let mut tags = store.tags.write().await;
            tags.insert("once".to_string(), vec![stamp]);
            tags.insert("twice".to_string(), vec![stamp, stamp]);
        }

        let terms = store.recommendation_terms(2).await;
        assert_eq!(terms, strings(&["twice", "once"]));
    }

    #[tokio::test]
    async fn test_ties_resolve_by_insertion_order() {
        let dir = tempdir().unwrap();
        let store = InteractionStore::load(dir.path(), HOUR).await.unwrap();

        let stamp = Utc::now() - Duration::hours(1);
        {
            let mut tags = store.tags.write().await;
            tags.insert("first".to_string(), vec![stamp]);
            tags.insert("second".to_string(), vec![stamp]);
        }

        let terms = store.recommendation_terms(2).await;
        assert_eq!(terms, strings(&["first", "second"]));
    }
}
