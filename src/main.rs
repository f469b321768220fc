use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod cache;
mod comments;
mod config;
mod sources;
mod store;
mod terms;
mod web;

use crate::cache::{ReqwestTransport, RequestCache};
use crate::comments::CommentPaginator;
use crate::config::Config;
use crate::sources::{ExtractionBackend, InvidiousClient};
use crate::store::InteractionStore;
use crate::web::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_tube=debug".parse()?)
                .add_directive("hyper=info".parse()?)
                .add_directive("reqwest=info".parse()?),
        )
        .init();

    info!("📺 Iniciando Open Tube v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // Historial persistente de vistas y tags
    let store = Arc::new(InteractionStore::load(&config.data_dir, config.tag_cooldown_secs).await?);

    // Caché de requests delante de todo el tráfico al backend
    let transport = Arc::new(ReqwestTransport::new(Duration::from_secs(
        config.http_timeout_secs,
    ))?);
    let http = Arc::new(RequestCache::new(transport, config.request_cache_size));

    // Backend de extracción y paginador de comentarios
    let backend: Arc<dyn ExtractionBackend> =
        Arc::new(InvidiousClient::new(http, config.invidious_instances.clone()));
    let paginator = Arc::new(CommentPaginator::new(
        backend.clone(),
        config.comment_page_size,
        config.comment_cache_size,
    ));

    let state = AppState {
        config: config.clone(),
        store,
        backend,
        comments: paginator,
    };

    let app = web::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("🌐 Servidor escuchando en {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
