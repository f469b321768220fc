use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::debug;

/// Request saliente hacia el backend, en forma canónica
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: String,
    pub url: String,
    pub body: Option<Bytes>,
    pub headers: Vec<(String, String)>,
}

impl OutboundRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            body: None,
            headers: Vec::new(),
        }
    }

    #[allow(dead_code)]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Clave de caché: método, URL, cuerpo y headers serializados en orden
    /// estable, para que dos requests equivalentes colisionen siempre.
    fn cache_key(&self) -> RequestKey {
        let mut headers = self.headers.clone();
        headers.sort();

        RequestKey {
            method: self.method.clone(),
            url: self.url.clone(),
            body: self.body.clone(),
            headers_json: serde_json::to_string(&headers).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RequestKey {
    method: String,
    url: String,
    body: Option<Bytes>,
    headers_json: String,
}

/// Respuesta almacenada en caché.
///
/// El cuerpo es un buffer completo y clonable (`Bytes`), no un stream de
/// consumo único: cada lector recibe el contenido íntegro desde el inicio.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transporte HTTP real, inyectable para poder contarlo o falsearlo en tests
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &OutboundRequest) -> Result<CachedResponse>;
}

/// Transporte de producción sobre `reqwest`
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .context("no se pudo crear el cliente HTTP")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<CachedResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .with_context(|| format!("método HTTP inválido: {}", request.method))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        // un status de error se propaga como fallo y nunca entra al caché
        let response = builder.send().await?.error_for_status()?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        Ok(CachedResponse { status, body })
    }
}

/// Caché acotado de requests salientes.
///
/// Intercepta cada llamada de red del backend de extracción: un hit devuelve
/// la respuesta guardada sin tocar la red, un miss ejecuta la llamada real y
/// la almacena. Al superar la capacidad se descarta la entrada insertada hace
/// más tiempo, sin promover entradas por lectura.
pub struct RequestCache {
    transport: Arc<dyn HttpTransport>,
    entries: Mutex<IndexMap<RequestKey, CachedResponse>>,
    capacity: usize,
}

impl RequestCache {
    pub fn new(transport: Arc<dyn HttpTransport>, capacity: usize) -> Self {
        Self {
            transport,
            entries: Mutex::new(IndexMap::new()),
            capacity,
        }
    }

    /// Ejecuta el request a través del caché.
    ///
    /// Dos llamadas concurrentes sobre la misma clave fría pueden duplicar la
    /// llamada de red; gana la última escritura. Los errores de transporte se
    /// propagan y nunca se almacenan.
    pub async fn execute(&self, request: &OutboundRequest) -> Result<CachedResponse> {
        let key = request.cache_key();

        if let Some(hit) = self.entries.lock().get(&key).cloned() {
            debug!("✅ Cache hit: {} {}", request.method, request.url);
            return Ok(hit);
        }

        debug!("❌ Cache miss: {} {}", request.method, request.url);
        let response = self.transport.send(request).await?;

        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.shift_remove_index(0);
        }
        entries.insert(key, response.clone());

        Ok(response)
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
