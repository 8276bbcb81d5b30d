//! HTTP handlers exposing the minion's `AtomicState`/`ChunkCache` over
//! loopback HTTP — the client-facing IPC surface `vault-ctl` talks to.

use std::sync::Arc;

use axum::body::Bytes as AxumBytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use vault_core::error::VaultError;
use vault_core::key::Key;
use vault_core::resource::MemResource;
use vault_services::cache_db::PersistentCacheDB;
use vault_services::chunk_cache::ChunkCache;
use vault_services::chunk_service::{ChunkService, LocalBlobStore};
use vault_services::directory::FileMetadata;
use vault_services::tag_service::TagService;
use vault_services::{push_pull, AtomicState};

#[derive(Clone)]
pub struct ApiState {
    pub atomic: Arc<AtomicState<PersistentCacheDB, LocalBlobStore>>,
    pub cache: Arc<ChunkCache<PersistentCacheDB, LocalBlobStore>>,
    pub backend: Arc<LocalBlobStore>,
    pub tags: Arc<TagService>,
}

fn api_error(err: VaultError) -> Response {
    let status = match err {
        VaultError::NoSuchPath(_) | VaultError::NoSuchTag(_) | VaultError::ChunkMissing(_) => {
            StatusCode::NOT_FOUND
        }
        VaultError::AlreadyExists(_) => StatusCode::CONFLICT,
        VaultError::NotADirectory(_) | VaultError::IsADirectory(_) | VaultError::InvalidKey(_) => {
            StatusCode::BAD_REQUEST
        }
        VaultError::AuthFailure => StatusCode::UNAUTHORIZED,
        VaultError::IoError(_) | VaultError::Corruption(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string()).into_response()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileMetadataDto {
    pub is_directory: bool,
    pub key: String,
    pub size: u64,
    pub total_size: u64,
    pub creation_time: u64,
}

impl From<FileMetadata> for FileMetadataDto {
    fn from(m: FileMetadata) -> Self {
        Self {
            is_directory: m.is_directory(),
            key: m.key.to_base64(),
            size: m.size,
            total_size: m.total_size,
            creation_time: m.creation_time,
        }
    }
}

/// The root path's synthetic stat result: an all-zero key, `is_dir`,
/// zero size.
fn synthetic_root_metadata() -> FileMetadataDto {
    FileMetadataDto {
        is_directory: true,
        key: Key::from_bytes(&[0u8; 32]).unwrap().to_base64(),
        size: 0,
        total_size: 0,
        creation_time: 0,
    }
}

fn parse_key(b64: &str) -> Result<Key, Response> {
    Key::from_base64(b64).map_err(api_error)
}

// ── Roots ─────────────────────────────────────────────────────────────────────

pub async fn list_roots(State(state): State<ApiState>) -> Response {
    match state.tags.get_all().await {
        Ok(entries) => {
            let dto: Vec<(String, String)> =
                entries.into_iter().map(|(name, key)| (name, key.to_base64())).collect();
            Json(dto).into_response()
        }
        Err(e) => api_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct MkdirRequest {
    #[serde(default)]
    pub path: Vec<String>,
    pub name: String,
}

pub async fn mkdir(
    State(state): State<ApiState>,
    Path(label): Path<String>,
    Json(req): Json<MkdirRequest>,
) -> Response {
    match state.atomic.mkdir(&label, &req.path, &req.name).await {
        Ok(new_root) => publish_and_respond(&state, &label, new_root).await,
        Err(e) => api_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct LinkRequest {
    #[serde(default)]
    pub path: Vec<String>,
    pub name: String,
    pub key: String,
    pub size: u64,
}

pub async fn link(
    State(state): State<ApiState>,
    Path(label): Path<String>,
    Json(req): Json<LinkRequest>,
) -> Response {
    let key = match parse_key(&req.key) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    match state.atomic.link(&label, &req.path, &req.name, key, req.size).await {
        Ok(new_root) => publish_and_respond(&state, &label, new_root).await,
        Err(e) => api_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct UnlinkRequest {
    #[serde(default)]
    pub path: Vec<String>,
    pub name: String,
}

pub async fn unlink(
    State(state): State<ApiState>,
    Path(label): Path<String>,
    Json(req): Json<UnlinkRequest>,
) -> Response {
    match state.atomic.unlink(&label, &req.path, &req.name).await {
        Ok(new_root) => publish_and_respond(&state, &label, new_root).await,
        Err(e) => api_error(e),
    }
}

async fn publish_and_respond(state: &ApiState, label: &str, new_root: Key) -> Response {
    if let Err(e) = state.tags.set(label, Some(new_root)).await {
        tracing::warn!(label, error = %e, "local mutation committed but root-service publish failed");
    }
    Json(serde_json::json!({ "root": new_root.to_base64() })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub name: String,
}

fn split_path(path: &str) -> Vec<String> {
    path.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect()
}

pub async fn stat(
    State(state): State<ApiState>,
    Path(label): Path<String>,
    Query(q): Query<PathQuery>,
) -> Response {
    let path = split_path(&q.path);
    if path.is_empty() && q.name.is_empty() {
        return Json(synthetic_root_metadata()).into_response();
    }
    match state.atomic.stat(&label, &path, &q.name).await {
        Ok(meta) => Json(FileMetadataDto::from(meta)).into_response(),
        Err(e) => api_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub path: String,
}

pub async fn list(
    State(state): State<ApiState>,
    Path(label): Path<String>,
    Query(q): Query<ListQuery>,
) -> Response {
    let path = split_path(&q.path);
    match state.atomic.list(&label, &path).await {
        Ok(entries) => {
            let dto: Vec<(String, FileMetadataDto)> =
                entries.into_iter().map(|(name, meta)| (name, meta.into())).collect();
            Json(dto).into_response()
        }
        Err(e) => api_error(e),
    }
}

pub async fn push_root(State(state): State<ApiState>, Path(label): Path<String>) -> Response {
    let root = state.atomic.get_root(&label).await;
    let cache = state.cache.clone();
    let backend = state.backend.clone();
    let result = tokio::task::spawn_blocking(move || {
        push_pull::push(root, cache.as_ref() as &dyn ChunkService, backend.as_ref() as &dyn ChunkService)
    })
    .await;

    match result {
        Ok(Ok(stats)) => Json(serde_json::json!({
            "transferred": stats.transferred,
            "already_present": stats.already_present,
        }))
        .into_response(),
        Ok(Err(e)) => api_error(e),
        Err(e) => api_error(VaultError::Corruption(e.to_string())),
    }
}

pub async fn pull_root(State(state): State<ApiState>, Path(label): Path<String>) -> Response {
    let remote_root = match state.tags.get(&label).await {
        Ok(Some(key)) => key,
        Ok(None) => return api_error(VaultError::NoSuchTag(label)),
        Err(e) => return api_error(e),
    };

    let cache = state.cache.clone();
    let backend = state.backend.clone();
    let result = tokio::task::spawn_blocking(move || {
        push_pull::pull(remote_root, backend.as_ref() as &dyn ChunkService, cache.as_ref() as &dyn ChunkService)
    })
    .await;

    match result {
        Ok(Ok(stats)) => {
            state.atomic.register_root(&label, remote_root).await;
            Json(serde_json::json!({
                "root": remote_root.to_base64(),
                "transferred": stats.transferred,
                "already_present": stats.already_present,
            }))
            .into_response()
        }
        Ok(Err(e)) => api_error(e),
        Err(e) => api_error(VaultError::Corruption(e.to_string())),
    }
}

// ── Chunks ────────────────────────────────────────────────────────────────────

pub async fn get_chunk(State(state): State<ApiState>, Path(b64): Path<String>) -> Response {
    let key = match parse_key(&b64) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let cache = state.cache.clone();
    let result = tokio::task::spawn_blocking(move || cache.get(&key).and_then(|r| Ok(r.as_bytes()?))).await;

    match result {
        Ok(Ok(bytes)) => (StatusCode::OK, bytes.to_vec()).into_response(),
        Ok(Err(e)) => api_error(e),
        Err(e) => api_error(VaultError::Corruption(e.to_string())),
    }
}

pub async fn put_chunk(State(state): State<ApiState>, body: AxumBytes) -> Response {
    let data = body.to_vec();
    let key = Key::of(&data);
    let size = data.len() as u64;
    let cache = state.cache.clone();

    let result =
        tokio::task::spawn_blocking(move || cache.put_local(&key, Arc::new(MemResource::new(data)))).await;

    match result {
        Ok(Ok(())) => Json(serde_json::json!({ "key": key.to_base64(), "size": size })).into_response(),
        Ok(Err(e)) => api_error(e),
        Err(e) => api_error(VaultError::Corruption(e.to_string())),
    }
}
