//! Workspace routes: editor buffer, virtual file tree, classification, edit mode.

use super::error_response;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use preview_core::{
    classify, is_synthesis_candidate, normalize_path, ElementContext, ElementPatch, PreviewError,
    VirtualFileTree, MAX_FIELD_LEN,
};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
pub(crate) struct SourceUpdate {
    content: String,
    /// Write to the tree now instead of waiting for edits to settle.
    #[serde(default)]
    flush: bool,
}

pub(crate) async fn get_source(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.sync.document())
}

pub(crate) async fn put_source(State(state): State<AppState>, Json(update): Json<SourceUpdate>) -> impl IntoResponse {
    state.sync.edit_buffer(update.content);
    if update.flush {
        state.sync.flush_to_tree();
    }
    Json(state.sync.document())
}

pub(crate) async fn list_files(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "files": state.files.paths() }))
}

pub(crate) async fn get_file(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    let Some(path) = checked_path(&path) else {
        return error_response(StatusCode::BAD_REQUEST, "invalid file path");
    };
    match state.files.read(&path) {
        Some(content) => content.into_response(),
        None => error_response(StatusCode::NOT_FOUND, &format!("no such file: {}", path)),
    }
}

pub(crate) async fn put_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
    body: String,
) -> Response {
    let Some(path) = checked_path(&path) else {
        return error_response(StatusCode::BAD_REQUEST, "invalid file path");
    };
    state.files.write(&path, &body);
    tracing::debug!(target: "preview::gateway", path = %path, bytes = body.len(), "file written");
    Json(json!({ "status": "ok", "path": path })).into_response()
}

/// Normalized tree path, or `None` for empty, oversized or parent-relative paths.
fn checked_path(raw: &str) -> Option<String> {
    let path = normalize_path(raw);
    if path.is_empty() || path.len() > MAX_FIELD_LEN || path.split('/').any(|seg| seg == ".." || seg.is_empty()) {
        return None;
    }
    Some(path)
}

#[derive(Deserialize)]
pub(crate) struct ClassifyRequest {
    label: String,
    #[serde(default)]
    context: Option<ElementContext>,
}

pub(crate) async fn classify_label(Json(req): Json<ClassifyRequest>) -> Response {
    if req.label.len() > MAX_FIELD_LEN {
        return error_response(StatusCode::BAD_REQUEST, "label too long");
    }
    let result = classify(&req.label, req.context.as_ref());
    let synthesize = is_synthesis_candidate(&result);
    Json(json!({ "result": result, "synthesize": synthesize })).into_response()
}

#[derive(Deserialize)]
pub(crate) struct EditModeRequest {
    enabled: bool,
}

pub(crate) async fn set_edit_mode(State(state): State<AppState>, Json(req): Json<EditModeRequest>) -> Response {
    match state.surface.set_edit_mode(req.enabled).await {
        Ok(()) => Json(json!({ "status": "ok", "editMode": req.enabled })).into_response(),
        Err(e) => preview_error(e),
    }
}

#[derive(Deserialize)]
pub(crate) struct UpdateElementRequest {
    selector: String,
    patch: ElementPatch,
}

pub(crate) async fn update_element(
    State(state): State<AppState>,
    Json(req): Json<UpdateElementRequest>,
) -> Response {
    match state.surface.update_element(&req.selector, req.patch).await {
        Ok(()) => Json(json!({ "status": "ok", "selector": req.selector })).into_response(),
        Err(e) => preview_error(e),
    }
}

/// Evicts every generated page; the next navigation regenerates on demand.
pub(crate) async fn clear_pages(State(state): State<AppState>) -> impl IntoResponse {
    let evicted = state.synthesizer.len();
    state.synthesizer.clear();
    tracing::info!(target: "preview::gateway", evicted, "generated pages cleared");
    Json(json!({ "status": "ok", "evicted": evicted }))
}

fn preview_error(e: PreviewError) -> Response {
    let status = match &e {
        PreviewError::InvalidSelector(_) | PreviewError::InvalidPatch(_) => StatusCode::BAD_REQUEST,
        PreviewError::SurfaceClosed => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, &e.to_string())
}
