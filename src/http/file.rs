use std::collections::HashMap;

use axum::extract::{Multipart, Query, State};
use axum::response::{IntoResponse, Response};
use axum::{http::StatusCode, Json};
use serde_json::{json, Value};

use super::body::file_stream_response;
use super::extract::{json_key, query_param};
use super::AppState;
use crate::error::{AppError, RequestError};

fn guess_content_type(path: &std::path::Path) -> Option<String> {
    mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string())
}

pub async fn view(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let path = query_param(&params, "path")?;
    let (guard, file, real_path) = state.storage.open_read_stream(&path).await?;
    let filename = file_name(&real_path);

    let (content_type, disposition) = match guess_content_type(&real_path) {
        Some(mime) => (mime, "inline"),
        None => ("application/octet-stream".to_string(), "attachment"),
    };

    Ok(file_stream_response(content_type, disposition, &filename, guard, file))
}

pub async fn download(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let path = query_param(&params, "path")?;
    let (guard, file, real_path) = state.storage.open_read_stream(&path).await?;
    let filename = file_name(&real_path);
    let content_type =
        guess_content_type(&real_path).unwrap_or_else(|| "application/octet-stream".to_string());

    Ok(file_stream_response(content_type, "attachment", &filename, guard, file))
}

pub async fn new_file(State(state): State<AppState>, Json(body): Json<Value>) -> Result<Response, AppError> {
    let path = json_key(&body, "path")?;
    state.storage.new_file(&path).await?;
    Ok((StatusCode::CREATED, Json(json!({ "message": "OK" }))).into_response())
}

pub async fn copy_file(State(state): State<AppState>, Json(body): Json<Value>) -> Result<Json<Value>, AppError> {
    let src = json_key(&body, "src")?;
    let dest = json_key(&body, "dest")?;
    state.storage.copy_file(&src, &dest).await?;
    Ok(Json(json!({ "message": "OK" })))
}

pub async fn move_file(State(state): State<AppState>, Json(body): Json<Value>) -> Result<Json<Value>, AppError> {
    let src = json_key(&body, "src")?;
    let dest = json_key(&body, "dest")?;
    state.storage.move_file(&src, &dest).await?;
    Ok(Json(json!({ "message": "OK" })))
}

pub async fn remove_file(State(state): State<AppState>, Json(body): Json<Value>) -> Result<Json<Value>, AppError> {
    let path = json_key(&body, "path")?;
    state.storage.remove_file(&path).await?;
    Ok(Json(json!({ "message": "OK" })))
}

/// Multipart upload: a `path` text field followed by a `data` byte field,
/// matching the original `retrieve_bpr` helper's expected field order.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let path_field = multipart
        .next_field()
        .await
        .map_err(|e| AppError::internal("axum::extract::multipart::MultipartError", e))?
        .ok_or_else(|| RequestError::MissingMultipart("path".to_string()))?;
    if path_field.name() != Some("path") {
        return Err(RequestError::InvalidMultipart("path".to_string()).into());
    }
    let path = path_field
        .text()
        .await
        .map_err(|e| AppError::internal("axum::extract::multipart::MultipartError", e))?;

    let data_field = multipart
        .next_field()
        .await
        .map_err(|e| AppError::internal("axum::extract::multipart::MultipartError", e))?
        .ok_or_else(|| RequestError::MissingMultipart("data".to_string()))?;
    if data_field.name() != Some("data") {
        return Err(RequestError::InvalidMultipart("data".to_string()).into());
    }

    state.storage.save_multipart_file(&path, data_field).await?;
    Ok((StatusCode::CREATED, Json(json!({ "message": "OK" }))).into_response())
}
