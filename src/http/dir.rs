use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::{http::StatusCode, Json};
use serde_json::{json, Value};

use super::body::zip_stream_response;
use super::extract::{json_key, query_param};
use super::AppState;
use crate::error::AppError;
use crate::zipstream::build_zip_stream;

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let path = query_param(&params, "path")?;
    let entries = state.storage.list_dir(&path).await?;
    Ok(Json(json!({ "result": entries })))
}

pub async fn download(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let path = query_param(&params, "path")?;
    let (guard, real_path, filename) = state.storage.open_zip_source(&path).await?;
    let stream = build_zip_stream(guard, real_path).await?;
    Ok(zip_stream_response(&format!("{filename}.zip"), stream))
}

pub async fn new_dir(State(state): State<AppState>, Json(body): Json<Value>) -> Result<Response, AppError> {
    let path = json_key(&body, "path")?;
    state.storage.new_dir(&path).await?;
    Ok((StatusCode::CREATED, Json(json!({ "message": "OK" }))).into_response())
}

pub async fn copy_dir(State(state): State<AppState>, Json(body): Json<Value>) -> Result<Json<Value>, AppError> {
    let src = json_key(&body, "src")?;
    let dest = json_key(&body, "dest")?;
    state.storage.copy_dir(&src, &dest).await?;
    Ok(Json(json!({ "message": "OK" })))
}

pub async fn move_dir(State(state): State<AppState>, Json(body): Json<Value>) -> Result<Json<Value>, AppError> {
    let src = json_key(&body, "src")?;
    let dest = json_key(&body, "dest")?;
    state.storage.move_dir(&src, &dest).await?;
    Ok(Json(json!({ "message": "OK" })))
}

pub async fn remove_dir(State(state): State<AppState>, Json(body): Json<Value>) -> Result<Json<Value>, AppError> {
    let path = json_key(&body, "path")?;
    state.storage.remove_dir(&path).await?;
    Ok(Json(json!({ "message": "OK" })))
}
