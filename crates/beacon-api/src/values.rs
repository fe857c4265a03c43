use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use beacon_db::models::SourceValueRow;
use beacon_types::api::{
    DeleteReport, SourceValueListRequest, SourceValueListResponse, SourceValueRequest,
    SourceValueResponse,
};

use crate::error::ApiResult;
use crate::state::AppState;

fn list_response(rows: Vec<SourceValueRow>) -> SourceValueListResponse {
    let (id, source_id) = rows
        .first()
        .map(|r| (r.list_id, r.source_id.clone()))
        .unwrap_or_default();
    SourceValueListResponse {
        id,
        source_id,
        values: rows.into_iter().map(SourceValueResponse::from).collect(),
    }
}

pub async fn create_list(
    State(state): State<AppState>,
    Json(req): Json<SourceValueListRequest>,
) -> ApiResult<(StatusCode, Json<SourceValueListResponse>)> {
    let rows = state.blocking(move |db| db.create_value_list(&req.id, &req.values)).await?;
    Ok((StatusCode::CREATED, Json(list_response(rows))))
}

pub async fn get_list(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult<Json<SourceValueListResponse>> {
    let rows = state.blocking(move |db| db.read_value_list(id)).await?;
    Ok(Json(list_response(rows)))
}

pub async fn delete_list(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult<Json<DeleteReport>> {
    let deleted = state.blocking(move |db| db.delete_value_list(id)).await?;
    Ok(Json(DeleteReport { deleted }))
}

pub async fn create_value(
    State(state): State<AppState>,
    Json(req): Json<SourceValueRequest>,
) -> ApiResult<(StatusCode, Json<SourceValueResponse>)> {
    let row = state.blocking(move |db| db.create_value(&req.id, &req.value)).await?;
    Ok((StatusCode::CREATED, Json(row.into())))
}

pub async fn get_value(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult<Json<SourceValueResponse>> {
    Ok(Json(state.blocking(move |db| db.read_value(id)).await?.into()))
}

pub async fn delete_value(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult<StatusCode> {
    state.blocking(move |db| db.delete_value(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_values(State(state): State<AppState>) -> ApiResult<Json<Vec<SourceValueResponse>>> {
    let rows = state.blocking(|db| db.list_values()).await?;
    Ok(Json(rows.into_iter().map(SourceValueResponse::from).collect()))
}

pub async fn delete_all_values(State(state): State<AppState>) -> ApiResult<Json<DeleteReport>> {
    let deleted = state.blocking(|db| db.delete_all_values()).await?;
    Ok(Json(DeleteReport { deleted }))
}
