use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use beacon_types::api::{CreateFeedRequest, DeleteReport, FeedResponse, ViewRow};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn list_feeds(State(state): State<AppState>) -> ApiResult<Json<Vec<FeedResponse>>> {
    let rows = state.blocking(|db| db.list_feeds()).await?;
    Ok(Json(rows.into_iter().map(FeedResponse::from).collect()))
}

pub async fn get_feed(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult<Json<FeedResponse>> {
    Ok(Json(state.blocking(move |db| db.read_feed(id)).await?.into()))
}

pub async fn get_feed_by_view(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<FeedResponse>> {
    Ok(Json(state.blocking(move |db| db.feed_by_view_name(&name)).await?.into()))
}

pub async fn create_feed(
    State(state): State<AppState>,
    Json(req): Json<CreateFeedRequest>,
) -> ApiResult<(StatusCode, Json<FeedResponse>)> {
    let feed = state
        .blocking(move |db| {
            db.create_feed(
                req.id,
                req.source_id.as_deref(),
                req.source_value.as_deref(),
                req.view_name.as_deref(),
            )
        })
        .await?;
    Ok((StatusCode::CREATED, Json(feed.into())))
}

pub async fn delete_feed(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult<StatusCode> {
    state.blocking(move |db| db.delete_feed(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_all_feeds(State(state): State<AppState>) -> ApiResult<Json<DeleteReport>> {
    if !state.allow_delete_all {
        return Err(ApiError::BadRequest("bulk delete is disabled".into()));
    }
    let deleted = state.blocking(|db| db.delete_all_feeds()).await?;
    Ok(Json(DeleteReport { deleted }))
}

// -- View content --

pub async fn all_content(State(state): State<AppState>) -> ApiResult<Json<Vec<ViewRow>>> {
    Ok(Json(state.blocking(|db| db.view_content(None)).await?))
}

pub async fn view_content(
    State(state): State<AppState>,
    Path(view): Path<String>,
) -> ApiResult<Json<Vec<ViewRow>>> {
    Ok(Json(state.blocking(move |db| db.view_content(Some(&view))).await?))
}
