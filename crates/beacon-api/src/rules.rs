use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;

use beacon_types::api::{
    DeleteReport, FeedRuleRequest, FederationRuleRequest, RuleResponse, SourceValueRef,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

type RuleList = Json<Vec<RuleResponse>>;

fn responses(rows: Vec<beacon_db::models::RuleRow>) -> RuleList {
    Json(rows.into_iter().map(RuleResponse::from).collect())
}

// -- Rules --

pub async fn list_rules(State(state): State<AppState>) -> ApiResult<RuleList> {
    Ok(responses(state.blocking(|db| db.list_rules()).await?))
}

pub async fn get_rule(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult<Json<RuleResponse>> {
    let rule = state.blocking(move |db| db.read_rule(id)).await?;
    Ok(Json(rule.into()))
}

pub async fn delete_rule(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult<StatusCode> {
    state.blocking(move |db| db.delete_rule(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_all_rules(State(state): State<AppState>) -> ApiResult<Json<DeleteReport>> {
    let deleted = state.blocking(|db| db.delete_all_rules()).await?;
    Ok(Json(DeleteReport { deleted }))
}

// -- Feed rules --

pub async fn list_feed_rules(State(state): State<AppState>) -> ApiResult<RuleList> {
    Ok(responses(state.blocking(|db| db.list_feed_rules()).await?))
}

pub async fn create_feed_rule(
    State(state): State<AppState>,
    Json(req): Json<FeedRuleRequest>,
) -> ApiResult<(StatusCode, Json<RuleResponse>)> {
    let rule = state
        .blocking(move |db| db.upsert_feed_rule(&req.element_name, &req.source_id, &req.source_value, &req.feeds))
        .await?;
    Ok((StatusCode::CREATED, Json(rule.into())))
}

pub async fn replace_rule_feeds(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(feeds): Json<Vec<SourceValueRef>>,
) -> ApiResult<Json<RuleResponse>> {
    let rule = state.blocking(move |db| db.replace_rule_feeds(id, &feeds)).await?;
    Ok(Json(rule.into()))
}

pub async fn add_rule_feed(
    State(state): State<AppState>,
    Path((id, feed_id, feed_value)): Path<(i32, String, String)>,
) -> ApiResult<Json<RuleResponse>> {
    let feed = SourceValueRef { id: feed_id, value: feed_value };
    let rule = state.blocking(move |db| db.add_rule_feed(id, &feed)).await?;
    Ok(Json(rule.into()))
}

pub async fn remove_rule_feed(
    State(state): State<AppState>,
    Path((id, feed_id, feed_value)): Path<(i32, String, String)>,
) -> ApiResult<Json<RuleResponse>> {
    let feed = SourceValueRef { id: feed_id, value: feed_value };
    let rule = state.blocking(move |db| db.remove_rule_feed(id, &feed)).await?;
    Ok(Json(rule.into()))
}

pub async fn clear_rule_feeds(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult<Json<RuleResponse>> {
    let rule = state.blocking(move |db| db.clear_rule_feeds(id)).await?;
    Ok(Json(rule.into()))
}

// -- Federation rules --

#[derive(Debug, Deserialize)]
pub struct DestinationQuery {
    pub destination: Option<String>,
}

fn check_destinations(state: &AppState, uris: &[String]) -> ApiResult<()> {
    for uri in uris {
        state.dispatcher.check_destination(uri)?;
    }
    Ok(())
}

pub async fn list_federation_rules(State(state): State<AppState>) -> ApiResult<RuleList> {
    Ok(responses(state.blocking(|db| db.list_federation_rules()).await?))
}

pub async fn create_federation_rule(
    State(state): State<AppState>,
    Json(req): Json<FederationRuleRequest>,
) -> ApiResult<(StatusCode, Json<RuleResponse>)> {
    check_destinations(&state, &req.federation_uris)?;
    let rule = state
        .blocking(move |db| {
            db.upsert_federation_rule(&req.element_name, &req.source_id, &req.source_value, &req.federation_uris)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(rule.into())))
}

/// With `?destination=` adds one URI, otherwise replaces the set with the
/// JSON array in the body.
pub async fn put_federation_rule(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(query): Query<DestinationQuery>,
    body: String,
) -> ApiResult<Json<RuleResponse>> {
    let rule = match query.destination {
        Some(uri) => {
            check_destinations(&state, std::slice::from_ref(&uri))?;
            state.blocking(move |db| db.add_federation_uri(id, &uri)).await?
        }
        None => {
            let uris: Vec<String> = serde_json::from_str(&body)
                .map_err(|e| ApiError::BadRequest(format!("expected a JSON array of URIs: {e}")))?;
            check_destinations(&state, &uris)?;
            state.blocking(move |db| db.replace_federation_uris(id, &uris)).await?
        }
    };
    Ok(Json(rule.into()))
}

pub async fn delete_federation_rule(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(query): Query<DestinationQuery>,
) -> ApiResult<Json<RuleResponse>> {
    let rule = match query.destination {
        Some(uri) => state.blocking(move |db| db.remove_federation_uri(id, &uri)).await?,
        None => state.blocking(move |db| db.clear_federation_uris(id)).await?,
    };
    Ok(Json(rule.into()))
}
