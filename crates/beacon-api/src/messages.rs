use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::{debug, warn};

use beacon_content::{parse_envelope, prepare_message, reposition};
use beacon_db::UpsertOutcome;
use beacon_federation::federate;
use beacon_types::api::{
    DeleteReport, MessageRecord, MessageSummary, PositionUpdate, ReturnType, SearchQuery,
    SearchResults,
};
use beacon_types::models::{DistributionElement, DistributionType};

use crate::error::{ApiError, ApiResult};
use crate::middleware::{ClientAddr, RequestHost};
use crate::state::AppState;

fn summary(de: &DistributionElement) -> MessageSummary {
    MessageSummary {
        id: de.message_id(),
        distribution_id: de.distribution_id.clone(),
        sender_id: de.sender_id.clone(),
        sent_at: de.sent_at,
    }
}

fn created(de: &DistributionElement) -> Response {
    let location = format!("/api/de/{}", de.message_id());
    (StatusCode::CREATED, [(header::LOCATION, location)], Json(summary(de))).into_response()
}

/// Writes the audit record. Failures are logged and never fail the request.
async fn archive(state: &AppState, de: &DistributionElement, body: &str, client: &str) {
    if !state.archive_enabled {
        return;
    }
    let st = state.clone();
    let (de, body, client) = (de.clone(), body.to_string(), client.to_string());
    let result = tokio::task::spawn_blocking(move || {
        st.db.append_archive(&de, &body, &client, Utc::now())
    })
    .await;
    match result {
        Ok(Ok(seq)) => debug!(seq, "archived"),
        Ok(Err(e)) => warn!("archive write failed: {e}"),
        Err(e) => warn!("archive task failed: {e}"),
    }
}

/// Archives and federates a message whose write has committed.
async fn after_commit(
    state: &AppState,
    de: DistributionElement,
    body: &str,
    client: &str,
    host: Option<&str>,
) -> ApiResult<()> {
    if let Some(host) = host {
        state.dispatcher.add_self_authority(host);
    }
    archive(state, &de, body, client).await;
    federate(state.db.clone(), &state.dispatcher, de, body).await?;
    Ok(())
}

async fn store(state: &AppState, de: DistributionElement, body: String, create_only: bool) -> ApiResult<UpsertOutcome> {
    let st = state.clone();
    tokio::task::spawn_blocking(move || -> ApiResult<UpsertOutcome> {
        let prepared = prepare_message(de, body, &st.extractor)?;
        if create_only {
            st.db.create_message(&prepared)?;
            Ok(UpsertOutcome::Created)
        } else {
            Ok(st.db.upsert_message(&prepared)?)
        }
    })
    .await?
}

/// `POST /api/de`: ingests a message according to its distribution type.
pub async fn ingest(
    State(state): State<AppState>,
    ClientAddr(client): ClientAddr,
    RequestHost(host): RequestHost,
    body: String,
) -> ApiResult<Response> {
    let de = parse_envelope(&body)?;
    let id = de.message_id();

    let response = match &de.distribution_type {
        DistributionType::Report => {
            store(&state, de.clone(), body.clone(), true).await?;
            created(&de)
        }
        DistributionType::Update => match store(&state, de.clone(), body.clone(), false).await? {
            UpsertOutcome::Created => created(&de),
            UpsertOutcome::Updated => (StatusCode::OK, Json(summary(&de))).into_response(),
        },
        DistributionType::Cancel => {
            state.blocking(move |db| db.cancel_message(id, Utc::now())).await?;
            (StatusCode::OK, Json(summary(&de))).into_response()
        }
        DistributionType::Other(kind) => {
            return Err(ApiError::BadRequest(format!("unsupported distribution type {kind:?}")));
        }
    };

    after_commit(&state, de, &body, &client, host.as_deref()).await?;
    Ok(response)
}

/// `PUT /api/de/{id}`: creates or replaces the message stored under `id`.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    ClientAddr(client): ClientAddr,
    RequestHost(host): RequestHost,
    body: String,
) -> ApiResult<Response> {
    let de = parse_envelope(&body)?;
    if de.message_id() != id {
        return Err(ApiError::BadRequest(format!(
            "message id {} does not match path id {id}",
            de.message_id()
        )));
    }

    let response = match store(&state, de.clone(), body.clone(), false).await? {
        UpsertOutcome::Created => created(&de),
        UpsertOutcome::Updated => (StatusCode::OK, Json(summary(&de))).into_response(),
    };
    after_commit(&state, de, &body, &client, host.as_deref()).await?;
    Ok(response)
}

/// `PUT /api/de/position/{id}`
pub async fn update_position(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    ClientAddr(client): ClientAddr,
    RequestHost(host): RequestHost,
    Json(update): Json<PositionUpdate>,
) -> ApiResult<Json<MessageSummary>> {
    if update.lookup_id.is_some_and(|lookup| lookup != id) {
        return Err(ApiError::BadRequest(format!("lookup id does not match path id {id}")));
    }

    let st = state.clone();
    let prepared = tokio::task::spawn_blocking(move || {
        st.db.update_position(id, |body| {
            reposition(body, &update, &st.extractor).map_err(ApiError::from)
        })
    })
    .await??;

    let response = Json(summary(&prepared.envelope));
    after_commit(&state, prepared.envelope, &prepared.body, &client, host.as_deref()).await?;
    Ok(response)
}

pub async fn get_message(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult<Response> {
    let row = state.blocking(move |db| db.read_message(id)).await?;
    Ok(([(header::CONTENT_TYPE, "text/xml; charset=utf-8")], row.body).into_response())
}

pub async fn list_messages(State(state): State<AppState>) -> ApiResult<Json<Vec<MessageSummary>>> {
    let rows = state.blocking(|db| db.list_messages()).await?;
    if rows.is_empty() {
        return Err(ApiError::NotFound("no messages cached".into()));
    }
    Ok(Json(rows.iter().map(MessageSummary::from).collect()))
}

pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<SearchResults>> {
    let from = query
        .from
        .ok_or_else(|| ApiError::BadRequest("`from` is required".into()))?;
    let to = query.to;
    let rows = state.blocking(move |db| db.search_messages(from, to, Utc::now())).await?;

    Ok(Json(match query.return_type {
        ReturnType::Lite => SearchResults::Lite(rows.iter().map(MessageSummary::from).collect()),
        ReturnType::Full => SearchResults::Full(rows.into_iter().map(MessageRecord::from).collect()),
    }))
}

pub async fn delete_message(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult<StatusCode> {
    if state.blocking(move |db| db.delete_message(id)).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("message {id}")))
    }
}

pub async fn delete_all_messages(State(state): State<AppState>) -> ApiResult<Json<DeleteReport>> {
    if !state.allow_delete_all {
        return Err(ApiError::BadRequest("bulk delete is disabled".into()));
    }
    let deleted = state.blocking(|db| db.delete_all_messages()).await?;
    Ok(Json(DeleteReport { deleted }))
}
