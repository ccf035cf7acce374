//! NATS message handlers

pub mod cache;
pub mod conflict;
pub mod ping;
pub mod planning;
pub mod schedule;
pub mod suggestion;

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subject};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{PlannerError, PlannerResult};
use crate::services::planner::Planner;
use crate::types::{ErrorResponse, Request, SuccessResponse};

/// Parse a request envelope, answering `INVALID_REQUEST` when it is malformed
pub(crate) async fn parse_request<T: DeserializeOwned>(
    client: &Client,
    reply: &Subject,
    payload: &[u8],
) -> Result<Option<Request<T>>> {
    match serde_json::from_slice(payload) {
        Ok(request) => Ok(Some(request)),
        Err(e) => {
            warn!("Failed to parse request on {}: {}", reply, e);
            let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
            let _ = client.publish(reply.clone(), serde_json::to_vec(&error)?.into()).await;
            Ok(None)
        }
    }
}

/// Publish the outcome of a planner call as a success or error envelope
pub(crate) async fn respond<T: Serialize>(
    client: &Client,
    reply: Subject,
    request_id: Uuid,
    result: PlannerResult<T>,
) -> Result<()> {
    let bytes = match result {
        Ok(payload) => serde_json::to_vec(&SuccessResponse::new(request_id, payload))?,
        Err(e) => {
            match &e {
                PlannerError::Persistence(_) => error!("Request {} failed: {}", request_id, e),
                _ => warn!("Request {} rejected: {}", request_id, e),
            }
            serde_json::to_vec(&ErrorResponse::new(request_id, e.code(), e.to_string()))?
        }
    };
    let _ = client.publish(reply, bytes.into()).await;
    Ok(())
}

/// Subscribe to every planner subject and serve until a handler stops or `shutdown` fires
pub async fn start_handlers(
    client: Client,
    planner: Arc<Planner>,
    shutdown: CancellationToken,
) -> Result<()> {
    info!("Starting message handlers...");

    let ping_sub = client.subscribe("planner.ping").await?;
    let expand_sub = client.subscribe("planner.schedule.expand").await?;
    let conflict_run_sub = client.subscribe("planner.conflict.run").await?;
    let conflict_list_sub = client.subscribe("planner.conflict.list").await?;
    let conflict_resolve_sub = client.subscribe("planner.conflict.resolve").await?;
    let conflict_ignore_sub = client.subscribe("planner.conflict.ignore").await?;
    let suggestion_run_sub = client.subscribe("planner.suggestion.run").await?;
    let suggestion_list_sub = client.subscribe("planner.suggestion.list").await?;
    let suggestion_accept_sub = client.subscribe("planner.suggestion.accept").await?;
    let suggestion_reject_sub = client.subscribe("planner.suggestion.reject").await?;
    let day_run_sub = client.subscribe("planner.day.run").await?;
    let cache_sweep_sub = client.subscribe("planner.cache.sweep").await?;

    info!("Subscribed to NATS subjects");

    let client_ping = client.clone();
    let ping_handle = tokio::spawn(async move {
        ping::handle_ping(client_ping, ping_sub).await
    });

    let client_expand = client.clone();
    let planner_expand = Arc::clone(&planner);
    let expand_handle = tokio::spawn(async move {
        schedule::handle_expand(client_expand, expand_sub, planner_expand).await
    });

    let client_conflict_run = client.clone();
    let planner_conflict_run = Arc::clone(&planner);
    let shutdown_conflict_run = shutdown.clone();
    let conflict_run_handle = tokio::spawn(async move {
        conflict::handle_run(
            client_conflict_run,
            conflict_run_sub,
            planner_conflict_run,
            shutdown_conflict_run,
        )
        .await
    });

    let client_conflict_list = client.clone();
    let planner_conflict_list = Arc::clone(&planner);
    let conflict_list_handle = tokio::spawn(async move {
        conflict::handle_list(client_conflict_list, conflict_list_sub, planner_conflict_list).await
    });

    let client_conflict_resolve = client.clone();
    let planner_conflict_resolve = Arc::clone(&planner);
    let conflict_resolve_handle = tokio::spawn(async move {
        conflict::handle_resolve(
            client_conflict_resolve,
            conflict_resolve_sub,
            planner_conflict_resolve,
        )
        .await
    });

    let client_conflict_ignore = client.clone();
    let planner_conflict_ignore = Arc::clone(&planner);
    let conflict_ignore_handle = tokio::spawn(async move {
        conflict::handle_ignore(
            client_conflict_ignore,
            conflict_ignore_sub,
            planner_conflict_ignore,
        )
        .await
    });

    let client_suggestion_run = client.clone();
    let planner_suggestion_run = Arc::clone(&planner);
    let shutdown_suggestion_run = shutdown.clone();
    let suggestion_run_handle = tokio::spawn(async move {
        suggestion::handle_run(
            client_suggestion_run,
            suggestion_run_sub,
            planner_suggestion_run,
            shutdown_suggestion_run,
        )
        .await
    });

    let client_suggestion_list = client.clone();
    let planner_suggestion_list = Arc::clone(&planner);
    let suggestion_list_handle = tokio::spawn(async move {
        suggestion::handle_list(
            client_suggestion_list,
            suggestion_list_sub,
            planner_suggestion_list,
        )
        .await
    });

    let client_suggestion_accept = client.clone();
    let planner_suggestion_accept = Arc::clone(&planner);
    let suggestion_accept_handle = tokio::spawn(async move {
        suggestion::handle_accept(
            client_suggestion_accept,
            suggestion_accept_sub,
            planner_suggestion_accept,
        )
        .await
    });

    let client_suggestion_reject = client.clone();
    let planner_suggestion_reject = Arc::clone(&planner);
    let suggestion_reject_handle = tokio::spawn(async move {
        suggestion::handle_reject(
            client_suggestion_reject,
            suggestion_reject_sub,
            planner_suggestion_reject,
        )
        .await
    });

    let client_day_run = client.clone();
    let planner_day_run = Arc::clone(&planner);
    let shutdown_day_run = shutdown.clone();
    let day_run_handle = tokio::spawn(async move {
        planning::handle_day_run(
            client_day_run,
            day_run_sub,
            planner_day_run,
            shutdown_day_run,
        )
        .await
    });

    let client_cache_sweep = client.clone();
    let planner_cache_sweep = Arc::clone(&planner);
    let cache_sweep_handle = tokio::spawn(async move {
        cache::handle_sweep(client_cache_sweep, cache_sweep_sub, planner_cache_sweep).await
    });

    info!("All handlers started, waiting for messages...");

    select! {
        _ = shutdown.cancelled() => {
            info!("Shutdown requested, stopping handlers");
        }
        result = ping_handle => {
            error!("Ping handler finished: {:?}", result);
        }
        result = expand_handle => {
            error!("Schedule expand handler finished: {:?}", result);
        }
        result = conflict_run_handle => {
            error!("Conflict run handler finished: {:?}", result);
        }
        result = conflict_list_handle => {
            error!("Conflict list handler finished: {:?}", result);
        }
        result = conflict_resolve_handle => {
            error!("Conflict resolve handler finished: {:?}", result);
        }
        result = conflict_ignore_handle => {
            error!("Conflict ignore handler finished: {:?}", result);
        }
        result = suggestion_run_handle => {
            error!("Suggestion run handler finished: {:?}", result);
        }
        result = suggestion_list_handle => {
            error!("Suggestion list handler finished: {:?}", result);
        }
        result = suggestion_accept_handle => {
            error!("Suggestion accept handler finished: {:?}", result);
        }
        result = suggestion_reject_handle => {
            error!("Suggestion reject handler finished: {:?}", result);
        }
        result = day_run_handle => {
            error!("Daily planning handler finished: {:?}", result);
        }
        result = cache_sweep_handle => {
            error!("Cache sweep handler finished: {:?}", result);
        }
    }

    Ok(())
}
