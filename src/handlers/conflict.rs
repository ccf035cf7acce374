//! Conflict check handlers

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{parse_request, respond};
use crate::services::planner::Planner;
use crate::types::{DateRequest, IdRequest, ListConflictsRequest, ResolveConflictRequest};

/// Handle planner.conflict.run messages.
///
/// Each run is spawned so that a second request for a date already being
/// checked is rejected with `RUN_IN_PROGRESS` instead of waiting in line.
pub async fn handle_run(
    client: Client,
    mut subscriber: Subscriber,
    planner: Arc<Planner>,
    shutdown: CancellationToken,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received conflict.run message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let Some(request) =
            parse_request::<DateRequest>(&client, &reply, &msg.payload).await?
        else {
            continue;
        };

        let client = client.clone();
        let planner = Arc::clone(&planner);
        let cancel = shutdown.child_token();
        tokio::spawn(async move {
            let result = planner.run_conflict_check(request.payload.date, &cancel).await;
            if let Err(e) = respond(&client, reply, request.id, result).await {
                warn!("Failed to reply to conflict run {}: {}", request.id, e);
            }
        });
    }

    Ok(())
}

/// Handle planner.conflict.list messages
pub async fn handle_list(
    client: Client,
    mut subscriber: Subscriber,
    planner: Arc<Planner>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received conflict.list message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let Some(request) =
            parse_request::<ListConflictsRequest>(&client, &reply, &msg.payload).await?
        else {
            continue;
        };

        let result = planner
            .list_conflicts(request.payload.date, request.payload.status)
            .await;
        respond(&client, reply, request.id, result).await?;
    }

    Ok(())
}

/// Handle planner.conflict.resolve messages
pub async fn handle_resolve(
    client: Client,
    mut subscriber: Subscriber,
    planner: Arc<Planner>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received conflict.resolve message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let Some(request) =
            parse_request::<ResolveConflictRequest>(&client, &reply, &msg.payload).await?
        else {
            continue;
        };

        let result = planner
            .resolve_conflict(request.payload.id, request.payload.notes)
            .await;
        respond(&client, reply, request.id, result).await?;
    }

    Ok(())
}

/// Handle planner.conflict.ignore messages
pub async fn handle_ignore(
    client: Client,
    mut subscriber: Subscriber,
    planner: Arc<Planner>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received conflict.ignore message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let Some(request) = parse_request::<IdRequest>(&client, &reply, &msg.payload).await? else {
            continue;
        };

        let result = planner.ignore_conflict(request.payload.id).await;
        respond(&client, reply, request.id, result).await?;
    }

    Ok(())
}
