//! Smart suggestion handlers

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{parse_request, respond};
use crate::services::planner::Planner;
use crate::types::{DateRequest, IdRequest, ListSuggestionsRequest, SuggestionStatus};

/// Handle planner.suggestion.run messages (spawned per request, like conflict runs)
pub async fn handle_run(
    client: Client,
    mut subscriber: Subscriber,
    planner: Arc<Planner>,
    shutdown: CancellationToken,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received suggestion.run message");

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
            let result = planner.run_suggestion_generation(request.payload.date, &cancel).await;
            if let Err(e) = respond(&client, reply, request.id, result).await {
                warn!("Failed to reply to suggestion run {}: {}", request.id, e);
            }
        });
    }

    Ok(())
}

/// Handle planner.suggestion.list messages
pub async fn handle_list(
    client: Client,
    mut subscriber: Subscriber,
    planner: Arc<Planner>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received suggestion.list message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let Some(request) =
            parse_request::<ListSuggestionsRequest>(&client, &reply, &msg.payload).await?
        else {
            continue;
        };

        let result = planner
            .list_suggestions(request.payload.date, request.payload.status)
            .await;
        respond(&client, reply, request.id, result).await?;
    }

    Ok(())
}

/// Handle planner.suggestion.accept messages
pub async fn handle_accept(
    client: Client,
    subscriber: Subscriber,
    planner: Arc<Planner>,
) -> Result<()> {
    handle_decision(client, subscriber, planner, SuggestionStatus::Accepted).await
}

/// Handle planner.suggestion.reject messages
pub async fn handle_reject(
    client: Client,
    subscriber: Subscriber,
    planner: Arc<Planner>,
) -> Result<()> {
    handle_decision(client, subscriber, planner, SuggestionStatus::Rejected).await
}

async fn handle_decision(
    client: Client,
    mut subscriber: Subscriber,
    planner: Arc<Planner>,
    decision: SuggestionStatus,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received suggestion {} message", decision.as_str());

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

        let result = match decision {
            SuggestionStatus::Accepted => planner.accept_suggestion(request.payload.id).await,
            _ => planner.reject_suggestion(request.payload.id).await,
        };
        respond(&client, reply, request.id, result).await?;
    }

    Ok(())
}
