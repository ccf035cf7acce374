//! Distance cache maintenance handler

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use tracing::{debug, warn};

use super::{parse_request, respond};
use crate::services::planner::Planner;
use crate::types::{EmptyPayload, SweepCacheResponse};

/// Handle planner.cache.sweep messages
pub async fn handle_sweep(
    client: Client,
    mut subscriber: Subscriber,
    planner: Arc<Planner>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received cache.sweep message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let Some(request) =
            parse_request::<EmptyPayload>(&client, &reply, &msg.payload).await?
        else {
            continue;
        };

        let result = planner
            .sweep_expired_cache_entries()
            .await
            .map(|deleted| SweepCacheResponse { deleted });
        respond(&client, reply, request.id, result).await?;
    }

    Ok(())
}
