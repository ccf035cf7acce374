//! Schedule expansion handler

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use tracing::{debug, warn};

use super::{parse_request, respond};
use crate::services::planner::Planner;
use crate::types::ExpandScheduleRequest;

/// Handle planner.schedule.expand messages
pub async fn handle_expand(
    client: Client,
    mut subscriber: Subscriber,
    planner: Arc<Planner>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received schedule.expand message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let Some(request) =
            parse_request::<ExpandScheduleRequest>(&client, &reply, &msg.payload).await?
        else {
            continue;
        };

        let payload = request.payload;
        let result = planner
            .expand_schedules(payload.template_id, payload.horizon_start, payload.horizon_end)
            .await;
        respond(&client, reply, request.id, result).await?;
    }

    Ok(())
}
