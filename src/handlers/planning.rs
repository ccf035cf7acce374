//! Daily planning handler (conflicts and suggestions for one date)

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{parse_request, respond};
use crate::services::planner::Planner;
use crate::types::DateRequest;

/// Handle planner.day.run messages
pub async fn handle_day_run(
    client: Client,
    mut subscriber: Subscriber,
    planner: Arc<Planner>,
    shutdown: CancellationToken,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received day.run message");

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
            let result = planner.run_daily_planning(request.payload.date, &cancel).await;
            if let Err(e) = respond(&client, reply, request.id, result).await {
                warn!("Failed to reply to daily planning {}: {}", request.id, e);
            }
        });
    }

    Ok(())
}
