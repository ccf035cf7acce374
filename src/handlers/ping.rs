//! Ping handler for health checks

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use tracing::{debug, error};

use super::parse_request;
use crate::types::{EmptyPayload, PongResponse, SuccessResponse};

/// Handle planner.ping messages
pub async fn handle_ping(client: Client, mut subscriber: Subscriber) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received ping message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                error!("Ping message without reply subject");
                continue;
            }
        };

        let Some(request) =
            parse_request::<EmptyPayload>(&client, &reply, &msg.payload).await?
        else {
            continue;
        };

        let response = SuccessResponse::new(
            request.id,
            PongResponse {
                pong: true,
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        );
        client.publish(reply, serde_json::to_vec(&response)?.into()).await?;

        debug!("Sent pong response");
    }

    Ok(())
}
