//! Pricing configuration message handlers

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use sqlx::PgPool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::extract_auth;
use crate::db::queries;
use crate::types::{
    CreateConfigRequest, EmptyPayload, ErrorResponse, ListRequest, ListResponse, PricingPolicy,
    Request, SuccessResponse,
};

/// Handle geopricing.config.create messages
///
/// Creates the next config version for the business and deactivates the
/// previous one. Malformed policies (zone gaps, overlaps, a non-last
/// unbounded zone, empty postal codes) are rejected here rather than left
/// for the matcher to tie-break at calculation time.
pub async fn handle_create(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: String,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received config.create message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<CreateConfigRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let auth = match extract_auth(&request, &jwt_secret) {
            Ok(auth) => auth,
            Err(e) => {
                let error = ErrorResponse::new(request.id, "UNAUTHORIZED", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        if let Err(e) = request.payload.policy.validate() {
            let error = ErrorResponse::new(request.id, "VALIDATION_ERROR", e);
            let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            continue;
        }

        if matches!(request.payload.policy, PricingPolicy::TravelTimeZones { .. })
            && request.payload.origin.is_none()
        {
            let error = ErrorResponse::new(
                request.id,
                "VALIDATION_ERROR",
                "travel-time zone policies require an origin location",
            );
            let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            continue;
        }

        match queries::pricing_config::create_config(&pool, auth.business_id, &request.payload)
            .await
        {
            Ok(config) => {
                info!(
                    business_id = %auth.business_id,
                    version = config.version,
                    "Created pricing config"
                );
                let response = SuccessResponse::new(request.id, config);
                let _ = client.publish(reply, serde_json::to_vec(&response)?.into()).await;
            }
            Err(e) => {
                error!("Failed to create pricing config: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}

/// Handle geopricing.config.get messages. Returns the config currently in
/// effect for the authenticated business.
pub async fn handle_get(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: String,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received config.get message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<EmptyPayload> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let auth = match extract_auth(&request, &jwt_secret) {
            Ok(auth) => auth,
            Err(e) => {
                let error = ErrorResponse::new(request.id, "UNAUTHORIZED", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        match queries::pricing_config::get_active_config(&pool, auth.business_id).await {
            Ok(Some(config)) => {
                let response = SuccessResponse::new(request.id, config);
                let _ = client.publish(reply, serde_json::to_vec(&response)?.into()).await;
            }
            Ok(None) => {
                let error = ErrorResponse::new(
                    request.id,
                    "CONFIG_MISSING",
                    "No active pricing configuration for this business",
                );
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
            Err(e) => {
                error!("Failed to load pricing config: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}

/// Handle geopricing.config.list messages. Full version history, newest first.
pub async fn handle_list(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: String,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received config.list message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<ListRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let auth = match extract_auth(&request, &jwt_secret) {
            Ok(auth) => auth,
            Err(e) => {
                let error = ErrorResponse::new(request.id, "UNAUTHORIZED", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        match queries::pricing_config::list_configs(
            &pool,
            auth.business_id,
            request.payload.limit,
            request.payload.offset,
        )
        .await
        {
            Ok((configs, total)) => {
                let response = SuccessResponse::new(
                    request.id,
                    ListResponse {
                        items: configs,
                        total,
                        limit: request.payload.limit,
                        offset: request.payload.offset,
                    },
                );
                let _ = client.publish(reply, serde_json::to_vec(&response)?.into()).await;
            }
            Err(e) => {
                error!("Failed to list pricing configs: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}
