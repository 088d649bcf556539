//! Price calculation message handlers

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use sqlx::PgPool;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::auth::extract_auth;
use crate::db::queries;
use crate::services::geopricing::GeopricingEngine;
use crate::types::{
    CalculateRequest, ConvertCalculationRequest, ErrorResponse, ListRequest, ListResponse,
    Request, SuccessResponse,
};

/// Handle geopricing.calculate messages
///
/// Loads the business's active config, runs the engine, and persists the
/// audit record unless the caller opted out. A failed record write is logged
/// but does not fail the calculation: the quote is still correct, it just
/// has no `calculationId`.
pub async fn handle_calculate(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    engine: Arc<GeopricingEngine>,
    jwt_secret: String,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received calculate message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<CalculateRequest> = match serde_json::from_slice(&msg.payload) {
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

        let config = match queries::pricing_config::get_active_config(&pool, auth.business_id).await
        {
            Ok(Some(config)) => config,
            Ok(None) => {
                let error = ErrorResponse::new(
                    request.id,
                    "CONFIG_MISSING",
                    "No active pricing configuration for this business",
                );
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
            Err(e) => {
                error!("Failed to load pricing config: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let mut outcome = match engine.calculate(&config, &request.payload).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Calculation failed: {}", e);
                let error = ErrorResponse::new(request.id, e.code(), e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        if request.payload.options.persist_record {
            match queries::calculation_record::insert_record(&pool, &outcome.record).await {
                Ok(record) => outcome.response.calculation_id = Some(record.id),
                Err(e) => error!("Failed to persist calculation record: {}", e),
            }
        }

        let response = SuccessResponse::new(request.id, outcome.response);
        let _ = client.publish(reply, serde_json::to_vec(&response)?.into()).await;
    }

    Ok(())
}

/// Handle geopricing.availability.check messages: the calculate cycle
/// without pricing and without a persisted record
pub async fn handle_availability(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    engine: Arc<GeopricingEngine>,
    jwt_secret: String,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received availability.check message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<CalculateRequest> = match serde_json::from_slice(&msg.payload) {
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

        let config = match queries::pricing_config::get_active_config(&pool, auth.business_id).await
        {
            Ok(Some(config)) => config,
            Ok(None) => {
                let error = ErrorResponse::new(
                    request.id,
                    "CONFIG_MISSING",
                    "No active pricing configuration for this business",
                );
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
            Err(e) => {
                error!("Failed to load pricing config: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        match engine.check_availability(&config, &request.payload).await {
            Ok(response) => {
                let response = SuccessResponse::new(request.id, response);
                let _ = client.publish(reply, serde_json::to_vec(&response)?.into()).await;
            }
            Err(e) => {
                warn!("Availability check failed: {}", e);
                let error = ErrorResponse::new(request.id, e.code(), e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}

/// Handle geopricing.calculation.list messages
pub async fn handle_list(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: String,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received calculation.list message");

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

        match queries::calculation_record::list_records(
            &pool,
            auth.business_id,
            request.payload.limit,
            request.payload.offset,
        )
        .await
        {
            Ok((records, total)) => {
                let response = SuccessResponse::new(
                    request.id,
                    ListResponse {
                        items: records,
                        total,
                        limit: request.payload.limit,
                        offset: request.payload.offset,
                    },
                );
                let _ = client.publish(reply, serde_json::to_vec(&response)?.into()).await;
            }
            Err(e) => {
                error!("Failed to list calculation records: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}

/// Handle geopricing.calculation.convert messages: stamp a record as
/// converted to a sale
pub async fn handle_convert(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: String,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received calculation.convert message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<ConvertCalculationRequest> = match serde_json::from_slice(&msg.payload)
        {
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

        match queries::calculation_record::mark_converted(
            &pool,
            auth.business_id,
            request.payload.calculation_id,
        )
        .await
        {
            Ok(Some(record)) => {
                let response = SuccessResponse::new(request.id, record);
                let _ = client.publish(reply, serde_json::to_vec(&response)?.into()).await;
            }
            Ok(None) => {
                let error =
                    ErrorResponse::new(request.id, "NOT_FOUND", "Calculation record not found");
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
            Err(e) => {
                error!("Failed to mark calculation converted: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}
