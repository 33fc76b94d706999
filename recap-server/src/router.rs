use recap_core::ipc::{RecapRequest, RecapResponse};
use recap_core::StateUpdate;

use crate::context::AppContext;
use crate::subsystems::ingest;

pub async fn handle_request(request: RecapRequest, ctx: &AppContext) -> RecapResponse {
    match request {
        RecapRequest::Ping => RecapResponse::pong(),
        RecapRequest::Health => match health_status(ctx).await {
            Ok(data) => RecapResponse::ok(data),
            Err(e) => RecapResponse::err(format!("DB Health Check failed: {}", e)),
        },
        RecapRequest::RecordTurn {
            session_id,
            role,
            text,
            timestamp,
            client_turns,
            last_known_version,
        } => {
            match ingest::record_turn(
                ctx,
                &session_id,
                &role,
                &text,
                timestamp,
                client_turns,
                last_known_version,
            )
            .await
            {
                Ok(receipt) => to_ok(&receipt),
                Err(e) => RecapResponse::err(e.to_string()),
            }
        }
        RecapRequest::AssistantTurn {
            session_id,
            last_known_version,
            client_turns,
        } => {
            match ingest::signal_assistant_turn(ctx, &session_id, last_known_version, client_turns)
                .await
            {
                Ok(receipt) => to_ok(&receipt),
                Err(e) => RecapResponse::err(e.to_string()),
            }
        }
        RecapRequest::GetSummary { session_id } => match ctx.summaries.latest(&session_id).await {
            Ok(Some(row)) => to_ok(&row),
            Ok(None) => RecapResponse::not_found(format!("No summary for session {}", session_id)),
            Err(e) => RecapResponse::err(e.to_string()),
        },
        RecapRequest::GetCadence { session_id } => match ctx.tracker.state(&session_id).await {
            Ok(Some(state)) => {
                let locked = state.is_locked(ctx.tracker.now_ms());
                let mut data = serde_json::json!(state);
                if let Some(obj) = data.as_object_mut() {
                    obj.insert("locked".to_string(), serde_json::json!(locked));
                }
                RecapResponse::ok(data)
            }
            Ok(None) => {
                RecapResponse::not_found(format!("No cadence state for session {}", session_id))
            }
            Err(e) => RecapResponse::err(e.to_string()),
        },
        RecapRequest::ReleaseLock { session_id } => match ctx.tracker.release_lock(&session_id).await
        {
            Ok(StateUpdate::Applied) => {
                RecapResponse::ok(serde_json::json!({"released": true, "session_id": session_id}))
            }
            Ok(StateUpdate::NotFound) => {
                RecapResponse::not_found(format!("No cadence state for session {}", session_id))
            }
            Err(e) => RecapResponse::err(e.to_string()),
        },
    }
}

async fn health_status(ctx: &AppContext) -> Result<serde_json::Value, sqlx::Error> {
    let postgresql = match &ctx.pool {
        Some(pool) => Some(recap_core::db::health_check(pool).await?),
        None => None,
    };

    Ok(serde_json::json!({
        "status": "healthy",
        "store": ctx.store_name(),
        "postgresql": postgresql,
        "generator": ctx.generator.name(),
    }))
}

fn to_ok<T: serde::Serialize>(value: &T) -> RecapResponse {
    match serde_json::to_value(value) {
        Ok(data) => RecapResponse::ok(data),
        Err(e) => RecapResponse::err(format!("Serialization error: {}", e)),
    }
}
