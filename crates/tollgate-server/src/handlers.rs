//! API route handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tracing::{debug, info};

use tollgate_core::{Blacklist, RequestLogEntry};

use crate::error::Result;
use crate::models::BlacklistBody;
use crate::state::{AppState, BLACKLIST_KEY};

/// GET /blacklist - Current blacklist.
pub async fn get_blacklist(State(state): State<AppState>) -> Json<BlacklistBody> {
    Json(BlacklistBody {
        blacklist: state.blacklist.snapshot(),
    })
}

/// POST /blacklist - Replace the whole blacklist.
pub async fn update_blacklist(
    State(state): State<AppState>,
    body: std::result::Result<Json<BlacklistBody>, JsonRejection>,
) -> Result<Json<BlacklistBody>> {
    let Json(body) = body?;
    let blacklist = Blacklist::normalize(body.blacklist);

    // The live list only changes once the store has accepted it.
    if let Some(store) = &state.store {
        store.create(BLACKLIST_KEY, serde_json::Value::from(blacklist.clone()))?;
        debug!("Blacklist persisted");
    }

    state.blacklist.replace(blacklist.clone());
    info!(patterns = blacklist.len(), "Blacklist replaced");

    Ok(Json(BlacklistBody { blacklist }))
}

/// GET /requests - Logged requests in arrival order.
pub async fn get_requests(State(state): State<AppState>) -> Json<Vec<RequestLogEntry>> {
    Json(state.request_log.snapshot())
}
