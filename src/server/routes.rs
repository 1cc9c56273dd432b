use crate::db;
use crate::state::{AppState, EngineSnapshot};
use axum::extract::{Query, State};
use axum::response::Json;
use std::sync::Arc;

#[derive(serde::Deserialize)]
pub struct HistoryQuery {
    pub instrument: Option<String>,
    pub expiry: Option<String>,
    pub limit: Option<usize>,
}

#[derive(serde::Deserialize)]
pub struct InstrumentQuery {
    pub instrument: String,
    pub limit: Option<usize>,
}

/// GET /api/state -- current engine snapshot (from watch channel, no lock)
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<EngineSnapshot> {
    let snapshot = state.snapshot_rx.borrow().clone();
    Json(snapshot)
}

/// GET /api/history -- persisted max-pain rows, optionally filtered by
/// instrument and/or expiry date (cold path)
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryQuery>,
) -> Json<serde_json::Value> {
    let limit = params.limit.unwrap_or(100).min(1000);
    match db::get_max_pain_history(
        &state.db,
        params.instrument.as_deref(),
        params.expiry.as_deref(),
        limit,
    ) {
        Ok(rows) => Json(serde_json::json!({ "history": rows })),
        Err(e) => Json(serde_json::json!({ "error": e.to_string() })),
    }
}

/// GET /api/distribution -- latest persisted pain distribution for one
/// instrument (cold path)
pub async fn get_distribution(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InstrumentQuery>,
) -> Json<serde_json::Value> {
    match db::get_latest_distribution(&state.db, &params.instrument) {
        Ok(Some(row)) => Json(serde_json::json!(row)),
        Ok(None) => Json(serde_json::json!({ "error": "no data for instrument" })),
        Err(e) => Json(serde_json::json!({ "error": e.to_string() })),
    }
}

/// GET /api/quotes -- underlying price time series from DB (cold path)
pub async fn get_quotes(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InstrumentQuery>,
) -> Json<serde_json::Value> {
    let limit = params.limit.unwrap_or(500).min(5000);
    match db::get_recent_quotes(&state.db, &params.instrument, limit) {
        Ok(series) => Json(serde_json::json!({
            "instrument": params.instrument,
            "series": series.iter().map(|(t, p)| serde_json::json!({"t": t, "price": p})).collect::<Vec<_>>()
        })),
        Err(e) => Json(serde_json::json!({ "error": e.to_string() })),
    }
}

/// GET /api/counters -- performance counters (lock-free reads)
pub async fn get_counters(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    use portable_atomic::Ordering::Relaxed;
    Json(serde_json::json!({
        "ticks_processed": state.counters.ticks_processed.load(Relaxed),
        "quotes_received": state.counters.quotes_received.load(Relaxed),
        "chains_received": state.counters.chains_received.load(Relaxed),
        "results_computed": state.counters.results_computed.load(Relaxed),
        "chains_rejected": state.counters.chains_rejected.load(Relaxed),
        "ws_messages_sent": state.counters.ws_messages_sent.load(Relaxed),
    }))
}
