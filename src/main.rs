mod config;
mod db;
mod engine;
mod errors;
mod feeds;
mod nse;
mod server;
mod state;

use crate::nse::client::NseClient;
use crate::state::*;
use portable_atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() {
    // Structured logging (stderr, env-filtered)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("painscope engine starting");

    // Load config
    let cfg = match config::AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("config error: {e}");
            std::process::exit(1);
        }
    };

    // Init database
    let db_pool = match db::init_db(&cfg.data_dir) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!("database init error: {e}");
            std::process::exit(1);
        }
    };

    // Create bounded channels
    let (engine_tx, engine_rx) = mpsc::channel::<EngineEvent>(512);
    let (db_tx, db_rx) = mpsc::channel::<DbCommand>(1024);

    // Create shared state
    let app_state = AppState::new(cfg.clone(), db_pool.clone(), engine_tx.clone(), db_tx.clone());

    // Shared-session HTTP client for the provider
    let nse_client = NseClient::new(&cfg.nse_base_url);

    // ── Spawn tasks ──

    // 1. DB writer task (dedicated, owns the DB connection for writes)
    tokio::spawn(async move {
        db::run_db_writer(db_pool, db_rx).await;
    });

    // 2. Option chain poller task
    let poller_cfg = cfg.clone();
    let poller_client = nse_client.clone();
    let poller_tx = engine_tx.clone();
    tokio::spawn(async move {
        nse::chain_poller::run_chain_poller(poller_cfg, poller_client, poller_tx).await;
    });

    // 3. Underlying quote feed task
    let quote_cfg = cfg.clone();
    let quote_client = nse_client.clone();
    let quote_tx = engine_tx.clone();
    tokio::spawn(async move {
        feeds::quote::run_quote_feed(quote_cfg, quote_client, quote_tx).await;
    });

    // 4. Tick generator (1-second interval)
    let tick_tx = engine_tx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(1));
        loop {
            interval.tick().await;
            if tick_tx.send(EngineEvent::Tick).await.is_err() {
                break;
            }
        }
    });

    // 5. Engine task (owns all mutable analytics state)
    let engine_state = app_state.clone();
    let engine_cfg = cfg.clone();
    tokio::spawn(async move {
        run_engine(engine_state, engine_cfg, engine_rx).await;
    });

    // 6. Axum HTTP + WS server
    let server_state = app_state.clone();
    let port = cfg.server_port;

    let app = axum::Router::new()
        .route("/api/state", axum::routing::get(server::routes::get_state))
        .route("/api/history", axum::routing::get(server::routes::get_history))
        .route(
            "/api/distribution",
            axum::routing::get(server::routes::get_distribution),
        )
        .route("/api/quotes", axum::routing::get(server::routes::get_quotes))
        .route(
            "/api/counters",
            axum::routing::get(server::routes::get_counters),
        )
        .route("/ws", axum::routing::get(server::ws::ws_handler))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(server_state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("bind error: {e}");
            std::process::exit(1);
        });

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
    }
}

/// Core engine loop. Receives events, runs the max-pain computation,
/// emits persistence commands and dashboard broadcasts.
/// All mutable state lives here; no locks in the decision logic.
async fn run_engine(
    state: Arc<AppState>,
    config: config::AppConfig,
    mut rx: mpsc::Receiver<EngineEvent>,
) {
    tracing::info!("engine task started");

    // ── Local engine state (owned, no locks needed) ──
    let mut engine_state = EngineState::Connecting;
    let mut views: Vec<InstrumentView> = config
        .instruments
        .iter()
        .map(|i| InstrumentView::new(i.symbol.clone(), i.kind))
        .collect();
    let mut tick_counter: u64 = 0;

    while let Some(event) = rx.recv().await {
        let result = process_event(
            event,
            &mut engine_state,
            &mut views,
            &state,
            &mut tick_counter,
        )
        .await;

        if let Err(e) = result {
            tracing::error!(error = %e, "engine error");
        }
    }

    tracing::info!("engine task shutting down");
}

async fn process_event(
    event: EngineEvent,
    engine_state: &mut EngineState,
    views: &mut [InstrumentView],
    state: &Arc<AppState>,
    tick_counter: &mut u64,
) -> Result<(), errors::EngineError> {
    match event {
        EngineEvent::Quote {
            instrument,
            price,
            timestamp_ms,
        } => {
            state.counters.quotes_received.fetch_add(1, Ordering::Relaxed);

            let ts = chrono::DateTime::from_timestamp_millis(timestamp_ms)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_default();

            if let Some(view) = views.iter_mut().find(|v| v.instrument == instrument) {
                view.underlying_price = Some(price);
                // Re-label the stored result against the fresher price;
                // the distribution itself does not change.
                if let Some(result) = &mut view.result {
                    result.set_underlying(price);
                }
            }

            if *engine_state == EngineState::Connecting {
                *engine_state = EngineState::Watching;
                tracing::info!(instrument = %instrument, price = price, "first quote received, entering Watching");
                state.broadcast(WsMessage::EngineStateMsg {
                    state: "watching".into(),
                    reason: "first quote received".into(),
                });
            }

            state.broadcast(WsMessage::Quote {
                instrument: instrument.clone(),
                price,
                timestamp: ts.clone(),
            });

            // DB write (throttled: every 5th quote)
            if state.counters.quotes_received.load(Ordering::Relaxed) % 5 == 0 {
                let _ = state
                    .db_tx
                    .send(DbCommand::InsertQuote {
                        instrument,
                        timestamp: ts,
                        price,
                    })
                    .await;
            }
        }

        EngineEvent::ChainUpdate(obs) => {
            state.counters.chains_received.fetch_add(1, Ordering::Relaxed);

            let record_time = chrono::Utc::now().to_rfc3339();

            let computed = match engine::compute(&obs.snapshot) {
                Ok(r) => r,
                Err(e @ errors::EngineError::InvalidInput(_)) => {
                    // Reject the whole observation; nothing is persisted.
                    state.counters.chains_rejected.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        instrument = %obs.instrument,
                        expiry = %obs.expiry_date,
                        error = %e,
                        "chain snapshot rejected"
                    );
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            state.counters.results_computed.fetch_add(1, Ordering::Relaxed);

            let mut result = computed.with_context(&obs.instrument, &obs.expiry_date);

            // Prefer the freshest polled quote over the chain's own
            // underlying value; fall back to the latter.
            let polled = views
                .iter()
                .find(|v| v.instrument == obs.instrument)
                .and_then(|v| v.underlying_price);
            if let Some(price) = polled.or(obs.underlying_price) {
                result.set_underlying(price);
            }

            tracing::info!(
                instrument = %obs.instrument,
                expiry = %obs.expiry_date,
                strikes = obs.snapshot.len(),
                max_pain = result.max_pain_price,
                trend = ?result.trend,
                provider_ts = ?obs.provider_timestamp,
                "max pain computed"
            );

            let _ = state
                .db_tx
                .send(DbCommand::InsertMaxPain {
                    instrument: obs.instrument.clone(),
                    expiry_date: obs.expiry_date.clone(),
                    record_time: record_time.clone(),
                    max_pain_price: result.max_pain_price,
                    underlying_price: result.underlying_price,
                    trend: result.trend.map(|t| t.as_str().to_string()),
                    distribution_json: serde_json::to_string(&result.pain_distribution)?,
                })
                .await;

            state.broadcast(WsMessage::MaxPain {
                instrument: obs.instrument.clone(),
                expiry_date: obs.expiry_date.clone(),
                max_pain_price: result.max_pain_price,
                underlying_price: result.underlying_price,
                trend: result.trend,
                timestamp: record_time.clone(),
            });

            if let Some(view) = views.iter_mut().find(|v| v.instrument == obs.instrument) {
                view.underlying_price = result.underlying_price;
                view.result = Some(result);
                view.updated_at = Some(record_time);
            }

            if *engine_state == EngineState::Connecting {
                *engine_state = EngineState::Watching;
                tracing::info!("first chain processed, entering Watching");
                state.broadcast(WsMessage::EngineStateMsg {
                    state: "watching".into(),
                    reason: "first chain processed".into(),
                });
            }

            // Immediately refresh the snapshot so /api/state sees the result
            let _ = state.snapshot_tx.send(EngineSnapshot {
                engine_state: *engine_state,
                instruments: views.to_vec(),
            });
        }

        EngineEvent::Tick => {
            *tick_counter += 1;
            state.counters.ticks_processed.fetch_add(1, Ordering::Relaxed);

            // Update snapshot for dashboard (watch channel -- cheap, no lock)
            if *tick_counter % 2 == 0 {
                let _ = state.snapshot_tx.send(EngineSnapshot {
                    engine_state: *engine_state,
                    instruments: views.to_vec(),
                });
            }
        }

        EngineEvent::Shutdown => {
            tracing::info!("shutdown event received");
            *engine_state = EngineState::Halted;
            state.broadcast(WsMessage::EngineStateMsg {
                state: "halted".into(),
                reason: "shutdown requested".into(),
            });
            return Ok(());
        }
    }

    Ok(())
}
