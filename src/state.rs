use crate::config::{AppConfig, InstrumentKind};
use crate::db::DbPool;
use crate::engine::{MaxPainResult, OptionsChainSnapshot, Trend};
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

// ── Engine State Machine ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Connecting,
    Watching,
    Halted,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Watching => write!(f, "watching"),
            Self::Halted => write!(f, "halted"),
        }
    }
}

// ── Messages INTO the engine (bounded channels) ──

#[derive(Debug, Clone)]
pub enum EngineEvent {
    Quote {
        instrument: String,
        price: f64,
        timestamp_ms: i64,
    },
    ChainUpdate(Box<ChainObservation>),
    Tick,
    Shutdown,
}

/// One fetched chain plus the context it arrived with. The snapshot itself
/// is exactly what the engine consumes; everything else is pass-through.
#[derive(Debug, Clone)]
pub struct ChainObservation {
    pub instrument: String,
    pub expiry_date: String,
    pub underlying_price: Option<f64>,
    pub provider_timestamp: Option<String>,
    pub snapshot: OptionsChainSnapshot,
}

// ── Messages OUT of the engine ──

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type")]
pub enum WsMessage {
    #[serde(rename = "quote")]
    Quote {
        instrument: String,
        price: f64,
        timestamp: String,
    },

    #[serde(rename = "max_pain")]
    MaxPain {
        instrument: String,
        expiry_date: String,
        max_pain_price: f64,
        underlying_price: Option<f64>,
        trend: Option<Trend>,
        timestamp: String,
    },

    #[serde(rename = "engine_state")]
    EngineStateMsg { state: String, reason: String },
}

// ── DB Commands (sent to writer task via bounded channel) ──

#[derive(Debug)]
pub enum DbCommand {
    InsertQuote {
        instrument: String,
        timestamp: String,
        price: f64,
    },
    InsertMaxPain {
        instrument: String,
        expiry_date: String,
        record_time: String,
        max_pain_price: f64,
        underlying_price: Option<f64>,
        trend: Option<String>,
        distribution_json: String,
    },
}

// ── Per-instrument live view ──

#[derive(Debug, Clone, serde::Serialize)]
pub struct InstrumentView {
    pub instrument: String,
    pub kind: InstrumentKind,
    pub underlying_price: Option<f64>,
    pub result: Option<MaxPainResult>,
    pub updated_at: Option<String>,
}

impl InstrumentView {
    pub fn new(instrument: String, kind: InstrumentKind) -> Self {
        Self {
            instrument,
            kind,
            underlying_price: None,
            result: None,
            updated_at: None,
        }
    }
}

// ── Engine snapshot for dashboard (sent via watch channel) ──

#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineSnapshot {
    pub engine_state: EngineState,
    pub instruments: Vec<InstrumentView>,
}

impl Default for EngineSnapshot {
    fn default() -> Self {
        Self {
            engine_state: EngineState::Connecting,
            instruments: Vec::new(),
        }
    }
}

// ── Performance Counters (lock-free) ──

pub struct PerfCounters {
    pub ticks_processed: AtomicU64,
    pub quotes_received: AtomicU64,
    pub chains_received: AtomicU64,
    pub results_computed: AtomicU64,
    pub chains_rejected: AtomicU64,
    pub ws_messages_sent: AtomicU64,
}

impl PerfCounters {
    pub fn new() -> Self {
        Self {
            ticks_processed: AtomicU64::new(0),
            quotes_received: AtomicU64::new(0),
            chains_received: AtomicU64::new(0),
            results_computed: AtomicU64::new(0),
            chains_rejected: AtomicU64::new(0),
            ws_messages_sent: AtomicU64::new(0),
        }
    }
}

// ── Application shared state (channels, not locks) ──

pub struct AppState {
    pub config: AppConfig,
    pub db: DbPool,

    // Engine -> Dashboard: latest snapshot (watch = single producer, multi consumer)
    pub snapshot_tx: watch::Sender<EngineSnapshot>,
    pub snapshot_rx: watch::Receiver<EngineSnapshot>,

    // Engine -> Dashboard: event stream (broadcast for WS clients)
    pub ws_tx: broadcast::Sender<WsMessage>,

    // Feeds/Poller -> Engine: bounded event channel
    pub engine_tx: mpsc::Sender<EngineEvent>,

    // Engine -> DB Writer: bounded command channel
    pub db_tx: mpsc::Sender<DbCommand>,

    // Lock-free performance counters
    pub counters: PerfCounters,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        db: DbPool,
        engine_tx: mpsc::Sender<EngineEvent>,
        db_tx: mpsc::Sender<DbCommand>,
    ) -> Arc<Self> {
        let (ws_tx, _) = broadcast::channel(2048);
        let (snapshot_tx, snapshot_rx) = watch::channel(EngineSnapshot::default());

        Arc::new(Self {
            config,
            db,
            snapshot_tx,
            snapshot_rx,
            ws_tx,
            engine_tx,
            db_tx,
            counters: PerfCounters::new(),
        })
    }

    #[inline]
    pub fn broadcast(&self, msg: WsMessage) {
        self.counters.ws_messages_sent.fetch_add(1, Ordering::Relaxed);
        let _ = self.ws_tx.send(msg);
    }
}
