use crate::errors::{EngineError, EngineResult};
use std::path::PathBuf;

/// One watched underlying. The kind decides which option-chain endpoint
/// the provider serves it from.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Instrument {
    pub symbol: String,
    pub kind: InstrumentKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    Index,
    Equity,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub nse_base_url: String,
    pub instruments: Vec<Instrument>,
    /// Pin a specific expiry (provider format, e.g. "26-Jun-2025").
    /// When unset the poller tracks the nearest upcoming expiry.
    pub expiry_override: Option<String>,
    pub chain_poll_secs: u64,
    pub quote_poll_secs: u64,
    pub data_dir: PathBuf,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> EngineResult<Self> {
        dotenvy::dotenv().ok();

        let chain_poll_secs = env_var_or("CHAIN_POLL_SECS", "180")
            .parse::<u64>()
            .map_err(|e| EngineError::Config(format!("CHAIN_POLL_SECS: {e}")))?;

        let quote_poll_secs = env_var_or("QUOTE_POLL_SECS", "30")
            .parse::<u64>()
            .map_err(|e| EngineError::Config(format!("QUOTE_POLL_SECS: {e}")))?;

        let server_port = env_var_or("SERVER_PORT", "3001")
            .parse::<u16>()
            .map_err(|e| EngineError::Config(format!("SERVER_PORT: {e}")))?;

        let instruments = parse_instruments(&env_var_or("INSTRUMENTS", "NIFTY:index"))?;

        let expiry_override = std::env::var("EXPIRY_DATE").ok().filter(|s| !s.is_empty());

        Ok(Self {
            nse_base_url: env_var_or("NSE_BASE_URL", "https://www.nseindia.com"),
            instruments,
            expiry_override,
            chain_poll_secs,
            quote_poll_secs,
            data_dir: PathBuf::from(env_var_or("DATA_DIR", "data")),
            server_port,
        })
    }
}

/// Parse the INSTRUMENTS watchlist: comma-separated `SYMBOL:kind` entries,
/// kind one of `index` | `equity` (defaults to `equity` when omitted).
fn parse_instruments(raw: &str) -> EngineResult<Vec<Instrument>> {
    let mut out = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (symbol, kind) = match entry.split_once(':') {
            Some((sym, "index")) => (sym, InstrumentKind::Index),
            Some((sym, "equity")) => (sym, InstrumentKind::Equity),
            Some((_, other)) => {
                return Err(EngineError::Config(format!(
                    "INSTRUMENTS: unknown kind `{other}` in `{entry}`"
                )))
            }
            None => (entry, InstrumentKind::Equity),
        };
        if symbol.is_empty() {
            return Err(EngineError::Config(format!(
                "INSTRUMENTS: empty symbol in `{entry}`"
            )));
        }
        out.push(Instrument {
            symbol: symbol.to_uppercase(),
            kind,
        });
    }
    if out.is_empty() {
        return Err(EngineError::Config("INSTRUMENTS: empty watchlist".into()));
    }
    Ok(out)
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_watchlist() {
        let list = parse_instruments("NIFTY:index, reliance:equity,TCS").unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].symbol, "NIFTY");
        assert_eq!(list[0].kind, InstrumentKind::Index);
        assert_eq!(list[1].symbol, "RELIANCE");
        assert_eq!(list[2].kind, InstrumentKind::Equity);
    }

    #[test]
    fn test_parse_rejects_unknown_kind() {
        assert!(parse_instruments("NIFTY:future").is_err());
        assert!(parse_instruments("").is_err());
    }
}
