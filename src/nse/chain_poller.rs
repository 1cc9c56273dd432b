use super::client::{is_session_error, NseClient};
use crate::config::{AppConfig, Instrument};
use crate::errors::{EngineError, EngineResult};
use crate::state::{ChainObservation, EngineEvent};
use chrono::{NaiveDate, Utc};
use tokio::sync::mpsc;

/// Polls the provider for each watched instrument's option chain and
/// feeds ChainObservations to the engine via bounded channel.
///
/// Expiry selection: the nearest not-yet-past expiry listed by the
/// provider, unless configuration pins one explicitly.
pub async fn run_chain_poller(
    config: AppConfig,
    client: NseClient,
    engine_tx: mpsc::Sender<EngineEvent>,
) {
    tracing::info!(
        instruments = config.instruments.len(),
        interval_secs = config.chain_poll_secs,
        "chain poller started"
    );

    if let Err(e) = client.warm_up().await {
        tracing::warn!(error = %e, "initial session warm-up failed");
    }

    let mut interval =
        tokio::time::interval(tokio::time::Duration::from_secs(config.chain_poll_secs.max(1)));
    let mut consecutive_errors: u32 = 0;

    loop {
        interval.tick().await;

        for instrument in &config.instruments {
            match fetch_observation(&config, &client, instrument).await {
                Ok(Some(obs)) => {
                    consecutive_errors = 0;
                    if engine_tx
                        .send(EngineEvent::ChainUpdate(Box::new(obs)))
                        .await
                        .is_err()
                    {
                        tracing::error!("engine channel closed, chain poller shutting down");
                        return;
                    }
                }
                Ok(None) => {
                    tracing::debug!(symbol = %instrument.symbol, "no usable expiry in chain");
                }
                Err(e) => {
                    consecutive_errors += 1;
                    tracing::warn!(
                        symbol = %instrument.symbol,
                        error = %e,
                        consecutive = consecutive_errors,
                        "chain fetch failed"
                    );

                    if is_session_error(&e) {
                        if let Err(e) = client.warm_up().await {
                            tracing::warn!(error = %e, "session re-warm failed");
                        }
                    }
                }
            }
        }

        // Exponential backoff on repeated failures (cap at 60s)
        if consecutive_errors > 3 {
            let backoff = std::cmp::min(consecutive_errors * 5, 60);
            tokio::time::sleep(tokio::time::Duration::from_secs(backoff as u64)).await;
        }
    }
}

async fn fetch_observation(
    config: &AppConfig,
    client: &NseClient,
    instrument: &Instrument,
) -> EngineResult<Option<ChainObservation>> {
    let resp = client.get_option_chain(instrument).await?;
    let records = resp
        .records
        .ok_or_else(|| EngineError::Parse(format!("{}: chain has no records", instrument.symbol)))?;

    let expiry_date = match &config.expiry_override {
        Some(pinned) => pinned.clone(),
        None => {
            let today = Utc::now().date_naive();
            match nearest_expiry(records.expiry_dates.as_deref().unwrap_or_default(), today) {
                Some(e) => e,
                None => return Ok(None),
            }
        }
    };

    let snapshot = records.snapshot_for_expiry(&expiry_date);
    if snapshot.is_empty() {
        return Ok(None);
    }

    Ok(Some(ChainObservation {
        instrument: instrument.symbol.clone(),
        expiry_date,
        underlying_price: records.underlying_value,
        provider_timestamp: records.timestamp.clone(),
        snapshot,
    }))
}

/// Provider expiry strings look like "26-Jun-2025".
fn parse_expiry(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%d-%b-%Y").ok()
}

/// Earliest listed expiry that has not already passed. Unparseable
/// entries are skipped; None when everything is in the past.
fn nearest_expiry(dates: &[String], today: NaiveDate) -> Option<String> {
    dates
        .iter()
        .filter_map(|s| parse_expiry(s).map(|d| (d, s)))
        .filter(|(d, _)| *d >= today)
        .min_by_key(|(d, _)| *d)
        .map(|(_, s)| s.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider_expiry_format() {
        assert_eq!(
            parse_expiry("26-Jun-2025"),
            NaiveDate::from_ymd_opt(2025, 6, 26)
        );
        assert!(parse_expiry("2025-06-26").is_none());
    }

    #[test]
    fn test_nearest_expiry_skips_past_dates() {
        let dates = vec![
            "30-May-2025".to_string(),
            "03-Jul-2025".to_string(),
            "26-Jun-2025".to_string(),
        ];
        let today = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        assert_eq!(nearest_expiry(&dates, today).as_deref(), Some("26-Jun-2025"));
    }

    #[test]
    fn test_expiry_on_today_still_selected() {
        let dates = vec!["26-Jun-2025".to_string()];
        let today = NaiveDate::from_ymd_opt(2025, 6, 26).unwrap();
        assert_eq!(nearest_expiry(&dates, today).as_deref(), Some("26-Jun-2025"));
    }

    #[test]
    fn test_all_past_or_garbage_yields_none() {
        let dates = vec!["30-May-2025".to_string(), "not-a-date".to_string()];
        let today = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        assert_eq!(nearest_expiry(&dates, today), None);
    }
}
