use crate::config::{AppConfig, InstrumentKind};
use crate::errors::{EngineError, EngineResult};
use crate::nse::client::NseClient;
use crate::state::EngineEvent;
use tokio::sync::mpsc;

/// Polls the latest traded price for each watched equity at a
/// configurable interval and sends Quote events to the engine via
/// bounded channel. Index underlyings are priced from the chain
/// payload itself, so they are not polled here.
pub async fn run_quote_feed(
    config: AppConfig,
    client: NseClient,
    engine_tx: mpsc::Sender<EngineEvent>,
) {
    let symbols: Vec<String> = config
        .instruments
        .iter()
        .filter(|i| i.kind == InstrumentKind::Equity)
        .map(|i| i.symbol.clone())
        .collect();

    if symbols.is_empty() {
        tracing::info!("no equity instruments watched, quote feed idle");
        return;
    }

    tracing::info!(symbols = symbols.len(), "quote feed started");

    let mut interval =
        tokio::time::interval(tokio::time::Duration::from_secs(config.quote_poll_secs.max(1)));
    let mut consecutive_errors: u32 = 0;

    loop {
        interval.tick().await;

        for symbol in &symbols {
            match fetch_quote(&client, symbol).await {
                Ok(price) => {
                    consecutive_errors = 0;
                    let timestamp_ms = chrono::Utc::now().timestamp_millis();

                    if engine_tx
                        .send(EngineEvent::Quote {
                            instrument: symbol.clone(),
                            price,
                            timestamp_ms,
                        })
                        .await
                        .is_err()
                    {
                        tracing::error!("engine channel closed, quote feed shutting down");
                        return;
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    tracing::warn!(
                        symbol = %symbol,
                        error = %e,
                        consecutive = consecutive_errors,
                        "quote fetch failed"
                    );
                }
            }
        }

        // Exponential backoff on repeated failures (cap at 30s)
        if consecutive_errors > 3 {
            let backoff = std::cmp::min(consecutive_errors * 2, 30);
            tokio::time::sleep(tokio::time::Duration::from_secs(backoff as u64)).await;
        }
    }
}

async fn fetch_quote(client: &NseClient, symbol: &str) -> EngineResult<f64> {
    let quote = client.get_quote(symbol).await?;

    let price = quote
        .price_info
        .and_then(|p| p.last_price)
        .ok_or_else(|| EngineError::QuoteFeed(format!("{symbol}: no lastPrice in response")))?;

    if price <= 0.0 || !price.is_finite() {
        return Err(EngineError::QuoteFeed(format!(
            "{symbol}: invalid price: {price}"
        )));
    }

    Ok(price)
}
