use super::types::{OptionChainResponse, QuoteResponse};
use crate::config::{Instrument, InstrumentKind};
use crate::errors::{EngineError, EngineResult};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use reqwest::Client;

/// NSE public API client. The endpoints are unauthenticated but refuse
/// requests without browser-like headers and a session cookie obtained
/// from the landing page, so the client keeps a cookie store and warms
/// it up before (and re-warms it after a 401/403 during) API calls.
/// All methods return Result, never panic.
#[derive(Clone)]
pub struct NseClient {
    client: Client,
    base_url: String,
}

impl NseClient {
    pub fn new(base_url: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(
                "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
            ),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .pool_max_idle_per_host(4)
                .cookie_store(true)
                .default_headers(headers)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Hit the landing page so the cookie store picks up a session.
    pub async fn warm_up(&self) -> EngineResult<()> {
        let resp = self.client.get(&self.base_url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(EngineError::NseApi {
                status: status.as_u16(),
                body: "session warm-up refused".into(),
            });
        }
        tracing::debug!("NSE session warmed up");
        Ok(())
    }

    async fn api_get<T: serde::de::DeserializeOwned>(&self, path: &str) -> EngineResult<T> {
        let url = format!("{}{}", self.base_url, path);

        let resp = self
            .client
            .get(&url)
            .header(REFERER, self.base_url.as_str())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::NseApi {
                status: status.as_u16(),
                body,
            });
        }

        resp.json::<T>()
            .await
            .map_err(|e| EngineError::Parse(format!("GET {path}: {e}")))
    }

    /// Full option chain for one underlying; indices and equities live on
    /// different endpoints.
    pub async fn get_option_chain(
        &self,
        instrument: &Instrument,
    ) -> EngineResult<OptionChainResponse> {
        let endpoint = match instrument.kind {
            InstrumentKind::Index => "option-chain-indices",
            InstrumentKind::Equity => "option-chain-equities",
        };
        self.api_get(&format!("/api/{endpoint}?symbol={}", instrument.symbol))
            .await
    }

    pub async fn get_quote(&self, symbol: &str) -> EngineResult<QuoteResponse> {
        self.api_get(&format!("/api/quote-equity?symbol={symbol}"))
            .await
    }
}

/// Whether an API failure looks like a dropped/stale session, in which
/// case the caller should warm up again before retrying.
#[inline]
pub fn is_session_error(err: &EngineError) -> bool {
    matches!(
        err,
        EngineError::NseApi {
            status: 401 | 403,
            ..
        }
    )
}
