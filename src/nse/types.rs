use crate::engine::OptionsChainSnapshot;
use serde::Deserialize;

// ── Option chain payload ──
//
// Shape served by /api/option-chain-indices and /api/option-chain-equities:
// {
//   "records": {
//     "expiryDates": ["26-Jun-2025", ...],
//     "data": [
//       { "strikePrice": 22000, "expiryDate": "26-Jun-2025",
//         "CE": { "openInterest": 123, ... },
//         "PE": { "openInterest": 456, ... } },
//       ...
//     ],
//     "timestamp": "26-Jun-2025 15:30:00",
//     "underlyingValue": 22110.5
//   },
//   "filtered": { ... }
// }

#[derive(Debug, Clone, Deserialize)]
pub struct OptionChainResponse {
    pub records: Option<ChainRecords>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainRecords {
    #[serde(rename = "expiryDates")]
    pub expiry_dates: Option<Vec<String>>,
    pub data: Option<Vec<StrikeRow>>,
    pub timestamp: Option<String>,
    #[serde(rename = "underlyingValue")]
    pub underlying_value: Option<f64>,
}

/// One strike for one expiry. Illiquid strikes often miss one side
/// entirely; that reads as zero open interest, not an error.
#[derive(Debug, Clone, Deserialize)]
pub struct StrikeRow {
    #[serde(rename = "strikePrice")]
    pub strike_price: Option<f64>,
    #[serde(rename = "expiryDate")]
    pub expiry_date: Option<String>,
    #[serde(rename = "CE")]
    pub call: Option<SideDetail>,
    #[serde(rename = "PE")]
    pub put: Option<SideDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SideDetail {
    #[serde(rename = "openInterest")]
    pub open_interest: Option<f64>,
    #[allow(dead_code)]
    #[serde(rename = "changeinOpenInterest")]
    pub change_in_open_interest: Option<f64>,
    #[allow(dead_code)]
    #[serde(rename = "lastPrice")]
    pub last_price: Option<f64>,
}

impl ChainRecords {
    /// Fold the rows of one expiry into the engine's snapshot shape,
    /// positionally aligned. Rows without a strike price are skipped.
    pub fn snapshot_for_expiry(&self, expiry_date: &str) -> OptionsChainSnapshot {
        let mut strikes = Vec::new();
        let mut call_oi = Vec::new();
        let mut put_oi = Vec::new();

        for row in self.data.as_deref().unwrap_or_default() {
            if row.expiry_date.as_deref() != Some(expiry_date) {
                continue;
            }
            let Some(strike) = row.strike_price else {
                continue;
            };
            strikes.push(strike);
            call_oi.push(side_oi(row.call.as_ref()));
            put_oi.push(side_oi(row.put.as_ref()));
        }

        OptionsChainSnapshot::new(strikes, call_oi, put_oi)
    }
}

#[inline]
fn side_oi(side: Option<&SideDetail>) -> f64 {
    side.and_then(|s| s.open_interest).unwrap_or(0.0)
}

// ── Equity quote payload ──
//
// /api/quote-equity?symbol=X returns a large object; only the last traded
// price is consumed here.

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteResponse {
    #[serde(rename = "priceInfo")]
    pub price_info: Option<PriceInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceInfo {
    #[serde(rename = "lastPrice")]
    pub last_price: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_payload_converts_positionally() {
        let raw = r#"{
            "records": {
                "expiryDates": ["26-Jun-2025", "03-Jul-2025"],
                "timestamp": "26-Jun-2025 15:30:00",
                "underlyingValue": 22110.5,
                "data": [
                    { "strikePrice": 22000, "expiryDate": "26-Jun-2025",
                      "CE": { "openInterest": 500, "lastPrice": 140.5 },
                      "PE": { "openInterest": 200 } },
                    { "strikePrice": 22100, "expiryDate": "03-Jul-2025",
                      "CE": { "openInterest": 999 },
                      "PE": { "openInterest": 999 } },
                    { "strikePrice": 22100, "expiryDate": "26-Jun-2025",
                      "PE": { "openInterest": 400 } }
                ]
            }
        }"#;

        let resp: OptionChainResponse = serde_json::from_str(raw).unwrap();
        let records = resp.records.unwrap();
        assert_eq!(records.underlying_value, Some(22110.5));

        let snapshot = records.snapshot_for_expiry("26-Jun-2025");
        assert_eq!(snapshot.strikes, vec![22000.0, 22100.0]);
        assert_eq!(snapshot.call_oi, vec![500.0, 0.0]);
        assert_eq!(snapshot.put_oi, vec![200.0, 400.0]);
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn test_quote_payload_parses() {
        let raw = r#"{ "priceInfo": { "lastPrice": 2875.4, "open": 2850.0 } }"#;
        let resp: QuoteResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.price_info.and_then(|p| p.last_price), Some(2875.4));
    }
}
