use crate::errors::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

/// One expiry's options chain: strike universe plus call/put open interest,
/// aligned positionally (`call_oi[i]` / `put_oi[i]` belong to `strikes[i]`).
///
/// Built fresh per observation by the ingestion side and consumed immutably
/// by the engine. Strikes may arrive in any order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionsChainSnapshot {
    #[serde(rename = "strike_prices")]
    pub strikes: Vec<f64>,
    pub call_oi: Vec<f64>,
    pub put_oi: Vec<f64>,
}

impl OptionsChainSnapshot {
    pub fn new(strikes: Vec<f64>, call_oi: Vec<f64>, put_oi: Vec<f64>) -> Self {
        Self {
            strikes,
            call_oi,
            put_oi,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.strikes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.strikes.is_empty()
    }

    /// Check every invariant the engine relies on. Called before any
    /// computation; the error names the first violated invariant.
    pub fn validate(&self) -> EngineResult<()> {
        if self.strikes.is_empty() {
            return Err(EngineError::InvalidInput("empty strike list".into()));
        }

        if self.call_oi.len() != self.strikes.len() {
            return Err(EngineError::InvalidInput(format!(
                "call open interest has {} entries for {} strikes",
                self.call_oi.len(),
                self.strikes.len()
            )));
        }

        if self.put_oi.len() != self.strikes.len() {
            return Err(EngineError::InvalidInput(format!(
                "put open interest has {} entries for {} strikes",
                self.put_oi.len(),
                self.strikes.len()
            )));
        }

        for (i, &k) in self.strikes.iter().enumerate() {
            if !k.is_finite() || k <= 0.0 {
                return Err(EngineError::InvalidInput(format!(
                    "strike {k} at index {i} is not a positive finite price"
                )));
            }
            if !self.call_oi[i].is_finite() || self.call_oi[i] < 0.0 {
                return Err(EngineError::InvalidInput(format!(
                    "call open interest {} at strike {k} is negative or non-finite",
                    self.call_oi[i]
                )));
            }
            if !self.put_oi[i].is_finite() || self.put_oi[i] < 0.0 {
                return Err(EngineError::InvalidInput(format!(
                    "put open interest {} at strike {k} is negative or non-finite",
                    self.put_oi[i]
                )));
            }
        }

        // Duplicate detection on a sorted copy; strikes are finite by now.
        let mut sorted = self.strikes.clone();
        sorted.sort_unstable_by(f64::total_cmp);
        for pair in sorted.windows(2) {
            if pair[0] == pair[1] {
                return Err(EngineError::InvalidInput(format!(
                    "duplicate strike {}",
                    pair[0]
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_chain_passes() {
        let chain = OptionsChainSnapshot::new(
            vec![100.0, 110.0, 90.0],
            vec![10.0, 0.0, 5.0],
            vec![0.0, 3.0, 7.0],
        );
        assert!(chain.validate().is_ok());
    }

    #[test]
    fn test_error_names_the_bad_strike() {
        let chain = OptionsChainSnapshot::new(vec![100.0, -5.0], vec![1.0, 1.0], vec![1.0, 1.0]);
        let err = chain.validate().unwrap_err().to_string();
        assert!(err.contains("-5"), "error should name the strike: {err}");
    }

    #[test]
    fn test_error_names_the_short_side() {
        let chain = OptionsChainSnapshot::new(vec![100.0, 110.0], vec![1.0], vec![1.0, 1.0]);
        let err = chain.validate().unwrap_err().to_string();
        assert!(err.contains("call open interest"), "got: {err}");
    }
}
