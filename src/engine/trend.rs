use serde::{Deserialize, Serialize};

/// Position of the current underlying price relative to the max-pain price.
/// Pass-through context for persistence and display; no tolerance band, the
/// comparison is exact on the shared price scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Above,
    Below,
    At,
}

impl Trend {
    #[inline]
    pub fn classify(underlying_price: f64, max_pain_price: f64) -> Self {
        if underlying_price > max_pain_price {
            Self::Above
        } else if underlying_price < max_pain_price {
            Self::Below
        } else {
            Self::At
        }
    }

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Above => "above",
            Self::Below => "below",
            Self::At => "at",
        }
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_above() {
        assert_eq!(Trend::classify(105.0, 100.0), Trend::Above);
    }

    #[test]
    fn test_below() {
        assert_eq!(Trend::classify(99.95, 100.0), Trend::Below);
    }

    #[test]
    fn test_at_exact_equality() {
        assert_eq!(Trend::classify(100.0, 100.0), Trend::At);
    }
}
