/// Max-pain computation.
///
/// For each candidate settlement price p drawn from the listed strikes:
///
///   call_pain(p) = sum over k < p of (p - k) * call_oi[k]
///   put_pain(p)  = sum over k > p of (k - p) * put_oi[k]
///   total(p)     = call_pain(p) + put_pain(p)
///
/// The max-pain price is the candidate minimizing total(p). Candidates are
/// exactly the listed strikes; no interpolation, no extrapolation. Ties
/// resolve to the lowest strike. O(n^2) over the strike count, which stays
/// in the low hundreds for real chains.
///
/// Pure function: deterministic from inputs, the snapshot is never mutated.
use crate::engine::chain::OptionsChainSnapshot;
use crate::engine::trend::Trend;
use crate::errors::EngineResult;
use serde::{Deserialize, Serialize};

/// Aggregate writer loss if the underlying settled at `strike`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PainPoint {
    pub strike: f64,
    pub total_pain: f64,
}

/// Total pain per candidate settlement price, in ascending strike order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PainDistribution(Vec<PainPoint>);

impl PainDistribution {
    #[inline]
    pub fn points(&self) -> &[PainPoint] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The lowest-strike point achieving minimum total pain.
    pub fn min_point(&self) -> Option<PainPoint> {
        let mut best: Option<PainPoint> = None;
        for &p in &self.0 {
            match best {
                Some(b) if p.total_pain >= b.total_pain => {}
                _ => best = Some(p),
            }
        }
        best
    }
}

/// Result of one max-pain evaluation. The context fields are pass-through
/// from ingestion, attached for downstream persistence and display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaxPainResult {
    pub max_pain_price: f64,
    pub pain_distribution: PainDistribution,
    pub underlying_price: Option<f64>,
    pub trend: Option<Trend>,
    pub instrument: Option<String>,
    pub expiry_date: Option<String>,
}

impl MaxPainResult {
    /// Attach instrument/expiry context from the ingestion side.
    pub fn with_context(mut self, instrument: &str, expiry_date: &str) -> Self {
        self.instrument = Some(instrument.to_string());
        self.expiry_date = Some(expiry_date.to_string());
        self
    }

    /// Re-label against a fresher underlying price. The distribution is
    /// untouched; only the pass-through context changes.
    pub fn set_underlying(&mut self, price: f64) {
        self.underlying_price = Some(price);
        self.trend = Some(Trend::classify(price, self.max_pain_price));
    }
}

/// Evaluate the full pain distribution and the max-pain strike for one
/// chain snapshot. Validates the snapshot first; no partial results.
pub fn compute(chain: &OptionsChainSnapshot) -> EngineResult<MaxPainResult> {
    chain.validate()?;

    // Deterministic ascending enumeration regardless of input order.
    let mut order: Vec<usize> = (0..chain.len()).collect();
    order.sort_unstable_by(|&a, &b| chain.strikes[a].total_cmp(&chain.strikes[b]));

    let mut points = Vec::with_capacity(chain.len());
    for &pi in &order {
        let settle = chain.strikes[pi];
        let mut total = 0.0;

        for &ki in &order {
            let strike = chain.strikes[ki];
            if strike < settle {
                // Calls struck below the settlement finish in the money.
                total += (settle - strike) * chain.call_oi[ki];
            } else if strike > settle {
                // Puts struck above the settlement finish in the money.
                total += (strike - settle) * chain.put_oi[ki];
            }
        }

        points.push(PainPoint {
            strike: settle,
            total_pain: total,
        });
    }

    // Ascending scan with strict `<` keeps the lowest strike on ties.
    let mut max_pain_price = points[0].strike;
    let mut min_pain = points[0].total_pain;
    for &p in &points[1..] {
        if p.total_pain < min_pain {
            min_pain = p.total_pain;
            max_pain_price = p.strike;
        }
    }

    Ok(MaxPainResult {
        max_pain_price,
        pain_distribution: PainDistribution(points),
        underlying_price: None,
        trend: None,
        instrument: None,
        expiry_date: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EngineError;

    fn reference_chain() -> OptionsChainSnapshot {
        OptionsChainSnapshot::new(
            vec![95.0, 100.0, 105.0, 110.0, 115.0],
            vec![500.0, 700.0, 400.0, 300.0, 200.0],
            vec![200.0, 400.0, 600.0, 400.0, 300.0],
        )
    }

    #[test]
    fn test_reference_chain_distribution() {
        let result = compute(&reference_chain()).unwrap();

        // Hand-computed: calls lose (p-k)*oi below p, puts lose (k-p)*oi above p.
        let expected = [
            (95.0, 20_000.0),
            (100.0, 14_000.0),
            (105.0, 13_500.0),
            (110.0, 18_000.0),
            (115.0, 26_000.0),
        ];
        assert_eq!(result.pain_distribution.len(), expected.len());
        for (point, (strike, pain)) in result.pain_distribution.points().iter().zip(expected) {
            assert_eq!(point.strike, strike);
            assert_eq!(point.total_pain, pain, "pain at {strike}");
        }
        assert_eq!(result.max_pain_price, 105.0);
    }

    #[test]
    fn test_unsorted_input_gives_ascending_distribution() {
        let shuffled = OptionsChainSnapshot::new(
            vec![110.0, 95.0, 115.0, 105.0, 100.0],
            vec![300.0, 500.0, 200.0, 400.0, 700.0],
            vec![400.0, 200.0, 300.0, 600.0, 400.0],
        );
        let result = compute(&shuffled).unwrap();
        assert_eq!(result, compute(&reference_chain()).unwrap());
        let strikes: Vec<f64> = result
            .pain_distribution
            .points()
            .iter()
            .map(|p| p.strike)
            .collect();
        assert_eq!(strikes, vec![95.0, 100.0, 105.0, 110.0, 115.0]);
    }

    #[test]
    fn test_result_invariants() {
        let result = compute(&reference_chain()).unwrap();
        assert!(reference_chain().strikes.contains(&result.max_pain_price));
        let min = result.pain_distribution.min_point().unwrap();
        assert_eq!(min.strike, result.max_pain_price);
        for p in result.pain_distribution.points() {
            assert!(p.total_pain >= 0.0);
            assert!(p.total_pain >= min.total_pain);
        }
    }

    #[test]
    fn test_determinism() {
        let chain = reference_chain();
        assert_eq!(compute(&chain).unwrap(), compute(&chain).unwrap());
    }

    #[test]
    fn test_zero_open_interest_picks_lowest_strike() {
        let chain = OptionsChainSnapshot::new(
            vec![120.0, 100.0, 110.0],
            vec![0.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0],
        );
        let result = compute(&chain).unwrap();
        assert_eq!(result.max_pain_price, 100.0);
        assert!(result
            .pain_distribution
            .points()
            .iter()
            .all(|p| p.total_pain == 0.0));
    }

    #[test]
    fn test_tie_breaks_to_lower_strike() {
        // pain(100) = 10 * put_oi[110] = 50, pain(110) = 10 * call_oi[100] = 50
        let chain = OptionsChainSnapshot::new(
            vec![100.0, 110.0],
            vec![5.0, 0.0],
            vec![0.0, 5.0],
        );
        let result = compute(&chain).unwrap();
        assert_eq!(result.pain_distribution.points()[0].total_pain, 50.0);
        assert_eq!(result.pain_distribution.points()[1].total_pain, 50.0);
        assert_eq!(result.max_pain_price, 100.0);
    }

    #[test]
    fn test_mirror_symmetry() {
        // Reflecting strikes around their midpoint and swapping call/put OI
        // must mirror the distribution: pain'(2m - p) == pain(p).
        let chain = reference_chain();
        let m = 105.0;
        let mirrored = OptionsChainSnapshot::new(
            chain.strikes.iter().map(|k| 2.0 * m - k).collect(),
            chain.put_oi.clone(),
            chain.call_oi.clone(),
        );

        let original = compute(&chain).unwrap();
        let reflected = compute(&mirrored).unwrap();

        for p in original.pain_distribution.points() {
            let image = 2.0 * m - p.strike;
            let q = reflected
                .pain_distribution
                .points()
                .iter()
                .find(|q| q.strike == image)
                .unwrap();
            assert_eq!(q.total_pain, p.total_pain, "pain at {} vs {}", p.strike, image);
        }
    }

    #[test]
    fn test_empty_chain_rejected() {
        let chain = OptionsChainSnapshot::new(vec![], vec![], vec![]);
        assert!(matches!(
            compute(&chain),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_missing_oi_entry_rejected() {
        let chain = OptionsChainSnapshot::new(
            vec![95.0, 100.0],
            vec![500.0],
            vec![200.0, 400.0],
        );
        assert!(matches!(
            compute(&chain),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_duplicate_strike_rejected() {
        let chain = OptionsChainSnapshot::new(
            vec![100.0, 105.0, 100.0],
            vec![1.0, 1.0, 1.0],
            vec![1.0, 1.0, 1.0],
        );
        assert!(matches!(
            compute(&chain),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_negative_values_rejected() {
        let bad_strike =
            OptionsChainSnapshot::new(vec![0.0, 100.0], vec![1.0, 1.0], vec![1.0, 1.0]);
        assert!(compute(&bad_strike).is_err());

        let bad_oi =
            OptionsChainSnapshot::new(vec![95.0, 100.0], vec![-1.0, 1.0], vec![1.0, 1.0]);
        assert!(compute(&bad_oi).is_err());
    }

    #[test]
    fn test_trend_labels_from_underlying() {
        let mut result = compute(&reference_chain()).unwrap();
        result.set_underlying(108.5);
        assert_eq!(result.trend, Some(Trend::Above));
        assert_eq!(result.underlying_price, Some(108.5));

        result.set_underlying(105.0);
        assert_eq!(result.trend, Some(Trend::At));
        result.set_underlying(101.25);
        assert_eq!(result.trend, Some(Trend::Below));
    }
}
