//! Delta-targeted strike selection.
//!
//! The expiration closest to the target DTE is chosen first. Greeks are then
//! streamed for a window of strikes around the middle of that expiration and
//! the strike whose delta is nearest the target becomes the anchor. The
//! paired (protective) strike sits exactly `width` further out of the money.

use crate::aggregator::{delta_pct, MarketDataAggregator};
use crate::error::{OptionsError, Result};
use crate::types::Selection;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use spreadbot_core::{GreekSnapshot, OptionRight};
use spreadbot_tastytrade::{Expiration, OptionChain, Strike};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Expiration whose calendar distance from `today` is closest to `target_dte`.
///
/// Ties go to the first expiration listed.
///
/// # Errors
/// Returns [`OptionsError::OptionNotFound`] for a chain without expirations.
pub fn select_expiration(
    chain: &OptionChain,
    target_dte: i64,
    today: NaiveDate,
) -> Result<&Expiration> {
    chain
        .expirations
        .iter()
        .min_by_key(|exp| ((exp.date - today).num_days() - target_dte).abs())
        .ok_or_else(|| {
            OptionsError::option_not_found(format!("{} chain has no expirations", chain.underlying))
        })
}

/// Middle half of the expiration's strikes: `[mid - quarter, mid + quarter)`.
///
/// Falls back to every strike when that slice is empty.
#[must_use]
pub fn strike_window(expiration: &Expiration) -> &[Strike] {
    let strikes = &expiration.strikes;
    let mid = strikes.len() / 2;
    let quarter = mid / 2;
    let window = &strikes[mid - quarter..mid + quarter];
    if window.is_empty() {
        strikes
    } else {
        window
    }
}

/// Signed delta target in percent: negative for puts.
#[must_use]
pub fn target_delta(right: OptionRight, target_delta_pct: Decimal) -> Decimal {
    match right {
        OptionRight::Put => -target_delta_pct.abs(),
        OptionRight::Call => target_delta_pct.abs(),
    }
}

/// Strike in `window` whose delta is closest to the target.
///
/// Strikes without greeks are skipped; ties go to the first in window order.
///
/// # Errors
/// Returns [`OptionsError::OptionNotFound`] if no strike in the window has greeks.
pub fn select_anchor_strike<'a>(
    window: &'a [Strike],
    greeks: &HashMap<String, GreekSnapshot>,
    right: OptionRight,
    target_delta_pct: Decimal,
) -> Result<(&'a Strike, Decimal)> {
    let target = target_delta(right, target_delta_pct);
    let mut best: Option<(&Strike, Decimal, Decimal)> = None;

    for strike in window {
        let Some(snapshot) = greeks.get(strike.streamer_symbol(right)) else {
            continue;
        };
        let distance = (delta_pct(snapshot) - target).abs();
        if best.map_or(true, |(_, _, d)| distance < d) {
            best = Some((strike, snapshot.delta, distance));
        }
    }

    best.map(|(strike, delta, _)| (strike, delta))
        .ok_or_else(|| OptionsError::option_not_found("no greeks for any strike in the window"))
}

/// Strike exactly `width` out of the money from `anchor`.
///
/// # Errors
/// Returns [`OptionsError::StrikeNotFound`] if the chain lists no such strike.
pub fn select_paired<'a>(
    expiration: &'a Expiration,
    anchor: &Strike,
    width: Decimal,
    right: OptionRight,
) -> Result<&'a Strike> {
    let price = match right {
        OptionRight::Put => anchor.price - width,
        OptionRight::Call => anchor.price + width,
    };
    expiration
        .strike_at(price)
        .ok_or(OptionsError::StrikeNotFound {
            price,
            expiration: expiration.date,
        })
}

/// Selection parameters.
#[derive(Debug, Clone)]
pub struct SelectionParams {
    pub target_dte: i64,
    pub target_delta_pct: Decimal,
    pub width: Option<Decimal>,
    pub right: OptionRight,
    pub timeout: Duration,
}

/// Streams greeks to pick the anchor and derives the paired strike.
#[derive(Debug, Clone)]
pub struct StrikeSelector {
    params: SelectionParams,
}

impl StrikeSelector {
    #[must_use]
    pub fn new(params: SelectionParams) -> Self {
        Self { params }
    }

    /// Runs the full selection against `chain`.
    ///
    /// # Errors
    /// Returns error if no expiration or anchor qualifies, the paired strike
    /// is missing, or greeks do not arrive in time.
    pub async fn select(
        &self,
        chain: &OptionChain,
        today: NaiveDate,
        aggregator: &mut MarketDataAggregator,
    ) -> Result<Selection> {
        let params = &self.params;
        let expiration = select_expiration(chain, params.target_dte, today)?;
        if expiration.strikes.is_empty() {
            return Err(OptionsError::option_not_found(format!(
                "expiration {} has no strikes",
                expiration.date
            )));
        }

        let window = strike_window(expiration);
        let symbols: Vec<String> = window
            .iter()
            .map(|s| s.streamer_symbol(params.right).to_string())
            .collect();
        debug!(
            expiration = %expiration.date,
            window = symbols.len(),
            "streaming greeks for strike window"
        );

        let greeks = aggregator
            .collect_greeks(&symbols, params.timeout, None)
            .await?;
        let (anchor, anchor_delta) =
            select_anchor_strike(window, &greeks, params.right, params.target_delta_pct)?;

        let paired = params
            .width
            .map(|width| select_paired(expiration, anchor, width, params.right))
            .transpose()?;

        info!(
            symbol = %chain.underlying,
            expiration = %expiration.date,
            anchor = %anchor.price,
            delta = %anchor_delta,
            paired = ?paired.map(|p| p.price),
            "strikes selected"
        );

        Ok(Selection {
            expiration: expiration.clone(),
            anchor: anchor.clone(),
            anchor_delta,
            paired: paired.cloned(),
            right: params.right,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::aggregator::tests::{greeks, ScriptedStream};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use spreadbot_tastytrade::TickSize;

    pub(crate) fn strike(price: Decimal) -> Strike {
        Strike {
            price,
            call: format!("SPXW  241014C0{price}000"),
            put: format!("SPXW  241014P0{price}000"),
            call_streamer_symbol: format!(".SPXW241014C{price}"),
            put_streamer_symbol: format!(".SPXW241014P{price}"),
        }
    }

    pub(crate) fn expiration(date: NaiveDate, prices: &[Decimal]) -> Expiration {
        Expiration {
            date,
            days_to_expiration: 0,
            strikes: prices.iter().map(|p| strike(*p)).collect(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn snapshot(symbol: &str, delta: Decimal) -> (String, GreekSnapshot) {
        (
            symbol.to_string(),
            GreekSnapshot {
                symbol: symbol.to_string(),
                delta,
                computed_at: Utc::now(),
            },
        )
    }

    // ==================== Expiration Tests ====================

    #[test]
    fn test_select_expiration_closest_dte() {
        let today = date(2024, 10, 11);
        let chain = OptionChain::new(
            "SPX",
            vec![],
            vec![
                expiration(date(2024, 10, 11), &[dec!(4100)]),
                expiration(date(2024, 10, 14), &[dec!(4100)]),
                expiration(date(2024, 10, 18), &[dec!(4100)]),
            ],
        );
        assert_eq!(
            select_expiration(&chain, 3, today).unwrap().date,
            date(2024, 10, 14)
        );
        assert_eq!(
            select_expiration(&chain, 0, today).unwrap().date,
            date(2024, 10, 11)
        );
    }

    #[test]
    fn test_select_expiration_tie_goes_to_first() {
        let today = date(2024, 10, 10);
        let chain = OptionChain::new(
            "SPX",
            vec![],
            vec![
                expiration(date(2024, 10, 11), &[dec!(4100)]),
                expiration(date(2024, 10, 13), &[dec!(4100)]),
            ],
        );
        // Both are one day away from a target of 2.
        assert_eq!(
            select_expiration(&chain, 2, today).unwrap().date,
            date(2024, 10, 11)
        );
    }

    #[test]
    fn test_select_expiration_empty_chain() {
        let chain = OptionChain::new("SPX", vec![], vec![]);
        assert!(matches!(
            select_expiration(&chain, 1, date(2024, 10, 11)),
            Err(OptionsError::OptionNotFound(_))
        ));
    }

    // ==================== Window Tests ====================

    #[test]
    fn test_strike_window_middle_half() {
        let prices: Vec<Decimal> = (0..8).map(|i| Decimal::from(4000 + i * 10)).collect();
        let exp = expiration(date(2024, 10, 14), &prices);
        let window = strike_window(&exp);
        // mid = 4, quarter = 2 -> [2, 6)
        let got: Vec<Decimal> = window.iter().map(|s| s.price).collect();
        assert_eq!(got, vec![dec!(4020), dec!(4030), dec!(4040), dec!(4050)]);
    }

    #[test]
    fn test_strike_window_small_expiration_uses_all() {
        let exp = expiration(date(2024, 10, 14), &[dec!(4100), dec!(4120), dec!(4140)]);
        assert_eq!(strike_window(&exp).len(), 3);
    }

    // ==================== Anchor Tests ====================

    #[test]
    fn test_anchor_minimizes_distance_to_put_target() {
        let exp = expiration(
            date(2024, 10, 14),
            &[dec!(4080), dec!(4100), dec!(4120), dec!(4140), dec!(4160)],
        );
        let greeks: HashMap<_, _> = [
            snapshot(".SPXW241014P4080", dec!(-0.35)),
            snapshot(".SPXW241014P4100", dec!(-0.25)),
            snapshot(".SPXW241014P4120", dec!(-0.18)),
            snapshot(".SPXW241014P4140", dec!(-0.10)),
            snapshot(".SPXW241014P4160", dec!(-0.05)),
        ]
        .into_iter()
        .collect();

        let (anchor, delta) =
            select_anchor_strike(&exp.strikes, &greeks, OptionRight::Put, dec!(20)).unwrap();
        assert_eq!(anchor.price, dec!(4120));
        assert_eq!(delta, dec!(-0.18));
    }

    #[test]
    fn test_anchor_tie_goes_to_first_in_window() {
        let exp = expiration(date(2024, 10, 14), &[dec!(4100), dec!(4120)]);
        let greeks: HashMap<_, _> = [
            snapshot(".SPXW241014P4100", dec!(-0.22)),
            snapshot(".SPXW241014P4120", dec!(-0.18)),
        ]
        .into_iter()
        .collect();
        let (anchor, _) =
            select_anchor_strike(&exp.strikes, &greeks, OptionRight::Put, dec!(20)).unwrap();
        assert_eq!(anchor.price, dec!(4100));
    }

    #[test]
    fn test_anchor_call_targets_positive_delta() {
        let exp = expiration(date(2024, 10, 14), &[dec!(4200), dec!(4220)]);
        let greeks: HashMap<_, _> = [
            snapshot(".SPXW241014C4200", dec!(0.31)),
            snapshot(".SPXW241014C4220", dec!(0.21)),
        ]
        .into_iter()
        .collect();
        let (anchor, _) =
            select_anchor_strike(&exp.strikes, &greeks, OptionRight::Call, dec!(20)).unwrap();
        assert_eq!(anchor.price, dec!(4220));
    }

    #[test]
    fn test_anchor_without_greeks_is_not_found() {
        let exp = expiration(date(2024, 10, 14), &[dec!(4100)]);
        let err = select_anchor_strike(&exp.strikes, &HashMap::new(), OptionRight::Put, dec!(20))
            .unwrap_err();
        assert!(matches!(err, OptionsError::OptionNotFound(_)));
    }

    // ==================== Paired Tests ====================

    #[test]
    fn test_select_paired_by_width() {
        let exp = expiration(
            date(2024, 10, 14),
            &[dec!(4100), dec!(4120), dec!(4140)],
        );
        let anchor = strike(dec!(4120));
        assert_eq!(
            select_paired(&exp, &anchor, dec!(20), OptionRight::Put)
                .unwrap()
                .price,
            dec!(4100)
        );
        assert_eq!(
            select_paired(&exp, &anchor, dec!(20), OptionRight::Call)
                .unwrap()
                .price,
            dec!(4140)
        );
    }

    #[test]
    fn test_select_paired_missing_strike() {
        let exp = expiration(date(2024, 10, 14), &[dec!(4100), dec!(4120)]);
        let err = select_paired(&exp, &strike(dec!(4100)), dec!(20), OptionRight::Put).unwrap_err();
        assert!(matches!(
            err,
            OptionsError::StrikeNotFound { price, .. } if price == dec!(4080)
        ));
    }

    // ==================== Selector Tests ====================

    #[tokio::test]
    async fn test_selector_streams_window_and_pairs() {
        let today = date(2024, 10, 13);
        let chain = OptionChain::new(
            "SPX",
            vec![TickSize {
                value: dec!(0.05),
                threshold: None,
            }],
            vec![expiration(
                date(2024, 10, 14),
                &[dec!(4080), dec!(4100), dec!(4120), dec!(4140), dec!(4160)],
            )],
        );
        // A five-strike window is [1, 3): only 4100 and 4120 are candidates.
        let stream = ScriptedStream::new(vec![
            greeks(".SPXW241014P4080", dec!(-0.20)),
            greeks(".SPXW241014P4100", dec!(-0.25)),
            greeks(".SPXW241014P4120", dec!(-0.18)),
        ]);
        let mut aggregator = MarketDataAggregator::new(Box::new(stream));

        let selector = StrikeSelector::new(SelectionParams {
            target_dte: 1,
            target_delta_pct: dec!(20),
            width: Some(dec!(20)),
            right: OptionRight::Put,
            timeout: Duration::from_secs(5),
        });
        let selection = selector.select(&chain, today, &mut aggregator).await.unwrap();
        assert_eq!(selection.anchor.price, dec!(4120));
        assert_eq!(selection.paired.unwrap().price, dec!(4100));
        assert_eq!(selection.anchor_delta, dec!(-0.18));
    }
}
