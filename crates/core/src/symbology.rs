//! Option instrument identifiers.
//!
//! Brokerage identifiers use the fixed-width OCC layout:
//! root padded with spaces, `YYMMDD`, a `C`/`P` marker, then the strike
//! multiplied by 1000 as 8 zero-padded digits.
//!
//! ```text
//! SPXW  241014P05850000
//! ^^^^^^ root (6)
//!       ^^^^^^ expiration
//!             ^ right
//!              ^^^^^^^^ strike x 1000
//! ```
//!
//! The streaming feed uses a compact form of the same contract:
//! `.SPXW241014P5850`.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

const STRIKE_DIGITS: usize = 8;
const DATE_DIGITS: usize = 6;
const OCC_ROOT_WIDTH: usize = 6;
const STRIKE_SCALE: u32 = 3;

/// Errors raised while decoding an instrument identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    #[error("symbol too short: {0:?}")]
    TooShort(String),

    #[error("invalid expiration in symbol {0:?}")]
    InvalidExpiration(String),

    #[error("invalid option marker in symbol {0:?}")]
    InvalidRight(String),

    #[error("invalid strike in symbol {0:?}")]
    InvalidStrike(String),

    #[error("missing root in symbol {0:?}")]
    MissingRoot(String),
}

/// Option contract right (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionRight {
    Call,
    Put,
}

impl OptionRight {
    /// Single-character marker used in identifiers.
    #[must_use]
    pub const fn marker(self) -> char {
        match self {
            Self::Call => 'C',
            Self::Put => 'P',
        }
    }

    fn from_marker(c: char) -> Option<Self> {
        match c {
            'C' => Some(Self::Call),
            'P' => Some(Self::Put),
            _ => None,
        }
    }

    /// Upper-case name used in execution records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Call => "CALL",
            Self::Put => "PUT",
        }
    }
}

impl std::fmt::Display for OptionRight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "Call"),
            Self::Put => write!(f, "Put"),
        }
    }
}

/// A decoded option identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSymbol {
    pub root: String,
    pub expiration: NaiveDate,
    pub right: OptionRight,
    pub strike: Decimal,
}

impl OptionSymbol {
    /// Parses a fixed-width brokerage identifier.
    ///
    /// Fields are read from the right so roots of any length work, padded
    /// (`"SPXW  241014P05850000"`) or not (`"SPX241014P05850000"`).
    ///
    /// # Errors
    /// Returns [`SymbolError`] if any fixed-width field is malformed.
    pub fn parse(symbol: &str) -> Result<Self, SymbolError> {
        let raw = symbol.trim_end();
        if !raw.is_ascii() || raw.len() < STRIKE_DIGITS + DATE_DIGITS + 1 {
            return Err(SymbolError::TooShort(symbol.to_string()));
        }

        let strike_start = raw.len() - STRIKE_DIGITS;
        let marker_pos = strike_start - 1;
        let date_start = marker_pos - DATE_DIGITS;

        let root = raw[..date_start].trim();
        if root.is_empty() {
            return Err(SymbolError::MissingRoot(symbol.to_string()));
        }

        let expiration = parse_expiration(&raw[date_start..marker_pos])
            .ok_or_else(|| SymbolError::InvalidExpiration(symbol.to_string()))?;

        let right = raw[marker_pos..strike_start]
            .chars()
            .next()
            .and_then(OptionRight::from_marker)
            .ok_or_else(|| SymbolError::InvalidRight(symbol.to_string()))?;

        let digits = &raw[strike_start..];
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(SymbolError::InvalidStrike(symbol.to_string()));
        }
        let thousandths =
            i64::from_str(digits).map_err(|_| SymbolError::InvalidStrike(symbol.to_string()))?;

        Ok(Self {
            root: root.to_string(),
            expiration,
            right,
            strike: Decimal::new(thousandths, STRIKE_SCALE),
        })
    }

    /// Streaming feed form, e.g. `.SPXW241014P5850`.
    #[must_use]
    pub fn streamer_symbol(&self) -> String {
        format!(
            ".{}{}{}{}",
            self.root,
            self.expiration.format("%y%m%d"),
            self.right.marker(),
            self.strike.normalize()
        )
    }

    /// Fixed-width brokerage form, e.g. `SPXW  241014P05850000`.
    #[must_use]
    pub fn occ_symbol(&self) -> String {
        let thousandths = (self.strike * Decimal::from(1000)).trunc();
        format!(
            "{:<width$}{}{}{:0>8}",
            self.root,
            self.expiration.format("%y%m%d"),
            self.right.marker(),
            thousandths.to_string(),
            width = OCC_ROOT_WIDTH
        )
    }
}

impl FromStr for OptionSymbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_expiration(digits: &str) -> Option<NaiveDate> {
    if digits.len() != DATE_DIGITS || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let year: i32 = digits[0..2].parse().ok()?;
    let month: u32 = digits[2..4].parse().ok()?;
    let day: u32 = digits[4..6].parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + year, month, day)
}

/// Converts a brokerage identifier to its streaming feed form.
///
/// # Errors
/// Returns [`SymbolError`] if the identifier cannot be decoded.
pub fn to_streamer_symbol(symbol: &str) -> Result<String, SymbolError> {
    OptionSymbol::parse(symbol).map(|s| s.streamer_symbol())
}

/// Extracts the expiration date (`20YY-MM-DD`) from a brokerage identifier.
///
/// # Errors
/// Returns [`SymbolError`] if the identifier cannot be decoded.
pub fn expiration_of(symbol: &str) -> Result<NaiveDate, SymbolError> {
    OptionSymbol::parse(symbol).map(|s| s.expiration)
}

/// Extracts the strike price from a brokerage identifier.
///
/// # Errors
/// Returns [`SymbolError`] if the identifier cannot be decoded.
pub fn strike_of(symbol: &str) -> Result<Decimal, SymbolError> {
    OptionSymbol::parse(symbol).map(|s| s.strike)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // ==================== Parsing Tests ====================

    #[test]
    fn test_parse_padded_spxw_put() {
        let sym = OptionSymbol::parse("SPXW  241014P05850000").unwrap();
        assert_eq!(sym.root, "SPXW");
        assert_eq!(sym.expiration, NaiveDate::from_ymd_opt(2024, 10, 14).unwrap());
        assert_eq!(sym.right, OptionRight::Put);
        assert_eq!(sym.strike, dec!(5850.00));
    }

    #[test]
    fn test_parse_unpadded_root() {
        let sym = OptionSymbol::parse("SPX230616P04125000").unwrap();
        assert_eq!(sym.root, "SPX");
        assert_eq!(sym.strike, dec!(4125));
        assert_eq!(sym.expiration, NaiveDate::from_ymd_opt(2023, 6, 16).unwrap());
    }

    #[test]
    fn test_parse_call_with_fractional_strike() {
        let sym = OptionSymbol::parse("SPY   250117C00512500").unwrap();
        assert_eq!(sym.right, OptionRight::Call);
        assert_eq!(sym.strike, dec!(512.5));
    }

    #[test]
    fn test_parse_rejects_short_symbol() {
        assert!(matches!(
            OptionSymbol::parse("SPX"),
            Err(SymbolError::TooShort(_))
        ));
    }

    #[test]
    fn test_parse_rejects_bad_marker() {
        assert!(matches!(
            OptionSymbol::parse("SPXW  241014X05850000"),
            Err(SymbolError::InvalidRight(_))
        ));
    }

    #[test]
    fn test_parse_rejects_bad_date() {
        assert!(matches!(
            OptionSymbol::parse("SPXW  241340P05850000"),
            Err(SymbolError::InvalidExpiration(_))
        ));
    }

    #[test]
    fn test_parse_rejects_missing_root() {
        assert!(matches!(
            OptionSymbol::parse("241014P05850000"),
            Err(SymbolError::MissingRoot(_))
        ));
    }

    // ==================== Conversion Tests ====================

    #[test]
    fn test_streamer_symbol_conversion() {
        assert_eq!(
            to_streamer_symbol("SPXW  241014P05850000").unwrap(),
            ".SPXW241014P5850"
        );
        assert_eq!(
            expiration_of("SPXW  241014P05850000").unwrap(),
            NaiveDate::from_ymd_opt(2024, 10, 14).unwrap()
        );
        assert_eq!(strike_of("SPXW  241014P05850000").unwrap(), dec!(5850.00));
    }

    #[test]
    fn test_streamer_symbol_keeps_fraction() {
        assert_eq!(
            to_streamer_symbol("SPY   250117C00512500").unwrap(),
            ".SPY250117C512.5"
        );
    }

    #[test]
    fn test_occ_symbol_pads_root_and_strike() {
        let sym = OptionSymbol::parse("SPXW  241014P05850000").unwrap();
        assert_eq!(sym.occ_symbol(), "SPXW  241014P05850000");

        let spy = OptionSymbol::parse("SPY250117C00512500").unwrap();
        assert_eq!(spy.occ_symbol(), "SPY   250117C00512500");
    }

    #[test]
    fn test_from_str() {
        let sym: OptionSymbol = "SPXW  241014C05850000".parse().unwrap();
        assert_eq!(sym.right, OptionRight::Call);
    }

    #[test]
    fn test_right_strings() {
        assert_eq!(OptionRight::Put.as_str(), "PUT");
        assert_eq!(OptionRight::Call.marker(), 'C');
        assert_eq!(OptionRight::Put.to_string(), "Put");
    }
}
