//! Live quote types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Number of fractional digits kept on a tick timestamp (seconds).
const TIMESTAMP_SCALE: u32 = 4;

/// A changed row from the provider's live offer table.
///
/// Bid and ask are optional because the provider flags each field as valid or
/// not; a row missing either side is not forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferRow {
    /// Provider instrument symbol, e.g. `USD/CAD`.
    pub instrument: String,
    /// Bid price, if the provider marked it valid.
    pub bid: Option<Decimal>,
    /// Ask price, if the provider marked it valid.
    pub ask: Option<Decimal>,
}

impl OfferRow {
    /// Create a row with both sides valid.
    #[must_use]
    pub fn new(instrument: impl Into<String>, bid: Decimal, ask: Decimal) -> Self {
        Self {
            instrument: instrument.into(),
            bid: Some(bid),
            ask: Some(ask),
        }
    }

    /// Bid and ask, when both are valid.
    #[must_use]
    pub const fn quote(&self) -> Option<(Decimal, Decimal)> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some((bid, ask)),
            _ => None,
        }
    }
}

/// A live quote stamped with bridge wall-clock time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    /// Provider instrument symbol.
    pub instrument: String,
    /// Bid price.
    pub bid: Decimal,
    /// Ask price.
    pub ask: Decimal,
    /// Fractional seconds since the Unix epoch, 4 decimal places.
    pub timestamp_seconds: Decimal,
}

impl Tick {
    /// Build a tick stamped with the current wall-clock time.
    #[must_use]
    pub fn now(instrument: impl Into<String>, bid: Decimal, ask: Decimal) -> Self {
        Self::at(instrument, bid, ask, Utc::now())
    }

    /// Build a tick stamped with the given time.
    #[must_use]
    pub fn at(instrument: impl Into<String>, bid: Decimal, ask: Decimal, at: DateTime<Utc>) -> Self {
        Self {
            instrument: instrument.into(),
            bid,
            ask,
            timestamp_seconds: Decimal::new(at.timestamp_micros(), 6).round_dp(TIMESTAMP_SCALE),
        }
    }

    /// Wire pair name (`USD/CAD` becomes `usdcad`).
    #[must_use]
    pub fn pair(&self) -> String {
        normalize_pair(&self.instrument)
    }
}

/// Strip the `/` separator and lowercase a provider symbol.
#[must_use]
pub fn normalize_pair(instrument: &str) -> String {
    instrument.replace('/', "").to_lowercase()
}
