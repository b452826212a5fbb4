//! Market identity shared by all exchange clients

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a tradable pair on one exchange.
///
/// `id` is the exchange-native symbol (the subscription-map key); `base`
/// and `quote` are the normalized currency codes. A `Market` is created by
/// the consumer (or a market-list fetch) and never mutated afterwards; it
/// is echoed back with every event so consumers need not parse
/// exchange-native ids.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Market {
    /// Exchange-native symbol, e.g. `"BTCUSDT"` or `"XBT/USD"`
    pub id: String,
    /// Base currency code, e.g. `"BTC"`
    pub base: String,
    /// Quote currency code, e.g. `"USDT"`
    pub quote: String,
    /// Optional venue-specific market type, e.g. `"spot"` or `"futures"`
    pub market_type: Option<String>,
}

impl Market {
    /// Create a new spot market identity
    #[must_use]
    pub fn new(id: impl Into<String>, base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base: base.into(),
            quote: quote.into(),
            market_type: None,
        }
    }

    /// Set the venue-specific market type
    #[must_use]
    pub fn with_type(mut self, market_type: impl Into<String>) -> Self {
        self.market_type = Some(market_type.into());
        self
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.base, self.quote, self.id)
    }
}

/// Taker side of a trade
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Aggressor bought
    Buy,
    /// Aggressor sold
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_display() {
        let market = Market::new("XBT/USD", "BTC", "USD");
        assert_eq!(market.to_string(), "BTC/USD (XBT/USD)");
    }

    #[test]
    fn test_market_with_type() {
        let market = Market::new("BTC-PERP", "BTC", "USD").with_type("swap");
        assert_eq!(market.market_type.as_deref(), Some("swap"));
    }

    #[test]
    fn test_market_serde() -> Result<(), Box<dyn std::error::Error>> {
        let market = Market::new("BTCUSDT", "BTC", "USDT");
        let encoded = bincode::serialize(&market)?;
        let decoded: Market = bincode::deserialize(&encoded)?;
        assert_eq!(market, decoded);
        Ok(())
    }

    #[test]
    fn test_side_json_lowercase() -> Result<(), Box<dyn std::error::Error>> {
        assert_eq!(serde_json::to_string(&Side::Buy)?, "\"buy\"");
        assert_eq!(serde_json::from_str::<Side>("\"sell\"")?, Side::Sell);
        Ok(())
    }
}
