//! Market payload → validated quote.

use chrono::{DateTime, Utc};
use common::{dollars_to_cents, Error, MarketInfo, MarketQuote};

/// YES price in cents from a market payload.
///
/// Precedence: `yes_bid_dollars`, `last_price_dollars`, `yes_bid`,
/// `last_price`. The first field present wins; `None` when none are.
pub fn yes_price_cents(market: &MarketInfo) -> Option<i64> {
    market
        .yes_bid_dollars
        .or(market.last_price_dollars)
        .map(dollars_to_cents)
        .or(market.yes_bid)
        .or(market.last_price)
}

/// Build a validated quote. A missing or out-of-range price is an error,
/// never a zero.
pub fn quote_from_market(market: &MarketInfo, fetched_at: DateTime<Utc>) -> Result<MarketQuote, Error> {
    let yes_price = yes_price_cents(market).ok_or_else(|| {
        Error::InvalidInput(format!("{}: no yes price in market payload", market.ticker))
    })?;
    MarketQuote::new(market.ticker.clone(), yes_price, market.volume, fetched_at)
}

/// First market whose ticker ends with `suffix` (case-insensitive).
pub fn find_by_side<'a>(markets: &'a [MarketInfo], suffix: &str) -> Option<&'a MarketInfo> {
    let suffix = suffix.to_uppercase();
    markets
        .iter()
        .find(|m| m.ticker.to_uppercase().ends_with(&suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(ticker: &str) -> MarketInfo {
        serde_json::from_value(serde_json::json!({ "ticker": ticker, "volume": 10 })).unwrap()
    }

    #[test]
    fn test_dollar_fields_take_precedence() {
        let mut m = market("CONTROLH-2026-D");
        m.yes_bid = Some(40);
        m.last_price_dollars = Some(0.57);
        assert_eq!(yes_price_cents(&m), Some(57));

        m.yes_bid_dollars = Some(0.61);
        assert_eq!(yes_price_cents(&m), Some(61));
    }

    #[test]
    fn test_cent_fields_as_fallback() {
        let mut m = market("CONTROLH-2026-D");
        m.last_price = Some(48);
        assert_eq!(yes_price_cents(&m), Some(48));
        m.yes_bid = Some(47);
        assert_eq!(yes_price_cents(&m), Some(47));
    }

    #[test]
    fn test_missing_price_is_error_not_zero() {
        let m = market("CONTROLH-2026-D");
        assert_eq!(yes_price_cents(&m), None);
        assert!(matches!(
            quote_from_market(&m, Utc::now()),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_out_of_range_price_rejected() {
        let mut m = market("CONTROLH-2026-D");
        m.yes_bid = Some(130);
        assert!(quote_from_market(&m, Utc::now()).is_err());
    }

    #[test]
    fn test_quote_carries_volume() {
        let mut m = market("CONTROLS-2026-R");
        m.yes_bid_dollars = Some(0.62);
        let q = quote_from_market(&m, Utc::now()).unwrap();
        assert_eq!(q.yes_price(), 62);
        assert_eq!(q.no_price(), 38);
        assert_eq!(q.volume(), 10);
    }

    #[test]
    fn test_find_by_side() {
        let markets = vec![market("CONTROLH-2026-R"), market("controlh-2026-d")];
        assert_eq!(
            find_by_side(&markets, "-D").map(|m| m.ticker.as_str()),
            Some("controlh-2026-d")
        );
        assert!(find_by_side(&markets, "-X").is_none());
    }
}
