//! Domain types shared across the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::Error;

/// Largest absolute generic-ballot margin accepted, in percentage points.
pub const MARGIN_LIMIT_POINTS: f64 = 100.0;

// ── Kalshi Market Types ───────────────────────────────────────────────

/// A Kalshi market as returned by GET /trade-api/v2/markets.
///
/// Price fields are optional: a missing price stays `None` all the way
/// through quote extraction rather than collapsing to zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketInfo {
    pub ticker: String,
    #[serde(default)]
    pub event_ticker: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub yes_bid_dollars: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub last_price_dollars: Option<f64>,
    #[serde(default)]
    pub yes_bid: Option<i64>,
    #[serde(default)]
    pub yes_ask: Option<i64>,
    #[serde(default)]
    pub last_price: Option<i64>,
    #[serde(default)]
    pub volume: i64,
    #[serde(default)]
    pub volume_24h: i64,
    #[serde(default)]
    pub open_interest: i64,
    #[serde(default)]
    pub close_time: Option<DateTime<Utc>>,
}

/// Paginated response from GET /trade-api/v2/markets.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketsResponse {
    #[serde(default)]
    pub markets: Vec<MarketInfo>,
    #[serde(default)]
    pub cursor: Option<String>,
}

/// Response from GET /trade-api/v2/markets/{ticker}.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketResponse {
    pub market: MarketInfo,
}

/// Response from GET /trade-api/v2/markets/{ticker}/orderbook.
///
/// Each side is a list of `[price_cents, quantity]` pairs; Kalshi sends
/// `null` for an empty side.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderbookResponse {
    pub orderbook: OrderbookLevels,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderbookLevels {
    #[serde(default)]
    pub yes: Option<Vec<(i64, i64)>>,
    #[serde(default)]
    pub no: Option<Vec<(i64, i64)>>,
}

/// One resting price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceLevel {
    pub price_cents: i64,
    pub quantity: i64,
}

/// Book depth for a single market.
#[derive(Debug, Clone, Serialize)]
pub struct OrderbookDepth {
    pub ticker: String,
    pub yes_levels: Vec<PriceLevel>,
    pub no_levels: Vec<PriceLevel>,
    pub yes_contracts: i64,
    pub no_contracts: i64,
}

impl OrderbookDepth {
    pub fn from_levels(ticker: &str, levels: OrderbookLevels) -> Self {
        let to_levels = |raw: Option<Vec<(i64, i64)>>| -> Vec<PriceLevel> {
            raw.unwrap_or_default()
                .into_iter()
                .map(|(price_cents, quantity)| PriceLevel {
                    price_cents,
                    quantity,
                })
                .collect()
        };
        let yes_levels = to_levels(levels.yes);
        let no_levels = to_levels(levels.no);

        Self {
            ticker: ticker.to_string(),
            yes_contracts: yes_levels.iter().map(|l| l.quantity).sum(),
            no_contracts: no_levels.iter().map(|l| l.quantity).sum(),
            yes_levels,
            no_levels,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Yes,
    No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Sell,
}

// ── Portfolio Types ───────────────────────────────────────────────────

/// Balance response.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
    /// Balance in cents.
    pub balance: i64,
    #[serde(default)]
    pub portfolio_value: i64,
}

/// Account balance in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Balance {
    pub balance_cents: i64,
    pub portfolio_value_cents: i64,
}

impl From<BalanceResponse> for Balance {
    fn from(resp: BalanceResponse) -> Self {
        Self {
            balance_cents: resp.balance,
            portfolio_value_cents: resp.portfolio_value,
        }
    }
}

/// A position in a market.
///
/// Kalshi reports money both as legacy integer cents and as fixed-point
/// dollar strings; the dollar form wins when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    /// Net contracts: positive = YES, negative = NO.
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub market_exposure: i64,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub market_exposure_dollars: Option<f64>,
    #[serde(default)]
    pub realized_pnl: i64,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub realized_pnl_dollars: Option<f64>,
    #[serde(default)]
    pub fees_paid: i64,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub fees_paid_dollars: Option<f64>,
}

impl Position {
    pub fn exposure_cents(&self) -> i64 {
        prefer_dollars(self.market_exposure_dollars, self.market_exposure)
    }

    pub fn realized_pnl_cents(&self) -> i64 {
        prefer_dollars(self.realized_pnl_dollars, self.realized_pnl)
    }

    pub fn fees_paid_cents(&self) -> i64 {
        prefer_dollars(self.fees_paid_dollars, self.fees_paid)
    }
}

/// Portfolio positions response.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionsResponse {
    #[serde(default)]
    pub market_positions: Vec<Position>,
    #[serde(default)]
    pub cursor: Option<String>,
}

/// An order resting on the book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestingOrder {
    pub order_id: String,
    pub ticker: String,
    pub side: Side,
    pub action: Action,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub yes_price: Option<i64>,
    #[serde(default)]
    pub no_price: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub yes_price_dollars: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub no_price_dollars: Option<f64>,
    #[serde(default)]
    pub remaining_count: i64,
    #[serde(default)]
    pub created_time: Option<DateTime<Utc>>,
}

impl RestingOrder {
    /// Limit price in cents on the order's own side.
    pub fn price_cents(&self) -> Option<i64> {
        let (dollars, cents) = match self.side {
            Side::Yes => (self.yes_price_dollars, self.yes_price),
            Side::No => (self.no_price_dollars, self.no_price),
        };
        dollars.map(dollars_to_cents).or(cents)
    }
}

/// Resting orders response.
#[derive(Debug, Clone, Deserialize)]
pub struct OrdersResponse {
    #[serde(default)]
    pub orders: Vec<RestingOrder>,
    #[serde(default)]
    pub cursor: Option<String>,
}

/// A settled market in the account history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    pub ticker: String,
    #[serde(default)]
    pub market_result: String,
    #[serde(default)]
    pub yes_count: i64,
    #[serde(default)]
    pub no_count: i64,
    /// Payout in cents.
    #[serde(default)]
    pub revenue: i64,
    #[serde(default)]
    pub yes_total_cost: i64,
    #[serde(default)]
    pub no_total_cost: i64,
    #[serde(default)]
    pub settled_time: Option<DateTime<Utc>>,
}

impl Settlement {
    pub fn total_cost_cents(&self) -> i64 {
        self.yes_total_cost + self.no_total_cost
    }

    pub fn net_pnl_cents(&self) -> i64 {
        self.revenue - self.total_cost_cents()
    }
}

/// Settlement history response.
#[derive(Debug, Clone, Deserialize)]
pub struct SettlementsResponse {
    #[serde(default)]
    pub settlements: Vec<Settlement>,
    #[serde(default)]
    pub cursor: Option<String>,
}

// ── Poll Types ────────────────────────────────────────────────────────

/// Generic-ballot margin (Dem minus Rep, percentage points) with its as-of time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PollReading {
    pub margin_points: f64,
    pub as_of: DateTime<Utc>,
}

impl PollReading {
    pub fn new(margin_points: f64, as_of: DateTime<Utc>) -> Result<Self, Error> {
        validate_margin(margin_points)?;
        Ok(Self {
            margin_points,
            as_of,
        })
    }

    /// Build from the two parties' vote shares.
    pub fn from_shares(dem_pct: f64, rep_pct: f64, as_of: DateTime<Utc>) -> Result<Self, Error> {
        Self::new(dem_pct - rep_pct, as_of)
    }

    /// Re-check the range invariant, e.g. after deserializing.
    pub fn validate(&self) -> Result<(), Error> {
        validate_margin(self.margin_points)
    }
}

/// Reject non-finite margins and margins outside ±100 points.
pub fn validate_margin(margin_points: f64) -> Result<(), Error> {
    if !margin_points.is_finite() || margin_points.abs() > MARGIN_LIMIT_POINTS {
        return Err(Error::InvalidInput(format!(
            "poll margin {margin_points} outside [-{MARGIN_LIMIT_POINTS}, {MARGIN_LIMIT_POINTS}]"
        )));
    }
    Ok(())
}

// ── Quote Types ───────────────────────────────────────────────────────

/// A validated YES/NO quote in integer cents.
///
/// Fields are private so `yes_price + no_price == 100` cannot be broken
/// after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketQuote {
    ticker: String,
    yes_price: i64,
    no_price: i64,
    volume: i64,
    fetched_at: DateTime<Utc>,
}

impl MarketQuote {
    pub fn new(
        ticker: impl Into<String>,
        yes_price: i64,
        volume: i64,
        fetched_at: DateTime<Utc>,
    ) -> Result<Self, Error> {
        let ticker = ticker.into();
        if !(0..=100).contains(&yes_price) {
            return Err(Error::InvalidInput(format!(
                "{ticker}: yes price {yes_price}¢ outside [0, 100]"
            )));
        }
        if volume < 0 {
            return Err(Error::InvalidInput(format!(
                "{ticker}: negative volume {volume}"
            )));
        }
        Ok(Self {
            ticker,
            yes_price,
            no_price: 100 - yes_price,
            volume,
            fetched_at,
        })
    }

    /// Build from the NO side's price.
    pub fn from_no_price(
        ticker: impl Into<String>,
        no_price: i64,
        volume: i64,
        fetched_at: DateTime<Utc>,
    ) -> Result<Self, Error> {
        let ticker = ticker.into();
        if !(0..=100).contains(&no_price) {
            return Err(Error::InvalidInput(format!(
                "{ticker}: no price {no_price}¢ outside [0, 100]"
            )));
        }
        Self::new(ticker, 100 - no_price, volume, fetched_at)
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn yes_price(&self) -> i64 {
        self.yes_price
    }

    pub fn no_price(&self) -> i64 {
        self.no_price
    }

    pub fn volume(&self) -> i64 {
        self.volume
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Market-implied probability of YES.
    pub fn yes_probability(&self) -> f64 {
        self.yes_price as f64 / 100.0
    }
}

// ── Valuation Types ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Chamber {
    House,
    Senate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Party {
    #[serde(rename = "D")]
    Dem,
    #[serde(rename = "R")]
    Rep,
}

/// Modeled probability of Democratic control of one chamber.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChamberControlEstimate {
    pub chamber: Chamber,
    pub implied_probability: f64,
}

/// Joint balance-of-power state: first letter House majority, second Senate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComboCode {
    RR,
    RD,
    DR,
    DD,
}

impl ComboCode {
    pub const ALL: [ComboCode; 4] = [ComboCode::RR, ComboCode::RD, ComboCode::DR, ComboCode::DD];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComboCode::RR => "RR",
            ComboCode::RD => "RD",
            ComboCode::DR => "DR",
            ComboCode::DD => "DD",
        }
    }

    pub fn house(&self) -> Party {
        match self {
            ComboCode::RR | ComboCode::RD => Party::Rep,
            ComboCode::DR | ComboCode::DD => Party::Dem,
        }
    }

    pub fn senate(&self) -> Party {
        match self {
            ComboCode::RR | ComboCode::DR => Party::Rep,
            ComboCode::RD | ComboCode::DD => Party::Dem,
        }
    }

    /// Match a combo market ticker by its `-RR`/`-RD`/`-DR`/`-DD` suffix.
    pub fn from_ticker(ticker: &str) -> Option<Self> {
        let upper = ticker.to_uppercase();
        Self::ALL
            .into_iter()
            .find(|code| upper.ends_with(&format!("-{}", code.as_str())))
    }

    pub fn label(&self) -> &'static str {
        match self {
            ComboCode::RR => "Rep House + Rep Senate",
            ComboCode::RD => "Rep House + Dem Senate",
            ComboCode::DR => "Dem House + Rep Senate",
            ComboCode::DD => "Dem House + Dem Senate",
        }
    }
}

impl std::fmt::Display for ComboCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One joint outcome with its modeled probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComboOutcome {
    pub code: ComboCode,
    pub probability: f64,
}

// ── Signal Types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalClass {
    StrongBuy,
    StrongSell,
    Watch,
}

impl std::fmt::Display for SignalClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SignalClass::StrongBuy => "STRONG_BUY",
            SignalClass::StrongSell => "STRONG_SELL",
            SignalClass::Watch => "WATCH",
        };
        f.write_str(s)
    }
}

/// Where a signal's market price came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PriceSource {
    /// A directly traded contract.
    Direct { ticker: String },
    /// Sum of combo legs standing in for a missing direct market.
    ComboImplied { legs: Vec<ComboCode> },
}

/// A classified comparison of fair value against market price.
///
/// Created once per refresh cycle and never mutated; the next cycle's
/// signal for the same ticker supersedes it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub ticker: String,
    /// Human-readable contract description.
    pub market: String,
    pub source: PriceSource,
    pub fair_value: f64,
    pub market_price: f64,
    pub edge: f64,
    /// Threshold applied, in probability units.
    pub threshold: f64,
    pub classification: SignalClass,
    pub generated_at: DateTime<Utc>,
}

// ── Helpers ───────────────────────────────────────────────────────────

/// Dollar amount → cents, rounded to the nearest cent.
pub fn dollars_to_cents(dollars: f64) -> i64 {
    (dollars * 100.0).round() as i64
}

fn prefer_dollars(dollars: Option<f64>, cents: i64) -> i64 {
    dollars.map(dollars_to_cents).unwrap_or(cents)
}

/// Accept a number, a numeric string, or null. Unparseable strings map to
/// `None` so the next price field can be tried.
fn de_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Num(f64),
        Str(String),
    }

    Ok(match Option::<NumOrStr>::deserialize(deserializer)? {
        None => None,
        Some(NumOrStr::Num(n)) => Some(n),
        Some(NumOrStr::Str(s)) => s.trim().parse::<f64>().ok(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_round_trip_yes_no() {
        let now = Utc::now();
        let q = MarketQuote::new("CONTROLH-2026-D", 62, 1000, now).unwrap();
        assert_eq!(q.no_price(), 38);
        assert_eq!(q.yes_price() + q.no_price(), 100);

        let back = MarketQuote::from_no_price("CONTROLH-2026-D", 38, 1000, now).unwrap();
        assert_eq!(back.yes_price(), 62);
        assert_eq!(back, q);
    }

    #[test]
    fn test_quote_rejects_out_of_range_price() {
        let now = Utc::now();
        assert!(matches!(
            MarketQuote::new("T", 101, 0, now),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            MarketQuote::new("T", -1, 0, now),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            MarketQuote::from_no_price("T", 120, 0, now),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            MarketQuote::new("T", 50, -5, now),
            Err(Error::InvalidInput(_))
        ));
        // Bounds are inclusive.
        assert!(MarketQuote::new("T", 0, 0, now).is_ok());
        assert!(MarketQuote::new("T", 100, 0, now).is_ok());
    }

    #[test]
    fn test_poll_reading_range() {
        let now = Utc::now();
        assert!(PollReading::new(4.0, now).is_ok());
        assert!(PollReading::new(-100.0, now).is_ok());
        assert!(PollReading::new(100.5, now).is_err());
        assert!(PollReading::new(f64::NAN, now).is_err());

        let r = PollReading::from_shares(47.0, 43.0, now).unwrap();
        assert!((r.margin_points - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_combo_code_from_ticker() {
        assert_eq!(
            ComboCode::from_ticker("KXBALANCEPOWERCOMBO-27FEB-DR"),
            Some(ComboCode::DR)
        );
        assert_eq!(ComboCode::from_ticker("kxbalancepowercombo-27feb-dd"), Some(ComboCode::DD));
        assert_eq!(ComboCode::from_ticker("CONTROLH-2026-D"), None);
        assert_eq!(ComboCode::DR.house(), Party::Dem);
        assert_eq!(ComboCode::DR.senate(), Party::Rep);
    }

    #[test]
    fn test_market_info_price_fields_lenient() {
        let raw = r#"{
            "ticker": "CONTROLH-2026-D",
            "yes_bid_dollars": "0.5600",
            "last_price_dollars": null,
            "yes_bid": 56,
            "volume": 1234
        }"#;
        let m: MarketInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(m.yes_bid_dollars, Some(0.56));
        assert_eq!(m.last_price_dollars, None);
        assert_eq!(m.last_price, None);
        assert_eq!(m.volume, 1234);

        let garbage = r#"{"ticker": "X", "yes_bid_dollars": "n/a"}"#;
        let m: MarketInfo = serde_json::from_str(garbage).unwrap();
        assert_eq!(m.yes_bid_dollars, None);
    }

    #[test]
    fn test_position_prefers_dollar_fields() {
        let raw = r#"{
            "ticker": "CONTROLS-2026-R",
            "position": -10,
            "market_exposure": 400,
            "market_exposure_dollars": "4.2500",
            "realized_pnl": 12
        }"#;
        let p: Position = serde_json::from_str(raw).unwrap();
        assert_eq!(p.exposure_cents(), 425);
        assert_eq!(p.realized_pnl_cents(), 12);
        assert_eq!(p.fees_paid_cents(), 0);
    }

    #[test]
    fn test_settlement_net() {
        let s = Settlement {
            ticker: "T".into(),
            market_result: "yes".into(),
            yes_count: 10,
            no_count: 0,
            revenue: 1000,
            yes_total_cost: 620,
            no_total_cost: 0,
            settled_time: None,
        };
        assert_eq!(s.net_pnl_cents(), 380);
    }

    #[test]
    fn test_orderbook_depth_handles_null_side() {
        let raw = r#"{"orderbook": {"yes": [[55, 100], [54, 20]], "no": null}}"#;
        let resp: OrderbookResponse = serde_json::from_str(raw).unwrap();
        let depth = OrderbookDepth::from_levels("T", resp.orderbook);
        assert_eq!(depth.yes_contracts, 120);
        assert_eq!(depth.no_contracts, 0);
        assert!(depth.no_levels.is_empty());
        assert_eq!(depth.yes_levels[0], PriceLevel { price_cents: 55, quantity: 100 });
    }

    #[test]
    fn test_resting_order_price() {
        let raw = r#"{
            "order_id": "abc",
            "ticker": "T",
            "side": "no",
            "action": "buy",
            "no_price": 41,
            "remaining_count": 5
        }"#;
        let o: RestingOrder = serde_json::from_str(raw).unwrap();
        assert_eq!(o.price_cents(), Some(41));
    }
}
