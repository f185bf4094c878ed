//! Portfolio marks: open positions valued at the current market price,
//! plus settlement P&L.

use chrono::{DateTime, Utc};
use common::{Balance, Position, RestingOrder, Settlement, Side};
use serde::Serialize;

/// One open position marked to market. Money in cents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionMark {
    pub ticker: String,
    pub side: Side,
    pub contracts: i64,
    /// YES price used for the mark; `None` if no price was available.
    pub mark_price: Option<i64>,
    pub exposure_cents: i64,
    pub realized_pnl_cents: i64,
    /// Mark value minus exposure. `None` without a mark price.
    pub unrealized_pnl_cents: Option<i64>,
    pub total_pnl_cents: Option<i64>,
    pub fees_cents: i64,
}

impl PositionMark {
    /// Mark a position at `yes_price` (cents). Flat positions yield `None`.
    pub fn new(position: &Position, yes_price: Option<i64>) -> Option<Self> {
        if position.position == 0 {
            return None;
        }

        let side = if position.position > 0 { Side::Yes } else { Side::No };
        let contracts = position.position.abs();
        let exposure = position.exposure_cents();
        let realized = position.realized_pnl_cents();

        let unrealized = yes_price.map(|price| {
            let per_contract = match side {
                Side::Yes => price,
                Side::No => 100 - price,
            };
            per_contract * contracts - exposure
        });

        Some(Self {
            ticker: position.ticker.clone(),
            side,
            contracts,
            mark_price: yes_price,
            exposure_cents: exposure,
            realized_pnl_cents: realized,
            unrealized_pnl_cents: unrealized,
            total_pnl_cents: unrealized.map(|u| u + realized),
            fees_cents: position.fees_paid_cents(),
        })
    }
}

/// Mark every non-flat position using `price_of` to look up YES prices.
pub fn mark_positions<F>(positions: &[Position], mut price_of: F) -> Vec<PositionMark>
where
    F: FnMut(&str) -> Option<i64>,
{
    positions
        .iter()
        .filter_map(|p| {
            if p.position == 0 {
                return None;
            }
            PositionMark::new(p, price_of(&p.ticker))
        })
        .collect()
}

/// One settled market with its net result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementView {
    pub ticker: String,
    pub result: String,
    pub revenue_cents: i64,
    pub cost_cents: i64,
    pub net_pnl_cents: i64,
    pub settled_time: Option<DateTime<Utc>>,
}

impl From<&Settlement> for SettlementView {
    fn from(s: &Settlement) -> Self {
        Self {
            ticker: s.ticker.clone(),
            result: s.market_result.clone(),
            revenue_cents: s.revenue,
            cost_cents: s.total_cost_cents(),
            net_pnl_cents: s.net_pnl_cents(),
            settled_time: s.settled_time,
        }
    }
}

/// Account state for one tick. Each part is `None` if its fetch failed
/// and nothing older was held.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PortfolioView {
    pub balance: Option<Balance>,
    pub positions: Option<Vec<PositionMark>>,
    pub resting_orders: Option<Vec<RestingOrder>>,
    pub settlements: Option<Vec<SettlementView>>,
}

impl PortfolioView {
    /// Sum of settlement net P&L.
    pub fn settled_pnl_cents(&self) -> Option<i64> {
        self.settlements
            .as_ref()
            .map(|s| s.iter().map(|v| v.net_pnl_cents).sum())
    }
}
