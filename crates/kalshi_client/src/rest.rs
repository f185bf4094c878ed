//! REST client for the Kalshi API.
//!
//! Covers: market discovery, quotes, orderbook depth, and the read-only
//! portfolio endpoints. Public endpoints are sent unsigned; portfolio
//! endpoints require a signer and are refused locally without one.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::time::Duration;

use chrono::Utc;
use common::{
    Balance, BalanceResponse, ComboCode, Error, MarketInfo, MarketQuote, MarketResponse,
    MarketsResponse, OrderbookDepth, OrderbookResponse, OrdersResponse, Position,
    PositionsResponse, RestingOrder, Settlement, SettlementsResponse,
};
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::auth::KalshiAuth;
use crate::quote::{find_by_side, quote_from_market, yes_price_cents};
use crate::rate_limit::RateLimiter;
use crate::retry::{error_for_status, RetryPolicy};

const DEMO_BASE_URL: &str = "https://demo-api.kalshi.co";
const PROD_BASE_URL: &str = "https://api.elections.kalshi.com";
const API_PREFIX: &str = "/trade-api/v2";
const PAGE_LIMIT: u32 = 100;

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

/// Pick the REST base URL: an explicit override wins over the demo flag.
pub fn resolve_rest_base_url(use_demo: bool, override_url: Option<&str>) -> String {
    if let Some(raw) = override_url {
        let normalized = normalize_base_url(raw);
        if !normalized.is_empty() {
            info!("Using Kalshi base URL override: {}", normalized);
            return normalized;
        }
        warn!("Ignoring empty Kalshi base URL override");
    }

    if use_demo {
        DEMO_BASE_URL.to_string()
    } else {
        PROD_BASE_URL.to_string()
    }
}

fn format_reqwest_error(err: &reqwest::Error) -> String {
    // Keep chained causes so network failures (DNS/TLS/socket) are visible.
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        if !cause_msg.is_empty() && !message.contains(&cause_msg) {
            message.push_str(": ");
            message.push_str(&cause_msg);
        }
        source = cause.source();
    }

    message
}

fn summarize_response_body(raw: &str) -> String {
    const MAX_CHARS: usize = 800;
    let compact = raw.replace(['\n', '\r'], " ");
    if compact.chars().count() > MAX_CHARS {
        let cut: String = compact.chars().take(MAX_CHARS).collect();
        format!("{cut}…")
    } else {
        compact
    }
}

/// Async REST client for Kalshi trade API.
#[derive(Debug, Clone)]
pub struct KalshiRestClient {
    client: reqwest::Client,
    auth: Option<KalshiAuth>,
    base_url: String,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl KalshiRestClient {
    /// Create a new REST client.
    ///
    /// * `auth`: `None` runs in public-data-only mode.
    pub fn new(
        auth: Option<KalshiAuth>,
        base_url: impl Into<String>,
        retry: RetryPolicy,
    ) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        Ok(Self {
            client,
            auth,
            base_url: normalize_base_url(&base_url.into()),
            limiter: RateLimiter::new(),
            retry,
        })
    }

    /// Whether authenticated endpoints can be called at all.
    pub fn has_credentials(&self) -> bool {
        self.auth.is_some()
    }

    /// URL helper.
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn signer(&self) -> Result<&KalshiAuth, Error> {
        self.auth.as_ref().ok_or(Error::MissingCredentials)
    }

    // ── Transport ─────────────────────────────────────────────────────

    /// GET with bounded retry. Signed requests are re-signed on every
    /// attempt so each carries a fresh timestamp.
    async fn get_json<T: DeserializeOwned>(
        &self,
        auth: Option<&KalshiAuth>,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, Error> {
        let mut attempt = 1;
        loop {
            match self.send_once(auth, path, query).await {
                Ok(body) => return Ok(body),
                Err(e) if self.retry.can_retry(attempt, &e) => {
                    let delay = self.retry.delay_for(attempt, &e);
                    warn!(
                        "GET {} attempt {}/{} failed: {}. Retrying in {:?}",
                        path, attempt, self.retry.max_attempts, e, delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        auth: Option<&KalshiAuth>,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, Error> {
        self.limiter.wait_read().await;

        let mut req = self
            .client
            .get(self.url(path))
            .header("Accept", "application/json");
        if let Some(auth) = auth {
            req = req.headers(auth.headers("GET", path)?);
        }
        if !query.is_empty() {
            req = req.query(query);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        let status_code = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let body = resp
            .text()
            .await
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        if !(200..300).contains(&status_code) {
            return Err(error_for_status(
                status_code,
                summarize_response_body(&body),
                retry_after,
            ));
        }

        Ok(serde_json::from_str(&body)?)
    }

    /// Follow `cursor` until the server stops returning one.
    async fn get_paginated<R, T>(
        &self,
        auth: Option<&KalshiAuth>,
        path: &str,
        query: &[(&str, String)],
        split: fn(R) -> (Vec<T>, Option<String>),
    ) -> Result<Vec<T>, Error>
    where
        R: DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut page_query = query.to_vec();
            if let Some(ref c) = cursor {
                page_query.push(("cursor", c.clone()));
            }

            let (page, next) = split(self.get_json::<R>(auth, path, &page_query).await?);
            let count = page.len();
            items.extend(page);

            debug!("{}: fetched {} (total: {})", path, count, items.len());

            match next {
                Some(c) if !c.is_empty() && cursor.as_deref() != Some(c.as_str()) => {
                    cursor = Some(c)
                }
                _ => break,
            }
        }

        Ok(items)
    }

    // ── Public endpoints ──────────────────────────────────────────────

    /// Fetch markets, optionally filtered by series and status.
    ///
    /// Handles pagination automatically and returns all matching markets.
    pub async fn get_markets(
        &self,
        series_ticker: Option<&str>,
        status: Option<&str>,
        limit: u32,
    ) -> Result<Vec<MarketInfo>, Error> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(st) = series_ticker {
            query.push(("series_ticker", st.to_string()));
        }
        if let Some(s) = status {
            query.push(("status", s.to_string()));
        }

        let path = format!("{API_PREFIX}/markets");
        self.get_paginated(None, &path, &query, |r: MarketsResponse| (r.markets, r.cursor))
            .await
    }

    /// Fetch a single market by ticker.
    pub async fn get_market(&self, ticker: &str) -> Result<MarketInfo, Error> {
        let path = format!("{API_PREFIX}/markets/{ticker}");
        let w: MarketResponse = self.get_json(None, &path, &[]).await?;
        Ok(w.market)
    }

    /// Current validated quote for one ticker.
    pub async fn get_quote(&self, ticker: &str) -> Result<MarketQuote, Error> {
        let market = self.get_market(ticker).await?;
        quote_from_market(&market, Utc::now())
    }

    /// Resting depth on both sides of one market.
    pub async fn get_orderbook(&self, ticker: &str) -> Result<OrderbookDepth, Error> {
        let path = format!("{API_PREFIX}/markets/{ticker}/orderbook");
        let resp: OrderbookResponse = self.get_json(None, &path, &[]).await?;
        Ok(OrderbookDepth::from_levels(ticker, resp.orderbook))
    }

    /// Quote for the open contract in `series` whose ticker ends with `suffix`.
    ///
    /// `Ok(None)` when no such contract is listed or it has no price yet.
    pub async fn find_series_quote(
        &self,
        series: &str,
        suffix: &str,
    ) -> Result<Option<MarketQuote>, Error> {
        let markets = self.get_markets(Some(series), Some("open"), PAGE_LIMIT).await?;

        let Some(market) = find_by_side(&markets, suffix) else {
            debug!("{}: no open contract ending with {}", series, suffix);
            return Ok(None);
        };

        if yes_price_cents(market).is_none() {
            warn!("{}: listed but unpriced", market.ticker);
            return Ok(None);
        }

        quote_from_market(market, Utc::now()).map(Some)
    }

    /// Open balance-of-power combo contracts keyed by outcome code.
    ///
    /// Unpriced contracts are left out rather than quoted at zero, and a leg
    /// with an invalid price is dropped without discarding the others.
    pub async fn list_combo_outcomes(
        &self,
        series_ticker: &str,
    ) -> Result<HashMap<ComboCode, MarketQuote>, Error> {
        let markets = self
            .get_markets(Some(series_ticker), Some("open"), PAGE_LIMIT)
            .await?;
        let now = Utc::now();

        let mut outcomes = HashMap::new();
        for market in &markets {
            let Some(code) = ComboCode::from_ticker(&market.ticker) else {
                continue;
            };
            if outcomes.contains_key(&code) {
                debug!("{}: duplicate {} leg ignored", market.ticker, code);
                continue;
            }
            if yes_price_cents(market).is_none() {
                debug!("{}: combo leg {} unpriced", market.ticker, code);
                continue;
            }
            match quote_from_market(market, now) {
                Ok(quote) => {
                    outcomes.insert(code, quote);
                }
                Err(e) => warn!("{}: combo leg {} rejected: {}", market.ticker, code, e),
            }
        }

        Ok(outcomes)
    }

    // ── Authenticated endpoints ───────────────────────────────────────

    /// Available balance and portfolio value in cents.
    pub async fn get_balance(&self) -> Result<Balance, Error> {
        let auth = self.signer()?;
        let path = format!("{API_PREFIX}/portfolio/balance");
        let resp: BalanceResponse = self.get_json(Some(auth), &path, &[]).await?;
        Ok(resp.into())
    }

    /// Open (unsettled) positions.
    pub async fn list_positions(&self) -> Result<Vec<Position>, Error> {
        let auth = self.signer()?;
        let path = format!("{API_PREFIX}/portfolio/positions");
        let query = [
            ("count_filter", "position".to_string()),
            ("limit", PAGE_LIMIT.to_string()),
        ];
        self.get_paginated(Some(auth), &path, &query, |r: PositionsResponse| {
            (r.market_positions, r.cursor)
        })
        .await
    }

    /// Orders on the book that have not filled.
    pub async fn list_resting_orders(&self) -> Result<Vec<RestingOrder>, Error> {
        let auth = self.signer()?;
        let path = format!("{API_PREFIX}/portfolio/orders");
        let query = [
            ("status", "resting".to_string()),
            ("limit", PAGE_LIMIT.to_string()),
        ];
        self.get_paginated(Some(auth), &path, &query, |r: OrdersResponse| (r.orders, r.cursor))
            .await
    }

    /// Settlement history.
    pub async fn list_settlements(&self) -> Result<Vec<Settlement>, Error> {
        let auth = self.signer()?;
        let path = format!("{API_PREFIX}/portfolio/settlements");
        let query = [("limit", PAGE_LIMIT.to_string())];
        self.get_paginated(Some(auth), &path, &query, |r: SettlementsResponse| {
            (r.settlements, r.cursor)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tests::test_key;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    type Captured = Arc<Mutex<Vec<String>>>;

    /// Serve one canned response per connection, in order, recording each
    /// raw request head (lower-cased).
    async fn serve(responses: Vec<(u16, String)>) -> (String, Captured) {
        serve_with_headers(responses.into_iter().map(|(s, b)| (s, "", b)).collect()).await
    }

    /// Like `serve`, with one extra raw header line per response.
    async fn serve_with_headers(responses: Vec<(u16, &'static str, String)>) -> (String, Captured) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let sink = captured.clone();

        tokio::spawn(async move {
            for (status, extra, body) in responses {
                let (mut sock, _) = listener.accept().await.unwrap();
                let mut raw = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    let n = sock.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    raw.extend_from_slice(&buf[..n]);
                    if raw.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                sink.lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(&raw).to_lowercase());

                let extra = if extra.is_empty() {
                    String::new()
                } else {
                    format!("{extra}\r\n")
                };
                let reply = format!(
                    "HTTP/1.1 {status} STATUS\r\nContent-Type: application/json\r\nContent-Length: {}\r\n{extra}Connection: close\r\n\r\n{body}",
                    body.len()
                );
                sock.write_all(reply.as_bytes()).await.unwrap();
                sock.shutdown().await.ok();
            }
        });

        (format!("http://{addr}"), captured)
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
        }
    }

    fn signed_client(base_url: &str, retry: RetryPolicy) -> KalshiRestClient {
        let (pem, _) = test_key();
        let auth = KalshiAuth::new("test-key-id", pem).unwrap();
        KalshiRestClient::new(Some(auth), base_url, retry).unwrap()
    }

    fn header<'a>(request: &'a str, name: &str) -> Option<&'a str> {
        request
            .lines()
            .find_map(|line| line.strip_prefix(&format!("{name}: ")))
            .map(str::trim)
    }

    #[tokio::test]
    async fn test_missing_credentials_never_touches_network() {
        // Port 1 on loopback: any attempted request would fail as Http, not auth.
        let client =
            KalshiRestClient::new(None, "http://127.0.0.1:1", RetryPolicy::none()).unwrap();

        assert!(!client.has_credentials());
        assert!(matches!(client.get_balance().await, Err(Error::MissingCredentials)));
        assert!(matches!(client.list_positions().await, Err(Error::MissingCredentials)));
        assert!(matches!(client.list_resting_orders().await, Err(Error::MissingCredentials)));
        assert!(matches!(client.list_settlements().await, Err(Error::MissingCredentials)));
    }

    #[tokio::test]
    async fn test_public_quote_is_unsigned() {
        let body = r#"{"market": {"ticker": "CONTROLH-2026-D", "yes_bid_dollars": "0.6200", "volume": 500}}"#;
        let (base, captured) = serve(vec![(200, body.into())]).await;
        let client = signed_client(&base, fast_retry(1));

        let quote = client.get_quote("CONTROLH-2026-D").await.unwrap();
        assert_eq!(quote.yes_price(), 62);
        assert_eq!(quote.no_price(), 38);

        let requests = captured.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("get /trade-api/v2/markets/controlh-2026-d "));
        assert!(header(&requests[0], "kalshi-access-signature").is_none());
    }

    #[tokio::test]
    async fn test_retry_resigns_with_fresh_timestamp() {
        let (base, captured) = serve(vec![
            (503, r#"{"error": "unavailable"}"#.into()),
            (200, r#"{"balance": 12345, "portfolio_value": 6789}"#.into()),
        ])
        .await;
        let client = signed_client(&base, fast_retry(3));

        let balance = client.get_balance().await.unwrap();
        assert_eq!(balance.balance_cents, 12345);
        assert_eq!(balance.portfolio_value_cents, 6789);

        let requests = captured.lock().unwrap();
        assert_eq!(requests.len(), 2);
        let ts1 = header(&requests[0], "kalshi-access-timestamp").unwrap();
        let ts2 = header(&requests[1], "kalshi-access-timestamp").unwrap();
        assert_ne!(ts1, ts2, "retry must carry a new timestamp");
        assert_ne!(
            header(&requests[0], "kalshi-access-signature"),
            header(&requests[1], "kalshi-access-signature")
        );
        assert_eq!(header(&requests[1], "kalshi-access-key"), Some("test-key-id"));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let (base, captured) = serve(vec![
            (404, r#"{"error": "market not found"}"#.into()),
            (200, r#"{"market": {"ticker": "X", "yes_bid": 50}}"#.into()),
        ])
        .await;
        let client = signed_client(&base, fast_retry(3));

        let err = client.get_quote("BADTICKER").await.unwrap_err();
        assert!(matches!(err, Error::ClientRequest { status: 404, .. }));
        assert_eq!(captured.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_signature_is_auth_error() {
        let (base, captured) = serve(vec![
            (401, r#"{"error": "invalid signature"}"#.into()),
            (200, r#"{"balance": 1}"#.into()),
        ])
        .await;
        let client = signed_client(&base, fast_retry(3));

        let err = client.get_balance().await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(captured.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_retry_budget() {
        let (base, captured) = serve(vec![
            (500, "oops".into()),
            (502, "oops".into()),
            (500, "oops".into()),
        ])
        .await;
        let client = signed_client(&base, fast_retry(3));

        let err = client.get_balance().await.unwrap_err();
        assert!(matches!(err, Error::KalshiApi { status: 500, .. }));
        assert_eq!(captured.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_pagination_follows_cursor() {
        let page1 = r#"{"settlements": [{"ticker": "A", "revenue": 100}], "cursor": "c2"}"#;
        let page2 = r#"{"settlements": [{"ticker": "B", "revenue": 0}], "cursor": ""}"#;
        let (base, captured) = serve(vec![(200, page1.into()), (200, page2.into())]).await;
        let client = signed_client(&base, fast_retry(1));

        let settlements = client.list_settlements().await.unwrap();
        let tickers: Vec<_> = settlements.iter().map(|s| s.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["A", "B"]);

        let requests = captured.lock().unwrap();
        assert!(requests[1].contains("cursor=c2"));
        assert!(header(&requests[1], "kalshi-access-signature").is_some());
    }

    #[tokio::test]
    async fn test_combo_outcomes_skip_unpriced_legs() {
        let body = r#"{"markets": [
            {"ticker": "KXBALANCEPOWERCOMBO-27FEB-RR", "yes_bid": 30},
            {"ticker": "KXBALANCEPOWERCOMBO-27FEB-RD", "yes_bid": 5},
            {"ticker": "KXBALANCEPOWERCOMBO-27FEB-DR", "yes_bid_dollars": "0.4500"},
            {"ticker": "KXBALANCEPOWERCOMBO-27FEB-DD"}
        ], "cursor": null}"#;
        let (base, captured) = serve(vec![(200, body.into())]).await;
        let client = KalshiRestClient::new(None, base, fast_retry(1)).unwrap();

        let combos = client.list_combo_outcomes("KXBALANCEPOWERCOMBO").await.unwrap();
        assert_eq!(combos.len(), 3);
        assert_eq!(combos[&ComboCode::DR].yes_price(), 45);
        assert!(!combos.contains_key(&ComboCode::DD));

        let requests = captured.lock().unwrap();
        assert!(requests[0].contains("series_ticker=kxbalancepowercombo"));
        assert!(requests[0].contains("status=open"));
    }

    #[tokio::test]
    async fn test_find_series_quote_picks_side() {
        let body = r#"{"markets": [
            {"ticker": "CONTROLS-2026-D", "yes_bid": 40},
            {"ticker": "CONTROLS-2026-R", "yes_bid": 60, "volume": 900}
        ]}"#;
        let (base, _) = serve(vec![(200, body.into())]).await;
        let client = KalshiRestClient::new(None, base, fast_retry(1)).unwrap();

        let quote = client.find_series_quote("CONTROLS", "-R").await.unwrap().unwrap();
        assert_eq!(quote.ticker(), "CONTROLS-2026-R");
        assert_eq!(quote.yes_price(), 60);
    }

    #[tokio::test]
    async fn test_huge_retry_after_is_capped_by_max_backoff() {
        let (base, captured) = serve_with_headers(vec![
            (429, "Retry-After: 3600", r#"{"error": "too many requests"}"#.into()),
            (200, "", r#"{"balance": 500, "portfolio_value": 0}"#.into()),
        ])
        .await;
        let client = signed_client(&base, fast_retry(3));

        let started = std::time::Instant::now();
        let balance = tokio::time::timeout(Duration::from_secs(5), client.get_balance())
            .await
            .expect("rate-limit wait must stay bounded")
            .unwrap();
        assert_eq!(balance.balance_cents, 500);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(captured.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_combo_leg_with_bad_price_keeps_the_rest() {
        let body = r#"{"markets": [
            {"ticker": "KXBALANCEPOWERCOMBO-27FEB-RR", "yes_bid": 30},
            {"ticker": "KXBALANCEPOWERCOMBO-27FEB-RD", "yes_bid": 130},
            {"ticker": "KXBALANCEPOWERCOMBO-27FEB-DR", "yes_bid": 45},
            {"ticker": "KXBALANCEPOWERCOMBO-27FEB-DD", "yes_bid": 20}
        ]}"#;
        let (base, _) = serve(vec![(200, body.into())]).await;
        let client = KalshiRestClient::new(None, base, fast_retry(1)).unwrap();

        let combos = client.list_combo_outcomes("KXBALANCEPOWERCOMBO").await.unwrap();
        assert_eq!(combos.len(), 3);
        assert!(!combos.contains_key(&ComboCode::RD));
        assert_eq!(combos[&ComboCode::RR].yes_price(), 30);
        assert_eq!(combos[&ComboCode::DD].yes_price(), 20);
    }

    #[tokio::test]
    async fn test_orderbook_depth_sums_levels() {
        let body = r#"{"orderbook": {"yes": [[61, 40], [60, 15]], "no": [[38, 25]]}}"#;
        let (base, captured) = serve(vec![(200, body.into())]).await;
        let client = KalshiRestClient::new(None, base, fast_retry(1)).unwrap();

        let depth = client.get_orderbook("CONTROLH-2026-D").await.unwrap();
        assert_eq!(depth.ticker, "CONTROLH-2026-D");
        assert_eq!(depth.yes_contracts, 55);
        assert_eq!(depth.no_contracts, 25);
        assert_eq!(depth.yes_levels.len(), 2);

        let requests = captured.lock().unwrap();
        assert!(requests[0].starts_with("get /trade-api/v2/markets/controlh-2026-d/orderbook"));
    }

    #[test]
    fn test_base_url_resolution() {
        assert_eq!(resolve_rest_base_url(false, None), PROD_BASE_URL);
        assert_eq!(resolve_rest_base_url(true, None), DEMO_BASE_URL);
        assert_eq!(
            resolve_rest_base_url(false, Some("http://localhost:8080/ ")),
            "http://localhost:8080"
        );
        assert_eq!(resolve_rest_base_url(true, Some("  ")), DEMO_BASE_URL);
    }
}
