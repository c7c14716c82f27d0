use crate::api::Exchange;
use crate::models::{Balance, Candle, CandleInterval, OrderReceipt, Orderbook, OrderbookUnit};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use governor::{Quota, RateLimiter};
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::{Client, Method, Url};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha512};
use std::num::NonZeroU32;
use std::sync::Arc;

pub const UPBIT_API_BASE: &str = "https://api.upbit.com/v1";
const RATE_LIMIT_PER_SECOND: u32 = 8;
const CANDLE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

type UpbitRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Upbit REST client
///
/// Public market data needs no credentials. Account and order endpoints are
/// signed with an HS256 JWT built from the access/secret key pair.
#[derive(Clone)]
pub struct UpbitClient {
    client: Client,
    base_url: String,
    access_key: String,
    secret_key: String,
    rate_limiter: Arc<UpbitRateLimiter>,
}

/// JWT payload expected by private endpoints
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AuthClaims {
    access_key: String,
    nonce: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_hash_alg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountEntry {
    currency: String,
    #[serde(deserialize_with = "f64_from_str")]
    balance: f64,
    #[serde(deserialize_with = "f64_from_str")]
    locked: f64,
    #[serde(deserialize_with = "f64_from_str")]
    avg_buy_price: f64,
    unit_currency: String,
}

#[derive(Debug, Deserialize)]
struct OrderbookEntry {
    market: String,
    timestamp: i64,
    total_ask_size: f64,
    total_bid_size: f64,
    orderbook_units: Vec<OrderbookUnit>,
}

#[derive(Debug, Deserialize)]
struct CandleEntry {
    market: String,
    candle_date_time_utc: String,
    opening_price: f64,
    high_price: f64,
    low_price: f64,
    trade_price: f64,
    candle_acc_trade_volume: f64,
}

#[derive(Debug, Deserialize)]
struct TickerEntry {
    trade_price: f64,
}

fn f64_from_str<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

impl UpbitClient {
    pub fn new(access_key: String, secret_key: String) -> Result<Self> {
        Self::with_base_url(UPBIT_API_BASE, access_key, secret_key)
    }

    pub fn with_base_url(base_url: &str, access_key: String, secret_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        let per_second = NonZeroU32::new(RATE_LIMIT_PER_SECOND).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_key,
            secret_key,
            rate_limiter,
        })
    }

    /// Build the bearer token for a private request
    ///
    /// `query` is the `k=v&...` string of the request parameters, if any.
    pub(crate) fn auth_token(&self, query: Option<&str>) -> Result<String> {
        let query_hash = query.map(|q| hex::encode(Sha512::digest(q.as_bytes())));
        let claims = AuthClaims {
            access_key: self.access_key.clone(),
            nonce: uuid::Uuid::new_v4().to_string(),
            query_hash_alg: query_hash.as_ref().map(|_| "SHA512".to_string()),
            query_hash,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret_key.as_bytes()),
        )
        .context("Failed to sign Upbit request")
    }

    async fn get_public(&self, path: &str, params: &[(&str, &str)]) -> Result<reqwest::Response> {
        let url = Url::parse_with_params(&format!("{}{}", self.base_url, path), params)
            .with_context(|| format!("Invalid Upbit URL for {}", path))?;

        self.rate_limiter.until_ready().await;
        let response = self.client.get(url).send().await?;
        check_status(response).await
    }

    async fn send_private(
        &self,
        method: Method,
        path: &str,
        body: &[(&str, String)],
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);

        let query = if body.is_empty() {
            None
        } else {
            Some(
                body.iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join("&"),
            )
        };
        let token = self.auth_token(query.as_deref())?;

        let mut request = self
            .client
            .request(method, &url)
            .header("Authorization", format!("Bearer {}", token));

        if !body.is_empty() {
            let payload: serde_json::Map<String, serde_json::Value> = body
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.clone())))
                .collect();
            request = request.json(&payload);
        }

        self.rate_limiter.until_ready().await;
        let response = request.send().await?;
        check_status(response).await
    }

    async fn submit_order(&self, body: &[(&str, String)]) -> Result<OrderReceipt> {
        let response = self.send_private(Method::POST, "/orders", body).await?;
        let receipt: OrderReceipt = response
            .json()
            .await
            .context("Failed to parse order response")?;

        tracing::info!(
            "Order {} accepted ({} {} on {}, state {})",
            receipt.uuid,
            receipt.side,
            receipt.ord_type,
            receipt.market,
            receipt.state
        );

        Ok(receipt)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    anyhow::bail!("Upbit API error ({}): {}", status, error_text)
}

#[async_trait]
impl Exchange for UpbitClient {
    async fn balances(&self) -> Result<Vec<Balance>> {
        let response = self.send_private(Method::GET, "/accounts", &[]).await?;
        let accounts: Vec<AccountEntry> = response
            .json()
            .await
            .context("Failed to parse accounts")?;

        Ok(accounts
            .into_iter()
            .map(|a| Balance {
                currency: a.currency,
                balance: a.balance,
                locked: a.locked,
                avg_buy_price: a.avg_buy_price,
                unit_currency: a.unit_currency,
            })
            .collect())
    }

    async fn orderbook(&self, market: &str) -> Result<Orderbook> {
        let response = self.get_public("/orderbook", &[("markets", market)]).await?;
        let entries: Vec<OrderbookEntry> = response
            .json()
            .await
            .context("Failed to parse orderbook")?;

        let entry = entries
            .into_iter()
            .next()
            .with_context(|| format!("No orderbook returned for {}", market))?;

        Ok(Orderbook {
            market: entry.market,
            timestamp: entry.timestamp,
            total_ask_size: entry.total_ask_size,
            total_bid_size: entry.total_bid_size,
            units: entry.orderbook_units,
        })
    }

    async fn candles(
        &self,
        market: &str,
        interval: CandleInterval,
        count: u32,
    ) -> Result<Vec<Candle>> {
        let path = match interval {
            CandleInterval::Day => "/candles/days",
            CandleInterval::Hour => "/candles/minutes/60",
        };
        let count = count.to_string();

        let response = self
            .get_public(path, &[("market", market), ("count", count.as_str())])
            .await?;
        let entries: Vec<CandleEntry> = response
            .json()
            .await
            .context("Failed to parse candles")?;

        let mut candles = entries
            .into_iter()
            .map(|c| -> Result<Candle> {
                let timestamp =
                    NaiveDateTime::parse_from_str(&c.candle_date_time_utc, CANDLE_TIME_FORMAT)
                        .with_context(|| {
                            format!("Invalid candle time {}", c.candle_date_time_utc)
                        })?
                        .and_utc();
                Ok(Candle {
                    market: c.market,
                    timestamp,
                    open: c.opening_price,
                    high: c.high_price,
                    low: c.low_price,
                    close: c.trade_price,
                    volume: c.candle_acc_trade_volume,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // Upbit returns newest first
        candles.sort_by_key(|c| c.timestamp);

        tracing::debug!("Fetched {} {:?} candles for {}", candles.len(), interval, market);

        Ok(candles)
    }

    async fn current_price(&self, market: &str) -> Result<f64> {
        let response = self.get_public("/ticker", &[("markets", market)]).await?;
        let tickers: Vec<TickerEntry> = response
            .json()
            .await
            .context("Failed to parse ticker")?;

        tickers
            .first()
            .map(|t| t.trade_price)
            .with_context(|| format!("No ticker returned for {}", market))
    }

    async fn buy_market(&self, market: &str, krw_amount: &str) -> Result<OrderReceipt> {
        self.submit_order(&[
            ("market", market.to_string()),
            ("side", "bid".to_string()),
            ("ord_type", "price".to_string()),
            ("price", krw_amount.to_string()),
        ])
        .await
    }

    async fn sell_market(&self, market: &str, volume: &str) -> Result<OrderReceipt> {
        self.submit_order(&[
            ("market", market.to_string()),
            ("side", "ask".to_string()),
            ("ord_type", "market".to_string()),
            ("volume", volume.to_string()),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
    use mockito::Matcher;

    fn test_client(base_url: &str) -> UpbitClient {
        UpbitClient::with_base_url(base_url, "access".to_string(), "secret".to_string()).unwrap()
    }

    fn decode_claims(token: &str) -> AuthClaims {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        decode::<AuthClaims>(token, &DecodingKey::from_secret(b"secret"), &validation)
            .unwrap()
            .claims
    }

    #[test]
    fn test_auth_token_without_query() {
        let client = test_client(UPBIT_API_BASE);
        let claims = decode_claims(&client.auth_token(None).unwrap());

        assert_eq!(claims.access_key, "access");
        assert!(!claims.nonce.is_empty());
        assert!(claims.query_hash.is_none());
        assert!(claims.query_hash_alg.is_none());
    }

    #[test]
    fn test_auth_token_hashes_query() {
        let client = test_client(UPBIT_API_BASE);
        let query = "market=KRW-BTC&side=bid&ord_type=price&price=10000";
        let claims = decode_claims(&client.auth_token(Some(query)).unwrap());

        let expected = hex::encode(Sha512::digest(query.as_bytes()));
        assert_eq!(claims.query_hash.as_deref(), Some(expected.as_str()));
        assert_eq!(claims.query_hash_alg.as_deref(), Some("SHA512"));
    }

    #[test]
    fn test_nonce_is_unique_per_request() {
        let client = test_client(UPBIT_API_BASE);
        let first = decode_claims(&client.auth_token(None).unwrap());
        let second = decode_claims(&client.auth_token(None).unwrap());
        assert_ne!(first.nonce, second.nonce);
    }

    #[tokio::test]
    async fn test_candles_are_returned_oldest_first() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/candles/days")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("market".into(), "KRW-BTC".into()),
                Matcher::UrlEncoded("count".into(), "2".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[
                    {"market":"KRW-BTC","candle_date_time_utc":"2024-10-21T00:00:00","opening_price":101.0,"high_price":110.0,"low_price":100.0,"trade_price":105.0,"candle_acc_trade_volume":12.5},
                    {"market":"KRW-BTC","candle_date_time_utc":"2024-10-20T00:00:00","opening_price":95.0,"high_price":102.0,"low_price":94.0,"trade_price":101.0,"candle_acc_trade_volume":8.0}
                ]"#,
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        let candles = client
            .candles("KRW-BTC", CandleInterval::Day, 2)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(candles.len(), 2);
        assert!(candles[0].timestamp < candles[1].timestamp);
        assert_eq!(candles[0].close, 101.0);
        assert_eq!(candles[1].close, 105.0);
        assert_eq!(candles[1].volume, 12.5);
    }

    #[tokio::test]
    async fn test_accounts_are_signed_and_parsed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/accounts")
            .match_header("authorization", Matcher::Regex("^Bearer .+".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[
                    {"currency":"KRW","balance":"1000000.0","locked":"0.0","avg_buy_price":"0","avg_buy_price_modified":false,"unit_currency":"KRW"},
                    {"currency":"BTC","balance":"0.015","locked":"0.0","avg_buy_price":"61000000","avg_buy_price_modified":false,"unit_currency":"KRW"}
                ]"#,
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        let balances = client.balances().await.unwrap();

        mock.assert_async().await;
        assert_eq!(balances.len(), 2);
        assert_eq!(balances[0].currency, "KRW");
        assert_eq!(balances[0].balance, 1_000_000.0);
        assert_eq!(balances[1].avg_buy_price, 61_000_000.0);
    }

    #[tokio::test]
    async fn test_orderbook_and_ticker() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/orderbook")
            .match_query(Matcher::UrlEncoded("markets".into(), "KRW-BTC".into()))
            .with_status(200)
            .with_body(
                r#"[{"market":"KRW-BTC","timestamp":1729500000000,"total_ask_size":3.2,"total_bid_size":4.1,
                    "orderbook_units":[{"ask_price":60010000.0,"bid_price":60000000.0,"ask_size":0.5,"bid_size":0.7}]}]"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/ticker")
            .match_query(Matcher::UrlEncoded("markets".into(), "KRW-BTC".into()))
            .with_status(200)
            .with_body(r#"[{"market":"KRW-BTC","trade_price":60005000.0}]"#)
            .create_async()
            .await;

        let client = test_client(&server.url());

        let orderbook = client.orderbook("KRW-BTC").await.unwrap();
        assert_eq!(orderbook.units.len(), 1);
        assert_eq!(orderbook.units[0].bid_price, 60_000_000.0);
        assert_eq!(orderbook.total_bid_size, 4.1);

        let price = client.current_price("KRW-BTC").await.unwrap();
        assert_eq!(price, 60_005_000.0);
    }

    #[tokio::test]
    async fn test_market_buy_posts_price_order() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/orders")
            .match_header("authorization", Matcher::Regex("^Bearer .+".to_string()))
            .match_body(Matcher::PartialJsonString(
                r#"{"market":"KRW-BTC","side":"bid","ord_type":"price","price":"10000"}"#.to_string(),
            ))
            .with_status(201)
            .with_body(
                r#"{"uuid":"9ca023a5","side":"bid","ord_type":"price","price":"10000","state":"wait","market":"KRW-BTC"}"#,
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        let receipt = client.buy_market("KRW-BTC", "10000").await.unwrap();

        mock.assert_async().await;
        assert_eq!(receipt.uuid, "9ca023a5");
        assert_eq!(receipt.side, "bid");
    }

    #[tokio::test]
    async fn test_api_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ticker")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error":{"name":"invalid_market","message":"bad market"}}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let err = client.current_price("KRW-XXX").await.unwrap_err();
        assert!(err.to_string().contains("400"));
    }
}
