//! Signed/public REST implementation of [`ExchangeClient`].
//!
//! Signed requests carry `recvWindow`, a millisecond timestamp, and an
//! HMAC-SHA256 signature over the query string. The timing of the last
//! request is published under a small lock so observers can read it without
//! blocking the issuer.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use reqwest::Method;
use sha2::Sha256;
use tracing::debug;

use spotmm_core::{wall_clock_ms, OrderStatus};

use crate::client::{ExchangeClient, NewOrderRequest, OrderKind};
use crate::error::{ExchangeError, ExchangeResult};
use crate::types::{
    AccountInfo, DepthSnapshot, ExchangeInfoResponse, OpenOrder, OrderAck, SymbolInfo, TradeRecord,
};

const API_KEY_HEADER: &str = "X-MEXC-APIKEY";
const RECV_WINDOW_MS: &str = "10000";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// API key pair. Immutable after construction.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

/// Duration of the most recent REST call.
#[derive(Debug, Clone, Copy)]
pub struct RequestTiming {
    pub total: Duration,
}

/// Production REST client.
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    last_timing: Mutex<Option<RequestTiming>>,
}

impl RestClient {
    /// Build a client. Empty credentials are rejected here rather than on
    /// the first signed call.
    pub fn new(credentials: Credentials, base_url: impl Into<String>) -> ExchangeResult<Self> {
        if !credentials.is_complete() {
            return Err(ExchangeError::MissingCredentials);
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            credentials,
            last_timing: Mutex::new(None),
        })
    }

    /// Timing of the last completed request, if any.
    pub fn last_request_timing(&self) -> Option<RequestTiming> {
        *self.last_timing.lock()
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.credentials.api_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        params: Vec<(&str, String)>,
        signed: bool,
    ) -> ExchangeResult<String> {
        let mut query = params
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");

        if signed {
            if !query.is_empty() {
                query.push('&');
            }
            query.push_str(&format!(
                "recvWindow={RECV_WINDOW_MS}&timestamp={}",
                wall_clock_ms()
            ));
            let signature = self.sign(&query);
            query.push_str(&format!("&signature={signature}"));
        }

        let url = if query.is_empty() {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}{path}?{query}", self.base_url)
        };

        let mut request = self.http.request(method.clone(), &url);
        if signed {
            request = request.header(API_KEY_HEADER, &self.credentials.api_key);
        }

        let started = Instant::now();
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        *self.last_timing.lock() = Some(RequestTiming {
            total: started.elapsed(),
        });

        debug!(%method, path, status = status.as_u16(), elapsed_ms = started.elapsed().as_millis() as u64, "REST call");

        if status.as_u16() == 429 {
            return Err(ExchangeError::RateLimited { body });
        }
        if !status.is_success() {
            return Err(ExchangeError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl ExchangeClient for RestClient {
    async fn server_time(&self) -> ExchangeResult<i64> {
        let body = self.send(Method::GET, "/time", Vec::new(), false).await?;
        let value: serde_json::Value = serde_json::from_str(&body)?;
        value
            .get("serverTime")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ExchangeError::Malformed("time response missing serverTime".into()))
    }

    async fn exchange_info(&self, symbol: &str) -> ExchangeResult<SymbolInfo> {
        let params = vec![("symbol", symbol.to_string())];
        let body = self
            .send(Method::GET, "/exchangeInfo", params, false)
            .await?;
        let response: ExchangeInfoResponse = serde_json::from_str(&body)?;
        response
            .symbols
            .into_iter()
            .find(|entry| entry.symbol == symbol)
            .map(|entry| entry.into_symbol_info())
            .ok_or_else(|| {
                ExchangeError::Malformed(format!("exchangeInfo did not include {symbol}"))
            })
    }

    async fn depth(&self, symbol: &str, limit: u32) -> ExchangeResult<DepthSnapshot> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("limit", limit.to_string()),
        ];
        let body = self.send(Method::GET, "/depth", params, false).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn account_info(&self) -> ExchangeResult<AccountInfo> {
        let body = self.send(Method::GET, "/account", Vec::new(), true).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn open_orders(&self, symbol: &str) -> ExchangeResult<Vec<OpenOrder>> {
        let params = vec![("symbol", symbol.to_string())];
        let body = self.send(Method::GET, "/openOrders", params, true).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn new_order(&self, request: NewOrderRequest) -> ExchangeResult<OrderAck> {
        let mut params = vec![
            ("symbol", request.symbol.clone()),
            ("side", request.side.as_str().to_string()),
            ("type", request.kind.as_str().to_string()),
        ];
        if request.kind == OrderKind::Limit {
            params.push(("timeInForce", "GTC".to_string()));
        }
        if let Some(quantity) = &request.quantity {
            params.push(("quantity", quantity.clone()));
        }
        if let Some(price) = &request.price {
            params.push(("price", price.clone()));
        }
        if let Some(quote) = &request.quote_order_qty {
            params.push(("quoteOrderQty", quote.clone()));
        }
        if let Some(client_id) = &request.new_client_order_id {
            params.push(("newClientOrderId", client_id.clone()));
        }

        let body = self.send(Method::POST, "/order", params, true).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn cancel_order(&self, symbol: &str, orig_client_order_id: &str) -> ExchangeResult<()> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("origClientOrderId", orig_client_order_id.to_string()),
        ];
        self.send(Method::DELETE, "/order", params, true).await?;
        Ok(())
    }

    async fn cancel_open_orders(&self, symbol: &str) -> ExchangeResult<()> {
        let params = vec![("symbol", symbol.to_string())];
        self.send(Method::DELETE, "/openOrders", params, true).await?;
        Ok(())
    }

    async fn query_order(
        &self,
        symbol: &str,
        orig_client_order_id: &str,
    ) -> ExchangeResult<OrderStatus> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("origClientOrderId", orig_client_order_id.to_string()),
        ];
        let body = self.send(Method::GET, "/order", params, true).await?;
        let ack: OrderAck = serde_json::from_str(&body)?;
        ack.status
            .ok_or_else(|| ExchangeError::Malformed("order query missing status".into()))
    }

    async fn my_trades(
        &self,
        symbol: &str,
        from_id: Option<i64>,
        limit: u32,
    ) -> ExchangeResult<Vec<TradeRecord>> {
        let mut params = vec![
            ("symbol", symbol.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(from_id) = from_id {
            params.push(("fromId", from_id.to_string()));
        }
        let body = self.send(Method::GET, "/myTrades", params, true).await?;
        Ok(serde_json::from_str(&body)?)
    }
}
