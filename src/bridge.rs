use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::BridgeConfig;
use crate::gateway::{BrokerGateway, GatewayError};
use crate::stream::{candle_key, CandleMap};
use crate::types::{Candle, InstrumentLimits, OrderRequest, OrderResult, PositionState};

type HmacSha256 = Hmac<Sha256>;

/// MT5 trade retcodes the bridge passes through verbatim.
const RETCODE_DONE: i64 = 10009;
const RETCODE_PLACED: i64 = 10008;

/// Retry transient transport failures with exponential backoff. Order and
/// modification calls never go through here — a failed submission is
/// abandoned for the cycle, not resent.
async fn with_retry<F, Fut, T>(operation: F, max_retries: u32) -> Result<T, GatewayError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut retries = 0;
    let mut delay: u64 = 1;
    loop {
        match operation().await {
            Ok(r) => return Ok(r),
            Err(GatewayError::Transport(msg)) => {
                if retries >= max_retries {
                    return Err(GatewayError::Transport(msg));
                }
                log::warn!("Bridge transport error: {} — retry in {}s ({}/{})", msg, delay, retries + 1, max_retries);
                tokio::time::sleep(Duration::from_secs(delay)).await;
                delay = (delay * 2).min(30);
                retries += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// REST client for the MT5 bridge. Market data is served from the WS-fed
/// candle cache; everything else is a signed HTTP call.
#[derive(Clone)]
pub struct BridgeClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    retry_attempts: u32,
    cache: CandleMap,
}

impl BridgeClient {
    pub fn new(cfg: &BridgeConfig, cache: CandleMap) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(Duration::from_secs(cfg.connection_timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("HTTP client build failed");

        let api_key = std::env::var("BRIDGE_API_KEY").expect("BRIDGE_API_KEY env var not set");
        let api_secret = std::env::var("BRIDGE_SECRET").expect("BRIDGE_SECRET env var not set");

        BridgeClient {
            client,
            base_url: cfg.base_url.clone(),
            api_key,
            api_secret,
            retry_attempts: cfg.retry_attempts,
            cache,
        }
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(self.api_secret.as_bytes()).expect("HMAC init failed");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Signed GET; `path_query` carries the query string. The envelope is
    /// `{retcode, msg, data}` with retcode 0 when the bridge served the
    /// request; a non-zero envelope retcode means the terminal had no data.
    async fn signed_get(&self, path_query: &str) -> Result<serde_json::Value, GatewayError> {
        let ts = Self::timestamp_ms().to_string();
        let query = path_query.split('?').nth(1).unwrap_or("");
        let payload = format!("{}{}{}", ts, self.api_key, query);
        let signature = self.sign(&payload);

        let url = format!("{}{}", self.base_url, path_query);
        let resp = self
            .client
            .get(&url)
            .header("X-BRIDGE-API-KEY", &self.api_key)
            .header("X-BRIDGE-TIMESTAMP", &ts)
            .header("X-BRIDGE-SIGN", signature)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(format!("HTTP error: {}", e)))?;

        if resp.status().is_server_error() {
            return Err(GatewayError::Transport(format!("HTTP {}", resp.status())));
        }
        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| GatewayError::Transport(format!("parse error: {}", e)))?;

        let retcode = json["retcode"].as_i64().unwrap_or(-1);
        if retcode != 0 {
            let msg = json["msg"].as_str().unwrap_or("unknown");
            return Err(GatewayError::DataUnavailable(format!("retcode={} msg={}", retcode, msg)));
        }
        Ok(json["data"].clone())
    }

    /// Signed POST with a JSON body. Non-zero envelope retcodes surface as
    /// rejections since every POST is a trade operation.
    async fn signed_post(&self, path: &str, body: String) -> Result<serde_json::Value, GatewayError> {
        let ts = Self::timestamp_ms().to_string();
        let payload = format!("{}{}{}", ts, self.api_key, body);
        let signature = self.sign(&payload);

        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .header("X-BRIDGE-API-KEY", &self.api_key)
            .header("X-BRIDGE-TIMESTAMP", &ts)
            .header("X-BRIDGE-SIGN", signature)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(format!("HTTP error: {}", e)))?;

        if resp.status().is_server_error() {
            return Err(GatewayError::Transport(format!("HTTP {}", resp.status())));
        }
        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| GatewayError::Transport(format!("parse error: {}", e)))?;

        let retcode = json["retcode"].as_i64().unwrap_or(-1);
        if retcode != 0 {
            let msg = json["msg"].as_str().unwrap_or("unknown").to_string();
            return Err(GatewayError::Rejected { retcode, msg });
        }
        Ok(json["data"].clone())
    }

    fn parse_candle(row: &serde_json::Value) -> Option<Candle> {
        Some(Candle {
            timestamp: row["time"].as_i64()?,
            open: row["open"].as_f64()?,
            high: row["high"].as_f64()?,
            low: row["low"].as_f64()?,
            close: row["close"].as_f64()?,
            index: 0,
        })
    }

    /// Warm the candle cache over REST before the WS stream takes over.
    /// Bridge returns rates oldest-first (copy_rates order).
    pub async fn prefetch_history(
        &self,
        symbol: &str,
        timeframe: &str,
        count: usize,
    ) -> Result<usize, GatewayError> {
        let s = self.clone();
        let sym = symbol.to_string();
        let tf = timeframe.to_string();
        let data = with_retry(
            || {
                let s = s.clone();
                let sym = sym.clone();
                let tf = tf.clone();
                async move {
                    s.signed_get(&format!(
                        "/api/v1/candles?symbol={}&timeframe={}&count={}",
                        sym, tf, count
                    ))
                    .await
                }
            },
            self.retry_attempts,
        )
        .await?;

        let rows = data
            .as_array()
            .ok_or_else(|| GatewayError::DataUnavailable("candles: missing array".into()))?;
        let candles: Vec<Candle> = rows.iter().filter_map(Self::parse_candle).collect();

        let mut map = self.cache.lock().unwrap();
        let buf = map.entry(candle_key(symbol, timeframe)).or_default();
        for c in candles {
            if buf.back().map(|b| b.timestamp) == Some(c.timestamp) {
                *buf.back_mut().unwrap() = c;
            } else {
                buf.push_back(c);
            }
        }
        Ok(buf.len())
    }
}

impl BrokerGateway for BridgeClient {
    async fn candles(
        &self,
        symbol: &str,
        timeframe: &str,
        count: usize,
    ) -> Result<Vec<Candle>, GatewayError> {
        let map = self.cache.lock().unwrap();
        let buf = map
            .get(&candle_key(symbol, timeframe))
            .ok_or_else(|| GatewayError::DataUnavailable(format!("{} {}: no candle buffer", symbol, timeframe)))?;
        if buf.len() < count {
            return Err(GatewayError::DataUnavailable(format!(
                "{} {}: {} candles cached, {} required",
                symbol, timeframe, buf.len(), count
            )));
        }
        Ok(buf
            .iter()
            .rev()
            .take(count)
            .enumerate()
            .map(|(i, c)| {
                let mut c = c.clone();
                c.index = i;
                c
            })
            .collect())
    }

    async fn spread(&self, symbol: &str) -> Result<f64, GatewayError> {
        let s = self.clone();
        let sym = symbol.to_string();
        let data = with_retry(
            || {
                let s = s.clone();
                let sym = sym.clone();
                async move { s.signed_get(&format!("/api/v1/tick?symbol={}", sym)).await }
            },
            self.retry_attempts,
        )
        .await?;

        let bid = data["bid"]
            .as_f64()
            .ok_or_else(|| GatewayError::DataUnavailable("tick: missing bid".into()))?;
        let ask = data["ask"]
            .as_f64()
            .ok_or_else(|| GatewayError::DataUnavailable("tick: missing ask".into()))?;
        Ok(ask - bid)
    }

    async fn instrument_limits(&self, symbol: &str) -> Result<InstrumentLimits, GatewayError> {
        let s = self.clone();
        let sym = symbol.to_string();
        let data = with_retry(
            || {
                let s = s.clone();
                let sym = sym.clone();
                async move { s.signed_get(&format!("/api/v1/symbol_info?symbol={}", sym)).await }
            },
            self.retry_attempts,
        )
        .await?;

        let field = |name: &str| {
            data[name]
                .as_f64()
                .ok_or_else(|| GatewayError::DataUnavailable(format!("symbol_info: missing {}", name)))
        };
        Ok(InstrumentLimits {
            tick_value: field("trade_tick_value")?,
            tick_size: field("trade_tick_size")?,
            min_lot: field("volume_min")?,
            max_lot: field("volume_max")?,
            lot_step: field("volume_step")?,
        })
    }

    async fn account_balance(&self) -> Result<f64, GatewayError> {
        let s = self.clone();
        let data = with_retry(
            || {
                let s = s.clone();
                async move { s.signed_get("/api/v1/account").await }
            },
            self.retry_attempts,
        )
        .await?;
        data["balance"]
            .as_f64()
            .ok_or_else(|| GatewayError::DataUnavailable("account: missing balance".into()))
    }

    async fn account_equity(&self) -> Result<f64, GatewayError> {
        let s = self.clone();
        let data = with_retry(
            || {
                let s = s.clone();
                async move { s.signed_get("/api/v1/account").await }
            },
            self.retry_attempts,
        )
        .await?;
        data["equity"]
            .as_f64()
            .ok_or_else(|| GatewayError::DataUnavailable("account: missing equity".into()))
    }

    async fn submit_pending_order(&self, req: &OrderRequest) -> Result<OrderResult, GatewayError> {
        let body = serde_json::json!({
            "symbol":  req.symbol,
            "type":    "sell_limit",
            "volume":  format!("{:.2}", req.lots),
            "price":   req.entry_price,
            "sl":      req.stop_loss,
            "tp":      req.take_profit,
            "magic":   req.magic,
            "comment": req.comment,
        })
        .to_string();

        let data = self.signed_post("/api/v1/order", body).await?;
        let retcode = data["retcode"].as_i64().unwrap_or(-1);
        if retcode != RETCODE_DONE && retcode != RETCODE_PLACED {
            let msg = data["msg"].as_str().unwrap_or("unknown").to_string();
            return Err(GatewayError::Rejected { retcode, msg });
        }
        let ticket = data["ticket"].as_u64().unwrap_or(0);
        Ok(OrderResult { ticket, retcode })
    }

    async fn modify_position(
        &self,
        ticket: u64,
        stop_loss: f64,
        take_profit: f64,
    ) -> Result<(), GatewayError> {
        let body = serde_json::json!({
            "ticket": ticket,
            "sl":     stop_loss,
            "tp":     take_profit,
        })
        .to_string();

        let data = self.signed_post("/api/v1/position/modify", body).await?;
        let retcode = data["retcode"].as_i64().unwrap_or(-1);
        if retcode != RETCODE_DONE {
            let msg = data["msg"].as_str().unwrap_or("unknown").to_string();
            return Err(GatewayError::Rejected { retcode, msg });
        }
        Ok(())
    }

    async fn open_positions(
        &self,
        symbol: &str,
        magic: i64,
    ) -> Result<Vec<PositionState>, GatewayError> {
        let s = self.clone();
        let sym = symbol.to_string();
        let data = with_retry(
            || {
                let s = s.clone();
                let sym = sym.clone();
                async move {
                    s.signed_get(&format!("/api/v1/positions?symbol={}&magic={}", sym, magic))
                        .await
                }
            },
            self.retry_attempts,
        )
        .await?;

        let rows = match data.as_array() {
            Some(r) => r,
            None => return Ok(Vec::new()),
        };

        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(PositionState {
                    ticket: row["ticket"].as_u64()?,
                    symbol: row["symbol"].as_str()?.to_string(),
                    magic: row["magic"].as_i64().unwrap_or(0),
                    open_price: row["price_open"].as_f64()?,
                    stop_loss: row["sl"].as_f64().unwrap_or(0.0),
                    take_profit: row["tp"].as_f64().unwrap_or(0.0),
                    // MT5 position type: 0 = buy, 1 = sell
                    is_short: row["type"].as_i64() == Some(1),
                    current_price: row["price_current"].as_f64()?,
                })
            })
            .filter(|p| p.magic == magic)
            .collect())
    }
}
