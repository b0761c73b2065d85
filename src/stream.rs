use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::time::{interval, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::types::Candle;

const PING_INTERVAL_SECS: u64 = 20;

/// Candles kept per buffer; must cover the deepest analysis window.
pub const BUFFER_SIZE: usize = 120;

/// Shared candle buffers keyed by "SYMBOL_TF", oldest-first.
pub type CandleMap = Arc<Mutex<HashMap<String, VecDeque<Candle>>>>;

pub fn candle_key(symbol: &str, timeframe: &str) -> String {
    format!("{}_{}", symbol, timeframe)
}

pub fn new_candle_map(symbol: &str, timeframe: &str) -> CandleMap {
    let mut map = HashMap::new();
    map.insert(candle_key(symbol, timeframe), VecDeque::with_capacity(BUFFER_SIZE));
    Arc::new(Mutex::new(map))
}

/// WS subscriber to the bridge's candle stream. Each update either replaces
/// the forming bar (same open time) or appends a new one.
pub struct BridgeWsClient {
    url: String,
    symbol: String,
    timeframe: String,
    pub candle_map: CandleMap,
}

impl BridgeWsClient {
    pub fn new(url: &str, symbol: &str, timeframe: &str, candle_map: CandleMap) -> Self {
        BridgeWsClient {
            url: url.to_string(),
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            candle_map,
        }
    }

    pub async fn connect(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (ws_stream, _) = connect_async(self.url.as_str()).await?;
        log::info!("WebSocket connected to bridge ({})", self.url);

        let (mut write, mut read) = ws_stream.split();

        let topic = format!("candle.{}.{}", self.timeframe, self.symbol);
        let sub_msg = json!({ "op": "subscribe", "args": [topic] });
        write.send(Message::Text(sub_msg.to_string())).await?;
        log::info!("Subscribed to: {}", topic);

        let candle_map = Arc::clone(&self.candle_map);
        let key = candle_key(&self.symbol, &self.timeframe);
        let mut ping_timer = interval(Duration::from_secs(PING_INTERVAL_SECS));
        ping_timer.tick().await; // consume the immediate first tick

        let mut drop_reason: Option<String> = None;

        loop {
            tokio::select! {
                _ = ping_timer.tick() => {
                    let ping = json!({"op": "ping"}).to_string();
                    if let Err(e) = write.send(Message::Text(ping)).await {
                        log::error!("WebSocket ping error: {}", e);
                        drop_reason = Some(format!("ping failed: {e}"));
                        break;
                    }
                    log::debug!("WebSocket ping sent");
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Ok(data) = serde_json::from_str::<serde_json::Value>(&text) {
                                if data["op"].as_str() == Some("pong") {
                                    log::debug!("WebSocket pong received");
                                    continue;
                                }
                                if data["topic"].as_str() != Some(topic.as_str()) {
                                    continue;
                                }
                                if let Some(rows) = data["data"].as_array() {
                                    let mut map = candle_map.lock().unwrap();
                                    if let Some(buf) = map.get_mut(&key) {
                                        for row in rows {
                                            let candle = match Self::parse_candle(row) {
                                                Some(c) => c,
                                                None => continue,
                                            };
                                            // Replace the forming bar on repeated open time
                                            if buf.back().map(|c| c.timestamp) == Some(candle.timestamp) {
                                                *buf.back_mut().unwrap() = candle;
                                            } else {
                                                buf.push_back(candle);
                                                if buf.len() > BUFFER_SIZE {
                                                    buf.pop_front();
                                                }
                                                log::debug!("[{}] candles in buffer: {}", key, buf.len());
                                            }
                                        }
                                    }
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            log::warn!("WebSocket closed by server");
                            drop_reason = Some("closed by server".into());
                            break;
                        }
                        Some(Err(e)) => {
                            log::error!("WebSocket error: {}", e);
                            drop_reason = Some(format!("{e}"));
                            break;
                        }
                        None => {
                            log::warn!("WebSocket stream ended");
                            drop_reason = Some("stream ended".into());
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        // Always return Err so reconnect_with_backoff actually reconnects
        Err(drop_reason.unwrap_or_else(|| "connection dropped".into()).into())
    }

    fn parse_candle(row: &serde_json::Value) -> Option<Candle> {
        let candle = Candle {
            timestamp: row["time"].as_i64()?,
            open: row["open"].as_f64()?,
            high: row["high"].as_f64()?,
            low: row["low"].as_f64()?,
            close: row["close"].as_f64()?,
            index: 0,
        };
        if candle.timestamp == 0 {
            return None;
        }
        Some(candle)
    }
}

pub async fn reconnect_with_backoff(
    client: &BridgeWsClient,
    max_retries: u32,
    initial_delay_secs: u64,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut retries = 0;
    let mut delay = initial_delay_secs;

    loop {
        match client.connect().await {
            Ok(_) => return Ok(()),
            Err(e) => {
                retries += 1;
                if retries >= max_retries {
                    return Err(format!("WS failed after {} retries: {}", retries, e).into());
                }
                log::warn!("WS error: {}. Reconnect in {}s… ({}/{})", e, delay, retries, max_retries);
                tokio::time::sleep(tokio::time::Duration::from_secs(delay)).await;
                delay = (delay * 2).min(300);
            }
        }
    }
}
