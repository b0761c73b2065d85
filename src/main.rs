#[cfg(feature = "jemalloc")]
use tikv_jemallocator::Jemalloc;
#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[cfg(feature = "jemalloc")]
fn jemalloc_purge() {
    use tikv_jemalloc_ctl::epoch;
    // Advancing the epoch causes jemalloc to evaluate all decay windows
    // and release dirty pages back to the OS via its background purge logic.
    if let Ok(e) = epoch::mib() {
        let _ = e.advance();
    }
    log::debug!("jemalloc: epoch advanced — dirty pages scheduled for release");
}

mod bridge;
mod config;
mod detector;
mod engine;
mod gateway;
mod indicators;
mod lifecycle;
mod risk;
mod signal;
mod stream;
mod types;
mod zones;

use gateway::BrokerGateway;
use std::time::Duration;

/// Seconds between evaluation cycles; the 60 s signal cooldown sits on top.
const POLL_INTERVAL_SECS: u64 = 5;
/// Cycles between heartbeat log lines (~5 min at the poll interval).
const HEARTBEAT_EVERY_CYCLES: u64 = 60;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let cfg_path = std::env::args().nth(1).unwrap_or_else(|| "config.json".to_string());
    let cfg = config::Config::load(&cfg_path)?;

    // ── WebSocket feed ────────────────────────────────────────────────────────
    let ws = stream::BridgeWsClient::new(
        &cfg.bridge.ws_url,
        &cfg.symbol.name,
        &cfg.symbol.timeframe,
        stream::new_candle_map(&cfg.symbol.name, &cfg.symbol.timeframe),
    );
    let bridge = bridge::BridgeClient::new(&cfg.bridge, ws.candle_map.clone());
    tokio::spawn(async move {
        stream::reconnect_with_backoff(&ws, 20, 5)
            .await
            .unwrap_or_else(|e| log::error!("WebSocket failed permanently: {}", e));
    });

    // ── Pre-load historical candles via REST ─────────────────────────────────
    match bridge
        .prefetch_history(&cfg.symbol.name, &cfg.symbol.timeframe, stream::BUFFER_SIZE)
        .await
    {
        Ok(n) => log::info!("[{} {}] pre-loaded {} candles", cfg.symbol.name, cfg.symbol.timeframe, n),
        Err(e) => log::warn!(
            "[{} {}] prefetch failed: {} — waiting on the WS feed to fill the cache",
            cfg.symbol.name, cfg.symbol.timeframe, e
        ),
    }

    // ── Session: day-start balance anchors the loss governor ─────────────────
    let day_start = bridge.account_balance().await?;
    let session = signal::Session::new(day_start);
    log::info!(
        "zone_trader started — {} {} | balance {:.2} | risk/trade {:.2} | daily loss limit {:.2} | magic {}",
        cfg.symbol.name,
        cfg.symbol.timeframe,
        day_start,
        cfg.trading.risk_amount,
        cfg.trading.max_daily_loss,
        cfg.trading.magic_number
    );

    // ── Main loop ─────────────────────────────────────────────────────────────
    let mut engine = engine::Engine::new(bridge, cfg, session);
    let mut cycle: u64 = 0;

    loop {
        let now = chrono::Utc::now().timestamp();
        match engine.run_cycle(now).await {
            engine::CycleOutcome::OrderPlaced(ticket) => {
                log::info!("Pending order #{} active — cooldown armed", ticket);
            }
            engine::CycleOutcome::Halted => {
                // Governor tripped — trading stays off until the process restarts
            }
            _ => {}
        }

        cycle += 1;
        if cycle % HEARTBEAT_EVERY_CYCLES == 0 {
            log::info!(
                "heartbeat: cycle {} | trading_enabled={} | last_signal_ts={}",
                cycle,
                engine.session.trading_enabled,
                engine.session.last_signal_ts
            );
            // Release unused memory pages back to the OS
            #[cfg(feature = "jemalloc")]
            jemalloc_purge();
        }

        tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;
    }
}
