use crate::config::Config;
use crate::detector::MOMENTUM_WINDOW;
use crate::gateway::BrokerGateway;
use crate::indicators;
use crate::lifecycle;
use crate::risk;
use crate::signal::{self, BlockReason, CycleInputs, Session, Verdict};
use crate::types::RiskPlan;

/// What a single cycle amounted to. Every variant short of `OrderPlaced`
/// means "do nothing further this cycle" — no outcome is fatal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CycleOutcome {
    /// Governor tripped — trading stays off for the process lifetime.
    Halted,
    DataUnavailable,
    NoSignal(BlockReason),
    SizingRejected,
    OrderRejected,
    OrderPlaced(u64),
}

/// Per-cycle orchestration: governor gate → breakeven pass → signal
/// aggregation → sizing → submission. Holds the only state that survives
/// between cycles (the session context).
pub struct Engine<G: BrokerGateway> {
    gateway: G,
    cfg: Config,
    pub session: Session,
}

impl<G: BrokerGateway> Engine<G> {
    pub fn new(gateway: G, cfg: Config, session: Session) -> Self {
        Engine { gateway, cfg, session }
    }

    /// Candles needed to cover the zone window, MACD warmup and the
    /// momentum window at once.
    pub fn series_depth(&self) -> usize {
        let a = &self.cfg.analysis;
        (a.lookback_period + 5)
            .max(a.macd_slow + a.macd_signal)
            .max(MOMENTUM_WINDOW)
    }

    pub async fn run_cycle(&mut self, now: i64) -> CycleOutcome {
        if !self.session.trading_enabled {
            return CycleOutcome::Halted;
        }
        let symbol = self.cfg.symbol.name.clone();

        let balance = match self.gateway.account_balance().await {
            Ok(b) => b,
            Err(e) => {
                log::warn!("[{}] balance unavailable: {}", symbol, e);
                return CycleOutcome::DataUnavailable;
            }
        };
        if risk::enforce_daily_loss(&mut self.session, balance, self.cfg.trading.max_daily_loss) {
            return CycleOutcome::Halted;
        }

        // Breakeven pass doubles as the open-position census for the
        // aggregator; if the scan fails we know nothing and sit out.
        let positions = match lifecycle::management_pass(
            &self.gateway,
            &symbol,
            self.cfg.trading.magic_number,
        )
        .await
        {
            Ok(p) => p,
            Err(e) => {
                log::warn!("[{}] position scan failed: {}", symbol, e);
                return CycleOutcome::DataUnavailable;
            }
        };

        let limits = match self.gateway.instrument_limits(&symbol).await {
            Ok(l) => l,
            Err(e) => {
                log::warn!("[{}] instrument limits unavailable: {}", symbol, e);
                return CycleOutcome::DataUnavailable;
            }
        };
        let candles = match self
            .gateway
            .candles(&symbol, &self.cfg.symbol.timeframe, self.series_depth())
            .await
        {
            Ok(c) => c,
            Err(e) => {
                log::warn!("[{}] candles unavailable: {}", symbol, e);
                return CycleOutcome::DataUnavailable;
            }
        };
        let spread = match self.gateway.spread(&symbol).await {
            Ok(s) => s,
            Err(e) => {
                log::warn!("[{}] spread unavailable: {}", symbol, e);
                return CycleOutcome::DataUnavailable;
            }
        };

        let macd = indicators::macd(
            &candles,
            self.cfg.analysis.macd_fast,
            self.cfg.analysis.macd_slow,
            self.cfg.analysis.macd_signal,
        );
        let inputs = CycleInputs {
            candles: &candles,
            macd: &macd,
            spread,
            open_positions: positions.len(),
            now,
        };

        let (support, resistance) = match signal::evaluate(&self.session, &self.cfg, &limits, &inputs) {
            Verdict::Blocked(reason) => {
                if self.cfg.logging.log_analysis {
                    log::info!("[{}] idle: {}", symbol, reason);
                }
                return CycleOutcome::NoSignal(reason);
            }
            Verdict::Ready { support, resistance } => (support, resistance),
        };

        log::info!(
            "[{}] signal confirmed | support {:.5} ({} touches) | resistance {:.5} ({} touches) | spread {:.5}",
            symbol, support.price, support.touch_count, resistance.price, resistance.touch_count, spread
        );

        let equity = match self.gateway.account_equity().await {
            Ok(e) => e,
            Err(e) => {
                log::warn!("[{}] equity unavailable: {}", symbol, e);
                return CycleOutcome::DataUnavailable;
            }
        };

        let (entry, stop_loss, take_profit) = lifecycle::plan_levels(
            support.price,
            resistance.price,
            self.cfg.trading.min_risk_reward,
        );
        let lots = match risk::size_position(
            self.cfg.trading.risk_amount,
            stop_loss,
            entry,
            &limits,
            equity,
            self.cfg.trading.max_risk_percent,
        ) {
            Ok(l) => l,
            Err(e) => {
                log::warn!("[{}] sizing rejected: {}", symbol, e);
                return CycleOutcome::SizingRejected;
            }
        };

        let plan = RiskPlan { entry_price: entry, stop_loss, take_profit, lot_size: lots };
        match lifecycle::submit_entry(
            &self.gateway,
            &symbol,
            self.cfg.trading.magic_number,
            &plan,
            &mut self.session,
            now,
        )
        .await
        {
            Some(ticket) => CycleOutcome::OrderPlaced(ticket),
            None => CycleOutcome::OrderRejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::MockGateway;
    use crate::types::{Candle, PositionState};

    /// Short MACD periods and lookback keep the fixture at 15 candles.
    fn test_cfg() -> Config {
        let mut cfg = Config::default();
        cfg.analysis.lookback_period = 10;
        cfg.analysis.macd_fast = 3;
        cfg.analysis.macd_slow = 6;
        cfg.analysis.macd_signal = 3;
        cfg.analysis.min_zone_touches = 1;
        cfg
    }

    /// Decline into a support trough, a four-candle bullish push with a
    /// resistance wick at 1.1060, a steady climb and a final wide bearish
    /// bar sweeping 1.1065 before closing at 1.1012. Passes every filter:
    /// MACD 3/6/3 crosses bearish on the last bar, support 1.0950 <
    /// resistance 1.1060, and the 1.1038–1.1065 gap spans the resistance.
    fn fixture_candles() -> Vec<Candle> {
        let rows: [(f64, f64, f64, f64); 15] = [
            (1.1030, 1.1032, 1.1018, 1.1020),
            (1.1020, 1.1022, 1.1003, 1.1005),
            (1.1005, 1.1007, 1.0988, 1.0990),
            (1.0990, 1.0992, 1.0973, 1.0975),
            (1.0975, 1.0977, 1.0950, 1.0970), // support low
            (1.0970, 1.0982, 1.0968, 1.0980),
            (1.0980, 1.1060, 1.0978, 1.0990), // resistance wick
            (1.0990, 1.1002, 1.0988, 1.1000),
            (1.1000, 1.1012, 1.0998, 1.1010),
            (1.1010, 1.1022, 1.1008, 1.1020),
            (1.1020, 1.1032, 1.1018, 1.1030),
            (1.1030, 1.1042, 1.1028, 1.1040),
            (1.1040, 1.1052, 1.1038, 1.1050),
            (1.1050, 1.1062, 1.1048, 1.1060),
            (1.1060, 1.1065, 1.1010, 1.1012), // reversal bar
        ];
        rows.iter()
            .rev()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Candle {
                timestamp: 1_000_000 - 60 * i as i64,
                open,
                high,
                low,
                close,
                index: i,
            })
            .collect()
    }

    fn engine_with(gw: MockGateway) -> Engine<MockGateway> {
        Engine::new(gw, test_cfg(), Session::new(10_000.0))
    }

    #[tokio::test]
    async fn full_cycle_places_sized_sell_limit() {
        let mut gw = MockGateway::new();
        gw.candles = fixture_candles();
        let mut engine = engine_with(gw);

        let outcome = engine.run_cycle(1_000_000).await;
        assert!(matches!(outcome, CycleOutcome::OrderPlaced(_)));
        assert_eq!(engine.session.last_signal_ts, 1_000_000);

        let submitted = engine.gateway.submitted.borrow();
        assert_eq!(submitted.len(), 1);
        let req = &submitted[0];
        assert!((req.entry_price - 1.1060).abs() < 1e-9);
        assert!((req.stop_loss - 1.1115).abs() < 1e-9); // entry + half the zone range
        assert!((req.take_profit - 1.0840).abs() < 1e-9); // two ranges below at RR 2
        assert!((req.lots - 0.90).abs() < 1e-9); // 50 / (55 ticks × 1.0), stepped
        assert_eq!(req.magic, 234567);
    }

    #[tokio::test]
    async fn cooldown_blocks_back_to_back_orders() {
        let mut gw = MockGateway::new();
        gw.candles = fixture_candles();
        let mut engine = engine_with(gw);

        assert!(matches!(engine.run_cycle(1_000_000).await, CycleOutcome::OrderPlaced(_)));
        let outcome = engine.run_cycle(1_000_030).await;
        assert_eq!(outcome, CycleOutcome::NoSignal(BlockReason::CooldownActive));
        assert_eq!(engine.gateway.submitted.borrow().len(), 1);
    }

    #[tokio::test]
    async fn governor_halts_before_any_analysis() {
        let mut gw = MockGateway::new();
        gw.candles = fixture_candles();
        gw.balance.set(795.0);
        let mut engine = Engine::new(gw, test_cfg(), Session::new(1_000.0));

        // loss 205 ≥ limit 200: tripped despite signal-rich data
        assert_eq!(engine.run_cycle(1_000_000).await, CycleOutcome::Halted);
        assert_eq!(engine.run_cycle(1_000_100).await, CycleOutcome::Halted);
        assert!(engine.gateway.submitted.borrow().is_empty());
        assert!(!engine.session.trading_enabled);
    }

    #[tokio::test]
    async fn missing_candles_abort_the_cycle() {
        let gw = MockGateway::new();
        let mut engine = engine_with(gw);
        assert_eq!(engine.run_cycle(1_000_000).await, CycleOutcome::DataUnavailable);
    }

    #[tokio::test]
    async fn open_position_is_managed_but_blocks_new_entries() {
        let mut gw = MockGateway::new();
        gw.candles = fixture_candles();
        gw.positions.borrow_mut().push(PositionState {
            ticket: 7001,
            symbol: "EURUSD".to_string(),
            magic: 234567,
            open_price: 1.1050,
            stop_loss: 1.1075,
            take_profit: 1.0950,
            is_short: true,
            current_price: 1.1020,
        });
        let mut engine = engine_with(gw);

        let outcome = engine.run_cycle(1_000_000).await;
        assert_eq!(outcome, CycleOutcome::NoSignal(BlockReason::PositionOpen));
        // the breakeven pass still ran on the open short
        assert_eq!(engine.gateway.modify_calls.get(), 1);
        assert!(engine.gateway.submitted.borrow().is_empty());
    }

    #[tokio::test]
    async fn broker_rejection_leaves_throttle_open() {
        let mut gw = MockGateway::new();
        gw.candles = fixture_candles();
        gw.reject_orders = true;
        let mut engine = engine_with(gw);

        assert_eq!(engine.run_cycle(1_000_000).await, CycleOutcome::OrderRejected);
        assert_eq!(engine.session.last_signal_ts, 0);

        // next cycle may try again immediately — no cooldown was armed
        engine.gateway.reject_orders = false;
        assert!(matches!(engine.run_cycle(1_000_010).await, CycleOutcome::OrderPlaced(_)));
    }
}
