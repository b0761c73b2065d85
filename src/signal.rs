use crate::config::{Config, SIGNAL_COOLDOWN_SECS};
use crate::detector;
use crate::indicators::MacdSeries;
use crate::types::{Candle, InstrumentLimits, Zone};
use crate::zones;

/// Estado que sobrevive entre ciclos: sello del último disparo y el
/// interruptor del governor diario. Owned by the process, mutated only
/// through these methods.
#[derive(Clone, Debug)]
pub struct Session {
    pub day_start_balance: f64,
    pub trading_enabled: bool,
    pub last_signal_ts: i64,
}

impl Session {
    pub fn new(day_start_balance: f64) -> Self {
        Session { day_start_balance, trading_enabled: true, last_signal_ts: 0 }
    }

    pub fn cooldown_elapsed(&self, now: i64) -> bool {
        now - self.last_signal_ts >= SIGNAL_COOLDOWN_SECS
    }

    /// Called only after the broker accepted an order.
    pub fn mark_signal(&mut self, now: i64) {
        self.last_signal_ts = now;
    }
}

/// Everything the aggregator inspects in one cycle.
pub struct CycleInputs<'a> {
    pub candles: &'a [Candle],
    pub macd: &'a MacdSeries,
    pub spread: f64,
    pub open_positions: usize,
    pub now: i64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BlockReason {
    CooldownActive,
    PositionOpen,
    SpreadTooWide,
    MacdNotConfirmed,
    NoMomentumReversal,
    InvalidZonePair,
    FvgNotAligned,
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BlockReason::CooldownActive => "cooldown active",
            BlockReason::PositionOpen => "position already open",
            BlockReason::SpreadTooWide => "spread above ceiling",
            BlockReason::MacdNotConfirmed => "no bearish MACD cross",
            BlockReason::NoMomentumReversal => "no momentum reversal",
            BlockReason::InvalidZonePair => "no valid support/resistance pair",
            BlockReason::FvgNotAligned => "FVG does not span resistance",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Verdict {
    Ready { support: Zone, resistance: Zone },
    Blocked(BlockReason),
}

/// Support must sit strictly below resistance and both must exist.
pub fn zone_pair_valid(support: &Zone, resistance: &Zone) -> bool {
    !support.is_empty() && !resistance.is_empty() && support.price < resistance.price
}

/// One pass of the Idle → SignalReady transition. Checks run in fixed order
/// and short-circuit on the first failure; the state resets every cycle, so
/// the only memory across cycles lives in `Session`.
pub fn evaluate(
    session: &Session,
    cfg: &Config,
    limits: &InstrumentLimits,
    inputs: &CycleInputs,
) -> Verdict {
    if !session.cooldown_elapsed(inputs.now) {
        return Verdict::Blocked(BlockReason::CooldownActive);
    }
    if inputs.open_positions > 0 {
        return Verdict::Blocked(BlockReason::PositionOpen);
    }
    if !detector::spread_ok(inputs.spread, cfg.symbol.max_spread) {
        return Verdict::Blocked(BlockReason::SpreadTooWide);
    }
    if !detector::macd_bearish_cross(&inputs.macd.main, &inputs.macd.signal) {
        return Verdict::Blocked(BlockReason::MacdNotConfirmed);
    }
    if !detector::momentum_reversal(inputs.candles, cfg.analysis.body_multiplier) {
        return Verdict::Blocked(BlockReason::NoMomentumReversal);
    }

    let support = zones::find_support(
        inputs.candles,
        cfg.analysis.lookback_period,
        limits.tick_size,
        cfg.analysis.min_zone_touches,
    );
    let resistance = zones::find_resistance(
        inputs.candles,
        cfg.analysis.lookback_period,
        limits.tick_size,
        cfg.analysis.min_zone_touches,
    );
    if !zone_pair_valid(&support, &resistance) {
        return Verdict::Blocked(BlockReason::InvalidZonePair);
    }
    if !detector::fvg_spans_resistance(inputs.candles, resistance.price) {
        return Verdict::Blocked(BlockReason::FvgNotAligned);
    }

    Verdict::Ready { support, resistance }
}
