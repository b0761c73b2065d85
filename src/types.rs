use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Candle {
    /// Open time, Unix seconds.
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Series shift: 0 = most recent, increasing = older.
    #[serde(default)]
    pub index: usize,
}

/// Nivel de soporte/resistencia derivado de un extremo fractal.
/// price == 0.0 significa "sin zona este ciclo".
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Zone {
    pub price: f64,
    pub touch_count: u32,
}

impl Zone {
    pub fn is_empty(&self) -> bool {
        self.price <= 0.0
    }
}

/// Entry plan for one pending sell-limit order.
/// Invariant (short): stop_loss > entry_price > take_profit.
#[derive(Clone, Copy, Debug)]
pub struct RiskPlan {
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub lot_size: f64,
}

/// One open position owned by this strategy (filtered by magic on the bridge).
#[derive(Clone, Debug)]
pub struct PositionState {
    pub ticket: u64,
    pub symbol: String,
    pub magic: i64,
    pub open_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub is_short: bool,
    pub current_price: f64,
}

/// Quantization and monetary-conversion constants from the broker.
#[derive(Clone, Copy, Debug)]
pub struct InstrumentLimits {
    pub tick_value: f64,
    pub tick_size: f64,
    pub min_lot: f64,
    pub max_lot: f64,
    pub lot_step: f64,
}

#[derive(Clone, Debug)]
pub struct OrderRequest {
    pub symbol: String,
    pub lots: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub magic: i64,
    pub comment: String,
}

#[derive(Clone, Copy, Debug)]
pub struct OrderResult {
    pub ticket: u64,
    pub retcode: i64,
}
