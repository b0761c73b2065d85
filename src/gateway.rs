use crate::types::{Candle, InstrumentLimits, OrderRequest, OrderResult, PositionState};

/// Failure taxonomy for the broker gateway. Nothing here is fatal to the
/// process: data errors abort the cycle's evaluation, rejections drop the
/// order, transport errors are retried inside the client where safe.
#[derive(Debug)]
pub enum GatewayError {
    /// Candles, indicator inputs or account data not available this cycle.
    DataUnavailable(String),
    /// The broker refused an order or modification (MT5 retcode).
    Rejected { retcode: i64, msg: String },
    /// Network/HTTP/WS failure between us and the bridge.
    Transport(String),
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::DataUnavailable(msg) => write!(f, "data unavailable: {}", msg),
            GatewayError::Rejected { retcode, msg } => {
                write!(f, "broker rejected: retcode={} msg={}", retcode, msg)
            }
            GatewayError::Transport(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

impl std::error::Error for GatewayError {}

/// Market/broker operations the engine depends on. The live implementation
/// talks to the MT5 bridge; tests substitute an in-memory double.
pub trait BrokerGateway {
    /// Most recent `count` candles, newest-first, index 0 = current bar.
    async fn candles(&self, symbol: &str, timeframe: &str, count: usize)
        -> Result<Vec<Candle>, GatewayError>;

    /// Current spread in price units (ask − bid).
    async fn spread(&self, symbol: &str) -> Result<f64, GatewayError>;

    async fn instrument_limits(&self, symbol: &str) -> Result<InstrumentLimits, GatewayError>;

    async fn account_balance(&self) -> Result<f64, GatewayError>;

    async fn account_equity(&self) -> Result<f64, GatewayError>;

    async fn submit_pending_order(&self, req: &OrderRequest) -> Result<OrderResult, GatewayError>;

    async fn modify_position(
        &self,
        ticket: u64,
        stop_loss: f64,
        take_profit: f64,
    ) -> Result<(), GatewayError>;

    /// Open positions tagged with our magic on the given symbol.
    async fn open_positions(&self, symbol: &str, magic: i64)
        -> Result<Vec<PositionState>, GatewayError>;
}
