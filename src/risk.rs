use crate::signal::Session;
use crate::types::InstrumentLimits;

// ── Sizing ────────────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
pub enum SizingError {
    NonPositiveRiskAmount(f64),
    NonPositivePrice { entry: f64, stop_loss: f64 },
    ZeroRiskDistance,
    BadInstrumentLimits,
}

impl std::fmt::Display for SizingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SizingError::NonPositiveRiskAmount(v) => {
                write!(f, "risk amount must be positive, got {:.2}", v)
            }
            SizingError::NonPositivePrice { entry, stop_loss } => {
                write!(f, "prices must be positive: entry={:.5} sl={:.5}", entry, stop_loss)
            }
            SizingError::ZeroRiskDistance => write!(f, "stop-loss distance is zero"),
            SizingError::BadInstrumentLimits => write!(f, "broker instrument limits are unusable"),
        }
    }
}

impl std::error::Error for SizingError {}

/// Convierte el riesgo monetario fijo en lotes: distancia al SL en ticks →
/// pérdida por lote → lotes brutos, redondeados hacia abajo al lot_step y
/// acotados a [min_lot, max_lot]. Un tope independiente de max_risk_percent
/// del equity sustituye al tamaño cuantizado cuando lo excede (el tope no se
/// recuantiza al lot_step). Resultado final a 2 decimales.
pub fn size_position(
    risk_amount: f64,
    stop_loss: f64,
    entry_price: f64,
    limits: &InstrumentLimits,
    equity: f64,
    max_risk_percent: f64,
) -> Result<f64, SizingError> {
    if risk_amount <= 0.0 {
        return Err(SizingError::NonPositiveRiskAmount(risk_amount));
    }
    if entry_price <= 0.0 || stop_loss <= 0.0 {
        return Err(SizingError::NonPositivePrice { entry: entry_price, stop_loss });
    }
    let distance = (stop_loss - entry_price).abs();
    if distance <= 0.0 {
        return Err(SizingError::ZeroRiskDistance);
    }
    if limits.tick_size <= 0.0
        || limits.tick_value <= 0.0
        || limits.lot_step <= 0.0
        || limits.min_lot > limits.max_lot
    {
        return Err(SizingError::BadInstrumentLimits);
    }

    // prices are tick-quantized, so the distance is a whole number of ticks
    let risk_ticks = (distance / limits.tick_size).round();
    if risk_ticks <= 0.0 {
        return Err(SizingError::ZeroRiskDistance);
    }
    let loss_per_lot = risk_ticks * limits.tick_value;

    let raw = risk_amount / loss_per_lot;
    let stepped = (raw / limits.lot_step + 1e-9).floor() * limits.lot_step;
    let clamped = stepped.clamp(limits.min_lot, limits.max_lot);

    let cap_money = equity * max_risk_percent / 100.0;
    let cap_lots = cap_money / loss_per_lot;
    let bounded = if clamped > cap_lots { cap_lots } else { clamped };

    let mut lots = (bounded * 100.0).round() / 100.0;
    // rounding must not push the loss at SL back above the equity cap
    if lots * loss_per_lot > cap_money {
        lots = (bounded * 100.0).floor() / 100.0;
    }
    Ok(lots)
}

// ── Daily loss governor ───────────────────────────────────────────────────────

/// Compara el balance actual con el de inicio del día; al cruzar el umbral
/// de pérdida, el trading queda desactivado para el resto del proceso.
/// Returns true only on the cycle where the threshold is first crossed.
pub fn enforce_daily_loss(session: &mut Session, balance: f64, max_daily_loss: f64) -> bool {
    if !session.trading_enabled {
        return false;
    }
    let daily_loss = session.day_start_balance - balance;
    if daily_loss >= max_daily_loss {
        session.trading_enabled = false;
        log::warn!(
            "Daily loss {:.2} reached limit {:.2} — trading disabled for this session",
            daily_loss,
            max_daily_loss
        );
        return true;
    }
    false
}
