use crate::types::Candle;

/// Candles inspected by the momentum-reversal classifier.
pub const MOMENTUM_WINDOW: usize = 10;

fn body(c: &Candle) -> f64 {
    (c.close - c.open).abs()
}

/// Detecta un empuje alcista seguido de una vela bajista de reversión.
///
/// Exige ≥3 velas alcistas entre los índices 5..=8 (la fase de empuje) y que
/// la vela actual sea bajista con cuerpo > multiplier × la media de los
/// cuerpos de las 5 velas previas (índices 1..=5). Candles are newest-first.
pub fn momentum_reversal(candles: &[Candle], body_multiplier: f64) -> bool {
    if candles.len() < MOMENTUM_WINDOW {
        return false;
    }

    let bullish_push = (5..=8)
        .filter(|&i| candles[i].close > candles[i].open)
        .count();
    if bullish_push < 3 {
        return false;
    }

    let current = &candles[0];
    if current.close >= current.open {
        return false;
    }

    let avg_body: f64 = (1..=5).map(|i| body(&candles[i])).sum::<f64>() / 5.0;
    body(current) > body_multiplier * avg_body
}

/// Cruce bajista del MACD con momentum descendente.
///
/// main[0] < signal[0], main[1] ≥ signal[1] y main cayendo. Fails closed
/// (false) with fewer than 3 samples on either line. Series newest-first.
pub fn macd_bearish_cross(main: &[f64], signal: &[f64]) -> bool {
    if main.len() < 3 || signal.len() < 3 {
        return false;
    }
    main[0] < signal[0] && main[1] >= signal[1] && main[0] < main[1]
}

/// Fair-value gap spanning the resistance level: the interval between the low
/// of the candle two bars back and the high of the current candle must
/// strictly contain the resistance price.
pub fn fvg_spans_resistance(candles: &[Candle], resistance: f64) -> bool {
    if candles.len() < 3 {
        return false;
    }
    let gap_low = candles[2].low;
    let gap_high = candles[0].high;
    gap_low < resistance && resistance < gap_high
}

/// Execution-cost ceiling: spread in price units must not exceed the limit.
pub fn spread_ok(spread: f64, max_spread: f64) -> bool {
    spread <= max_spread
}
