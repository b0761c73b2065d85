use crate::types::Candle;

/// MACD main and signal lines, newest-first (index 0 = current bar).
#[derive(Clone, Debug, Default)]
pub struct MacdSeries {
    pub main: Vec<f64>,
    pub signal: Vec<f64>,
}

/// Exponential moving average over an oldest-first series, seeded with the
/// first value. Output has the same length as the input.
fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let k = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut ema = match values.first() {
        Some(&v) => v,
        None => return out,
    };
    for &v in values {
        ema = v * k + ema * (1.0 - k);
        out.push(ema);
    }
    out
}

/// MACD (EMA fast − EMA slow, signal = EMA of main) computed from candle
/// closes. Input candles are newest-first; output series are newest-first.
/// Returns empty series when there is not enough history to warm up the
/// slow EMA and the signal line.
pub fn macd(candles: &[Candle], fast: usize, slow: usize, signal_period: usize) -> MacdSeries {
    if candles.len() < slow + signal_period {
        return MacdSeries::default();
    }

    let closes: Vec<f64> = candles.iter().rev().map(|c| c.close).collect();
    let ema_fast = ema_series(&closes, fast);
    let ema_slow = ema_series(&closes, slow);
    let main_of: Vec<f64> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| f - s)
        .collect();
    let signal_of = ema_series(&main_of, signal_period);

    MacdSeries {
        main: main_of.into_iter().rev().collect(),
        signal: signal_of.into_iter().rev().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_then_trend(len: usize, step: f64) -> Vec<Candle> {
        // oldest-first build, then reverse to newest-first
        let mut out: Vec<Candle> = (0..len)
            .map(|i| {
                let px = 100.0 + step * i as f64;
                Candle { timestamp: i as i64 * 60, open: px, high: px, low: px, close: px, index: 0 }
            })
            .collect();
        out.reverse();
        for (i, c) in out.iter_mut().enumerate() {
            c.index = i;
        }
        out
    }

    #[test]
    fn too_little_history_yields_empty_series() {
        let candles = flat_then_trend(10, 0.1);
        let m = macd(&candles, 12, 26, 9);
        assert!(m.main.is_empty());
        assert!(m.signal.is_empty());
    }

    #[test]
    fn uptrend_has_positive_main_line() {
        let candles = flat_then_trend(80, 0.5);
        let m = macd(&candles, 12, 26, 9);
        assert_eq!(m.main.len(), 80);
        // fast EMA sits above slow EMA in a steady uptrend
        assert!(m.main[0] > 0.0);
    }

    #[test]
    fn downtrend_has_negative_main_line() {
        let candles = flat_then_trend(80, -0.5);
        let m = macd(&candles, 12, 26, 9);
        assert!(m.main[0] < 0.0);
    }
}
