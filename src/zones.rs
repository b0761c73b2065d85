use crate::config::ZONE_TOUCH_TOLERANCE_TICKS;
use crate::types::{Candle, Zone};

/// Busca la zona de soporte en la ventana de `lookback + 5` velas.
///
/// Un candidato en i es un fractal: low[i] ≤ low[i−2..i+2]. Su número de
/// toques es la cantidad de mínimos de la ventana a ≤ 5 ticks del candidato.
/// Gana el primer candidato (edad ascendente) con el máximo de toques;
/// empates posteriores no lo sustituyen. Candles are newest-first.
pub fn find_support(candles: &[Candle], lookback: usize, tick_size: f64, min_touches: u32) -> Zone {
    if candles.len() < lookback + 5 {
        return Zone::default();
    }
    let window = &candles[..lookback + 5];
    let tolerance = ZONE_TOUCH_TOLERANCE_TICKS * tick_size;

    let mut best = Zone::default();
    for i in 2..=lookback + 2 {
        let low = window[i].low;
        let is_fractal = window[i - 2..=i + 2].iter().all(|c| low <= c.low);
        if !is_fractal {
            continue;
        }
        let touches = window
            .iter()
            .filter(|c| (c.low - low).abs() <= tolerance)
            .count() as u32;
        if touches > best.touch_count {
            best = Zone { price: low, touch_count: touches };
        }
    }

    if best.touch_count < min_touches {
        return Zone::default();
    }
    best
}

/// Espejo de `find_support` sobre los máximos: high[i] ≥ high[i−2..i+2].
pub fn find_resistance(candles: &[Candle], lookback: usize, tick_size: f64, min_touches: u32) -> Zone {
    if candles.len() < lookback + 5 {
        return Zone::default();
    }
    let window = &candles[..lookback + 5];
    let tolerance = ZONE_TOUCH_TOLERANCE_TICKS * tick_size;

    let mut best = Zone::default();
    for i in 2..=lookback + 2 {
        let high = window[i].high;
        let is_fractal = window[i - 2..=i + 2].iter().all(|c| high >= c.high);
        if !is_fractal {
            continue;
        }
        let touches = window
            .iter()
            .filter(|c| (c.high - high).abs() <= tolerance)
            .count() as u32;
        if touches > best.touch_count {
            best = Zone { price: high, touch_count: touches };
        }
    }

    if best.touch_count < min_touches {
        return Zone::default();
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: f64 = 0.0001;

    /// Baseline series (newest-first) whose lows and highs rise with age, so
    /// no unmodified bar is a fractal; overrides carve the intended extrema.
    fn series(len: usize, base: f64, lows: &[(usize, f64)], highs: &[(usize, f64)]) -> Vec<Candle> {
        let mut out: Vec<Candle> = (0..len)
            .map(|i| {
                let low = base + i as f64 * 0.0010;
                Candle {
                    timestamp: (len - i) as i64 * 60,
                    open: base,
                    high: low + 0.0030,
                    low,
                    close: base,
                    index: i,
                }
            })
            .collect();
        for &(i, px) in lows {
            out[i].low = px;
        }
        for &(i, px) in highs {
            out[i].high = px;
        }
        out
    }

    #[test]
    fn finds_fractal_low_as_support() {
        // lone dip at index 6 against the rising baseline
        let candles = series(15, 1.1000, &[(6, 1.0950)], &[]);
        let zone = find_support(&candles, 10, TICK, 1);
        assert_eq!(zone.price, 1.0950);
        assert_eq!(zone.touch_count, 1);
    }

    #[test]
    fn insufficient_history_yields_empty_zone() {
        let candles = series(10, 1.1000, &[(4, 1.0950)], &[]);
        assert!(find_support(&candles, 10, TICK, 1).is_empty());
    }

    #[test]
    fn first_max_touch_candidate_wins_ties() {
        // two separate fractal dips with one touch each; the younger one
        // (lower index) must win and the later tie must not overwrite it
        let candles = series(15, 1.1000, &[(4, 1.0940), (9, 1.0950)], &[]);
        let zone = find_support(&candles, 10, TICK, 1);
        assert_eq!(zone.price, 1.0940);
    }

    #[test]
    fn higher_touch_count_beats_scan_order() {
        // dip at 4 has one touch; dip at 9 is retouched at index 12 (within
        // 5 ticks) and wins with two touches
        let candles = series(15, 1.1000, &[(4, 1.0940), (9, 1.0950), (12, 1.0952)], &[]);
        let zone = find_support(&candles, 10, TICK, 1);
        assert_eq!(zone.price, 1.0950);
        assert_eq!(zone.touch_count, 2);
    }

    #[test]
    fn min_touches_filters_single_touch_zones() {
        let candles = series(15, 1.1000, &[(6, 1.0950)], &[]);
        assert!(find_support(&candles, 10, TICK, 2).is_empty());
    }

    #[test]
    fn finds_fractal_high_as_resistance() {
        let candles = series(15, 1.1000, &[], &[(7, 1.1200), (10, 1.1202)]);
        let zone = find_resistance(&candles, 10, TICK, 2);
        assert_eq!(zone.price, 1.1200);
        assert_eq!(zone.touch_count, 2);
    }

    #[test]
    fn edge_bars_cannot_be_candidates() {
        // extremum at index 1 has no two younger neighbours → not a fractal
        let candles = series(15, 1.1000, &[(1, 1.0900)], &[]);
        assert!(find_support(&candles, 10, TICK, 1).is_empty());
    }
}
