use crate::config::ORDER_COMMENT;
use crate::gateway::{BrokerGateway, GatewayError};
use crate::signal::Session;
use crate::types::{OrderRequest, PositionState, RiskPlan};

/// Entry, stop-loss and take-profit for the short at resistance.
///
/// SL queda medio rango de zona POR ENCIMA de la resistencia (colchón, no
/// pegado al borde); TP a `min_risk_reward` veces el rango por debajo.
pub fn plan_levels(support: f64, resistance: f64, min_risk_reward: f64) -> (f64, f64, f64) {
    let entry = resistance;
    let range = entry - support;
    let stop_loss = entry + 0.5 * range;
    let take_profit = entry - range * min_risk_reward;
    (entry, stop_loss, take_profit)
}

/// Pre-submission invariant for a short: stop_loss > entry > take_profit and
/// a positive size. Unreachable given upstream checks, but submission must
/// fail safe rather than ship an inverted order.
pub fn validate_plan(plan: &RiskPlan) -> Result<(), String> {
    if plan.lot_size <= 0.0 {
        return Err(format!("lot size {:.2} is not positive", plan.lot_size));
    }
    if !(plan.stop_loss > plan.entry_price && plan.entry_price > plan.take_profit) {
        return Err(format!(
            "levels inverted for a short: sl={:.5} entry={:.5} tp={:.5}",
            plan.stop_loss, plan.entry_price, plan.take_profit
        ));
    }
    Ok(())
}

/// Submit the pending sell-limit for a confirmed signal. The throttle
/// timestamp moves only on broker acceptance; a rejection is logged and
/// dropped with no retry this cycle.
pub async fn submit_entry<G: BrokerGateway>(
    gateway: &G,
    symbol: &str,
    magic: i64,
    plan: &RiskPlan,
    session: &mut Session,
    now: i64,
) -> Option<u64> {
    if let Err(reason) = validate_plan(plan) {
        log::error!("[{}] order aborted: {}", symbol, reason);
        return None;
    }

    let req = OrderRequest {
        symbol: symbol.to_string(),
        lots: plan.lot_size,
        entry_price: plan.entry_price,
        stop_loss: plan.stop_loss,
        take_profit: plan.take_profit,
        magic,
        comment: ORDER_COMMENT.to_string(),
    };

    match gateway.submit_pending_order(&req).await {
        Ok(result) => {
            session.mark_signal(now);
            log::info!(
                "[{}] sell limit placed: ticket={} retcode={} lots={:.2} entry={:.5} sl={:.5} tp={:.5}",
                symbol, result.ticket, result.retcode, plan.lot_size, plan.entry_price, plan.stop_loss, plan.take_profit
            );
            Some(result.ticket)
        }
        Err(e) => {
            log::error!("[{}] order submission failed: {}", symbol, e);
            None
        }
    }
}

/// Breakeven pass over this strategy's open positions: once an open short
/// has earned its initial risk distance, move the stop to the open price,
/// keeping the take-profit. One-way — the `stop_loss != open_price` guard
/// makes repeated passes no-ops after the move.
pub async fn manage_positions<G: BrokerGateway>(
    gateway: &G,
    symbol: &str,
    positions: &[PositionState],
) -> u32 {
    let mut moved = 0;
    for pos in positions {
        if pos.symbol != symbol || !pos.is_short {
            continue;
        }
        let initial_risk = (pos.stop_loss - pos.open_price).abs();
        let profit = pos.open_price - pos.current_price;
        if profit >= initial_risk && pos.stop_loss != pos.open_price {
            match gateway
                .modify_position(pos.ticket, pos.open_price, pos.take_profit)
                .await
            {
                Ok(()) => {
                    moved += 1;
                    log::info!(
                        "[{}] #{} stop moved to breakeven @ {:.5} (profit {:.5} ≥ risk {:.5})",
                        symbol, pos.ticket, pos.open_price, profit, initial_risk
                    );
                }
                Err(e) => {
                    log::warn!("[{}] #{} breakeven modification failed: {}", symbol, pos.ticket, e);
                }
            }
        }
    }
    moved
}

/// List-and-manage in one step; `GatewayError` here means the position scan
/// itself failed and the pass is skipped for the cycle.
pub async fn management_pass<G: BrokerGateway>(
    gateway: &G,
    symbol: &str,
    magic: i64,
) -> Result<Vec<PositionState>, GatewayError> {
    let positions = gateway.open_positions(symbol, magic).await?;
    manage_positions(gateway, symbol, &positions).await;
    Ok(positions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::MockGateway;

    const SYM: &str = "EURUSD";
    const MAGIC: i64 = 234567;

    fn short_position(open: f64, sl: f64, tp: f64, current: f64) -> PositionState {
        PositionState {
            ticket: 7001,
            symbol: SYM.to_string(),
            magic: MAGIC,
            open_price: open,
            stop_loss: sl,
            take_profit: tp,
            is_short: true,
            current_price: current,
        }
    }

    #[test]
    fn levels_follow_zone_geometry() {
        // support 1.1000, resistance 1.1050 → entry 1.1050, SL half a range
        // above, TP two ranges below at RR 2.0
        let (entry, sl, tp) = plan_levels(1.1000, 1.1050, 2.0);
        assert!((entry - 1.1050).abs() < 1e-9);
        assert!((sl - 1.1075).abs() < 1e-9);
        assert!((tp - 1.0950).abs() < 1e-9);
    }

    #[test]
    fn inverted_levels_fail_validation() {
        let plan = RiskPlan { entry_price: 1.1050, stop_loss: 1.1000, take_profit: 1.0950, lot_size: 1.0 };
        assert!(validate_plan(&plan).is_err());
        let plan = RiskPlan { entry_price: 1.1050, stop_loss: 1.1075, take_profit: 1.0950, lot_size: 0.0 };
        assert!(validate_plan(&plan).is_err());
    }

    #[tokio::test]
    async fn rejected_submission_leaves_throttle_untouched() {
        let mut gw = MockGateway::new();
        gw.reject_orders = true;
        let mut session = Session::new(10_000.0);
        let plan = RiskPlan { entry_price: 1.1050, stop_loss: 1.1075, take_profit: 1.0950, lot_size: 1.0 };
        let ticket = submit_entry(&gw, SYM, MAGIC, &plan, &mut session, 5_000).await;
        assert!(ticket.is_none());
        assert_eq!(session.last_signal_ts, 0);
    }

    #[tokio::test]
    async fn accepted_submission_marks_throttle() {
        let gw = MockGateway::new();
        let mut session = Session::new(10_000.0);
        let plan = RiskPlan { entry_price: 1.1050, stop_loss: 1.1075, take_profit: 1.0950, lot_size: 1.0 };
        let ticket = submit_entry(&gw, SYM, MAGIC, &plan, &mut session, 5_000).await;
        assert!(ticket.is_some());
        assert_eq!(session.last_signal_ts, 5_000);
        assert_eq!(gw.submitted.borrow().len(), 1);
    }

    #[tokio::test]
    async fn breakeven_moves_stop_and_keeps_tp() {
        let gw = MockGateway::new();
        // short from 1.1050, SL 1.1075 → initial risk 0.0025; price at
        // 1.1020 → profit 0.0030 ≥ risk
        gw.positions.borrow_mut().push(short_position(1.1050, 1.1075, 1.0950, 1.1020));

        let positions = management_pass(&gw, SYM, MAGIC).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(gw.modify_calls.get(), 1);

        let pos = gw.positions.borrow()[0].clone();
        assert!((pos.stop_loss - 1.1050).abs() < 1e-9);
        assert!((pos.take_profit - 1.0950).abs() < 1e-9);
    }

    #[tokio::test]
    async fn breakeven_is_idempotent_across_passes() {
        let gw = MockGateway::new();
        gw.positions.borrow_mut().push(short_position(1.1050, 1.1075, 1.0950, 1.1020));

        management_pass(&gw, SYM, MAGIC).await.unwrap();
        management_pass(&gw, SYM, MAGIC).await.unwrap();

        // second pass re-reads the position at breakeven and issues nothing
        assert_eq!(gw.modify_calls.get(), 1);
    }

    #[tokio::test]
    async fn insufficient_profit_leaves_position_alone() {
        let gw = MockGateway::new();
        // profit 0.0020 < initial risk 0.0025
        gw.positions.borrow_mut().push(short_position(1.1050, 1.1075, 1.0950, 1.1030));

        management_pass(&gw, SYM, MAGIC).await.unwrap();
        assert_eq!(gw.modify_calls.get(), 0);
    }

    #[tokio::test]
    async fn long_positions_are_ignored() {
        let gw = MockGateway::new();
        let mut pos = short_position(1.1050, 1.1075, 1.0950, 1.1020);
        pos.is_short = false;
        gw.positions.borrow_mut().push(pos);

        management_pass(&gw, SYM, MAGIC).await.unwrap();
        assert_eq!(gw.modify_calls.get(), 0);
    }

    #[tokio::test]
    async fn foreign_magic_positions_are_not_listed() {
        let gw = MockGateway::new();
        let mut pos = short_position(1.1050, 1.1075, 1.0950, 1.1020);
        pos.magic = 1;
        gw.positions.borrow_mut().push(pos);

        let positions = management_pass(&gw, SYM, MAGIC).await.unwrap();
        assert!(positions.is_empty());
        assert_eq!(gw.modify_calls.get(), 0);
    }
}
