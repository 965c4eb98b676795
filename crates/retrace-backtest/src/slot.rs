//! Per-instrument slot.
//!
//! A slot owns its indicator provider and exactly one [`SlotState`]. Each
//! bar it first resolves what it already holds (a pending order or an open
//! position) and only consults the detector if it ends up idle or armed.

use serde::{Deserialize, Serialize};
use tracing::debug;

use retrace_core::traits::{AbandonReason, BarContext, DetectorStep, SignalDetector};
use retrace_core::types::{
    ArmedSetup, Bar, Direction, ExitReason, IndicatorSnapshot, PendingOrder, Position, Signal,
};
use retrace_indicators::IndicatorProvider;
use retrace_risk::PositionSizer;

use crate::config::StrategyConfig;
use crate::ledger::Ledger;
use crate::orders::{self, OrderEvent};
use crate::position::{check_exit, plan_exits};
use crate::statistics::RunCounters;

/// What a slot currently holds. At most one of armed setup, pending order
/// or open position exists at any time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SlotState {
    #[default]
    Idle,
    Armed(ArmedSetup),
    Pending(PendingOrder),
    Open(Position),
}

impl SlotState {
    /// Busy slots are not evaluated by the detector.
    pub fn is_busy(&self) -> bool {
        matches!(self, SlotState::Pending(_) | SlotState::Open(_))
    }

    pub fn armed(&self) -> Option<ArmedSetup> {
        match self {
            SlotState::Armed(setup) => Some(*setup),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SlotState::Idle => "idle",
            SlotState::Armed(_) => "armed",
            SlotState::Pending(_) => "pending",
            SlotState::Open(_) => "open",
        }
    }
}

/// A lifecycle transition, recorded in run order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub symbol: String,
    pub bar_index: usize,
    pub timestamp: i64,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    Armed { direction: Direction, break_level: f64 },
    Abandoned { reason: String },
    SignalDiscarded,
    OrderPlaced { order_id: u64, direction: Direction, limit_price: f64 },
    OrderFilled { order_id: u64, price: f64 },
    OrderExpired { order_id: u64 },
    OrderRejected { order_id: u64, reason: String },
    PositionClosed { trade_index: usize, reason: ExitReason, price: f64 },
    PendingDropped { order_id: u64 },
}

impl LifecycleEvent {
    fn new(symbol: &str, bar_index: usize, bar: &Bar, kind: EventKind) -> Self {
        Self {
            symbol: symbol.to_string(),
            bar_index,
            timestamp: bar.timestamp,
            kind,
        }
    }
}

/// Shared run state a slot reads and writes while processing a bar.
pub struct SlotEnv<'a> {
    pub detector: &'a dyn SignalDetector,
    pub strategy: &'a StrategyConfig,
    pub sizer: &'a PositionSizer,
    pub ledger: &'a mut Ledger,
    pub counters: &'a mut RunCounters,
    pub events: &'a mut Vec<LifecycleEvent>,
    pub next_order_id: &'a mut u64,
}

/// Result of stepping the detector for an idle or armed slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    Idle,
    Armed(ArmedSetup),
    Signal(Signal),
}

/// Step the detector and record arms and abandons.
pub fn detect(
    detector: &dyn SignalDetector,
    armed: Option<ArmedSetup>,
    ctx: &BarContext<'_>,
    counters: &mut RunCounters,
    events: &mut Vec<LifecycleEvent>,
) -> Detection {
    match detector.step(armed, ctx) {
        DetectorStep::Idle => Detection::Idle,
        DetectorStep::Armed(setup) => {
            if armed.is_none() {
                counters.setups_armed += 1;
                events.push(LifecycleEvent::new(
                    ctx.symbol,
                    ctx.bar_index,
                    ctx.bar,
                    EventKind::Armed {
                        direction: setup.direction,
                        break_level: setup.break_level,
                    },
                ));
            }
            Detection::Armed(setup)
        }
        DetectorStep::Abandoned { reason, .. } => {
            match reason {
                AbandonReason::StopDistance { .. } => counters.abandoned_stop_distance += 1,
                AbandonReason::Filtered(_) => counters.abandoned_filtered += 1,
                AbandonReason::ArmExpired => counters.abandoned_expired += 1,
            }
            events.push(LifecycleEvent::new(
                ctx.symbol,
                ctx.bar_index,
                ctx.bar,
                EventKind::Abandoned {
                    reason: reason.to_string(),
                },
            ));
            Detection::Idle
        }
        DetectorStep::Signal(signal) => {
            counters.signals += 1;
            Detection::Signal(signal)
        }
    }
}

/// One instrument's state machine.
#[derive(Debug, Clone)]
pub struct Slot {
    symbol: String,
    provider: IndicatorProvider,
    state: SlotState,
    last: Option<(usize, Bar)>,
}

impl Slot {
    pub fn new(symbol: impl Into<String>, provider: IndicatorProvider) -> Self {
        Self {
            symbol: symbol.into(),
            provider,
            state: SlotState::Idle,
            last: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn state(&self) -> &SlotState {
        &self.state
    }

    /// Timestamp of the last bar this slot processed.
    pub fn last_timestamp(&self) -> Option<i64> {
        self.last.map(|(_, bar)| bar.timestamp)
    }

    /// Process the next bar of this slot's series.
    ///
    /// The detector is not consulted until its warm-up has elapsed; before
    /// that the slot can only be idle.
    pub fn on_bar(&mut self, bar: &Bar, env: &mut SlotEnv<'_>) {
        let index = self.provider.bars_seen();
        let snapshot = self.provider.update(bar);
        if index + 1 < env.detector.warmup_period() && !self.state.is_busy() {
            env.counters.bars_processed += 1;
            self.last = Some((index, *bar));
            return;
        }
        self.apply(index, bar, &snapshot, env);
    }

    fn apply(
        &mut self,
        index: usize,
        bar: &Bar,
        snapshot: &IndicatorSnapshot,
        env: &mut SlotEnv<'_>,
    ) {
        env.counters.bars_processed += 1;

        let state = match std::mem::take(&mut self.state) {
            SlotState::Pending(order) => self.service_pending(order, index, bar, snapshot, env),
            SlotState::Open(position) => self.service_open(position, index, bar, snapshot, env),
            other => other,
        };

        let next = if state.is_busy() {
            state
        } else {
            let ctx = BarContext {
                symbol: &self.symbol,
                bar_index: index,
                bar,
                snapshot,
            };
            match detect(env.detector, state.armed(), &ctx, env.counters, env.events) {
                Detection::Idle => SlotState::Idle,
                Detection::Armed(setup) => SlotState::Armed(setup),
                Detection::Signal(signal) => self.place(signal, index, bar, env),
            }
        };

        self.state = next;
        self.last = Some((index, *bar));
    }

    fn place(&self, signal: Signal, index: usize, bar: &Bar, env: &mut SlotEnv<'_>) -> SlotState {
        let id = *env.next_order_id;
        let Some(order) = orders::place_order(id, &env.strategy.entry, signal) else {
            env.counters.signals_discarded += 1;
            env.events.push(LifecycleEvent::new(
                &self.symbol,
                index,
                bar,
                EventKind::SignalDiscarded,
            ));
            return SlotState::Idle;
        };

        *env.next_order_id += 1;
        env.counters.orders_placed += 1;
        debug!(
            symbol = %self.symbol,
            bar = index,
            order = id,
            direction = %order.direction,
            limit = order.limit_price,
            "Limit order placed"
        );
        env.events.push(LifecycleEvent::new(
            &self.symbol,
            index,
            bar,
            EventKind::OrderPlaced {
                order_id: id,
                direction: order.direction,
                limit_price: order.limit_price,
            },
        ));
        SlotState::Pending(order)
    }

    fn service_pending(
        &self,
        order: PendingOrder,
        index: usize,
        bar: &Bar,
        snapshot: &IndicatorSnapshot,
        env: &mut SlotEnv<'_>,
    ) -> SlotState {
        match orders::service_order(&order, index, bar) {
            OrderEvent::Waiting => SlotState::Pending(order),
            OrderEvent::Expired => {
                env.counters.orders_expired += 1;
                debug!(symbol = %self.symbol, bar = index, order = order.id, "Limit order expired");
                env.events.push(LifecycleEvent::new(
                    &self.symbol,
                    index,
                    bar,
                    EventKind::OrderExpired { order_id: order.id },
                ));
                SlotState::Idle
            }
            OrderEvent::Filled { price } => self.open(order, price, index, bar, snapshot, env),
        }
    }

    fn open(
        &self,
        order: PendingOrder,
        price: f64,
        index: usize,
        bar: &Bar,
        snapshot: &IndicatorSnapshot,
        env: &mut SlotEnv<'_>,
    ) -> SlotState {
        let atr = snapshot.atr.unwrap_or(order.signal.atr);
        let plan = match plan_exits(&env.strategy.exits, &order.signal, price, atr) {
            Ok(plan) => plan,
            Err(rejection) => return self.reject(&order, index, bar, rejection.to_string(), env),
        };
        let decision = match env.sizer.size(env.ledger.equity(), price, plan.stop, order.signal.quality)
        {
            Ok(decision) => decision,
            Err(e) => return self.reject(&order, index, bar, e.to_string(), env),
        };

        env.counters.orders_filled += 1;
        debug!(
            symbol = %self.symbol,
            bar = index,
            order = order.id,
            price,
            stop = plan.stop,
            target = plan.target,
            size = %decision.size,
            "Position opened"
        );
        env.events.push(LifecycleEvent::new(
            &self.symbol,
            index,
            bar,
            EventKind::OrderFilled {
                order_id: order.id,
                price,
            },
        ));

        SlotState::Open(Position {
            symbol: order.symbol,
            direction: order.direction,
            entry_price: price,
            entry_bar: index,
            entry_time: bar.timestamp,
            stop_price: plan.stop,
            target_price: plan.target,
            size: decision.size,
            signal: order.signal,
        })
    }

    fn reject(
        &self,
        order: &PendingOrder,
        index: usize,
        bar: &Bar,
        reason: String,
        env: &mut SlotEnv<'_>,
    ) -> SlotState {
        env.counters.orders_rejected += 1;
        debug!(symbol = %self.symbol, bar = index, order = order.id, %reason, "Fill rejected");
        env.events.push(LifecycleEvent::new(
            &self.symbol,
            index,
            bar,
            EventKind::OrderRejected {
                order_id: order.id,
                reason,
            },
        ));
        SlotState::Idle
    }

    fn service_open(
        &self,
        position: Position,
        index: usize,
        bar: &Bar,
        snapshot: &IndicatorSnapshot,
        env: &mut SlotEnv<'_>,
    ) -> SlotState {
        let exits = &env.strategy.exits;
        let opposite =
            exits.exit_on_opposite && env.detector.opposite_trigger(position.direction, snapshot);

        match check_exit(exits, &position, index, bar, opposite) {
            None => SlotState::Open(position),
            Some(exit) => {
                self.close(&position, index, bar, exit.price, exit.reason, env);
                SlotState::Idle
            }
        }
    }

    fn close(
        &self,
        position: &Position,
        index: usize,
        bar: &Bar,
        price: f64,
        reason: ExitReason,
        env: &mut SlotEnv<'_>,
    ) {
        let trade_index = env
            .ledger
            .close(position, index, bar.timestamp, price, reason)
            .trade_index;
        env.events.push(LifecycleEvent::new(
            &self.symbol,
            index,
            bar,
            EventKind::PositionClosed {
                trade_index,
                reason,
                price,
            },
        ));
    }

    /// Settle the slot after its last bar: an open position closes at the
    /// last close, a pending order or armed setup is dropped.
    pub fn finish(&mut self, env: &mut SlotEnv<'_>) {
        let Some((index, bar)) = self.last else {
            return;
        };
        match std::mem::take(&mut self.state) {
            SlotState::Open(position) => {
                self.close(&position, index, &bar, bar.close, ExitReason::OpenAtDataEnd, env);
            }
            SlotState::Pending(order) => {
                env.counters.pending_dropped_at_end += 1;
                env.events.push(LifecycleEvent::new(
                    &self.symbol,
                    index,
                    &bar,
                    EventKind::PendingDropped { order_id: order.id },
                ));
            }
            SlotState::Armed(_) | SlotState::Idle => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::FeeModel;
    use crate::orders::{EntryConfig, LimitAnchor, LimitOffset};
    use crate::position::AnchorPolicy;
    use retrace_indicators::IndicatorSettings;
    use retrace_strategies::{DetectorConfig, RsiBreakDetector};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct Harness {
        detector: RsiBreakDetector,
        strategy: StrategyConfig,
        sizer: PositionSizer,
        ledger: Ledger,
        counters: RunCounters,
        events: Vec<LifecycleEvent>,
        next_order_id: u64,
        slot: Slot,
    }

    impl Harness {
        fn new(strategy: StrategyConfig) -> Self {
            Self {
                detector: RsiBreakDetector::new("test", strategy.detector.clone()).unwrap(),
                sizer: PositionSizer::new(strategy.sizing.clone()).unwrap(),
                ledger: Ledger::new(dec!(10000), strategy.fees),
                counters: RunCounters::default(),
                events: Vec::new(),
                next_order_id: 1,
                slot: Slot::new(
                    "SOLUSDT",
                    IndicatorProvider::new(&IndicatorSettings::default()).unwrap(),
                ),
                strategy,
            }
        }

        fn step(&mut self, index: usize, bar: Bar, snapshot: IndicatorSnapshot) {
            let mut env = SlotEnv {
                detector: &self.detector,
                strategy: &self.strategy,
                sizer: &self.sizer,
                ledger: &mut self.ledger,
                counters: &mut self.counters,
                events: &mut self.events,
                next_order_id: &mut self.next_order_id,
            };
            self.slot.apply(index, &bar, &snapshot, &mut env);
        }

        fn finish(&mut self) {
            let mut env = SlotEnv {
                detector: &self.detector,
                strategy: &self.strategy,
                sizer: &self.sizer,
                ledger: &mut self.ledger,
                counters: &mut self.counters,
                events: &mut self.events,
                next_order_id: &mut self.next_order_id,
            };
            self.slot.finish(&mut env);
        }
    }

    fn bar(index: usize, high: f64, low: f64, close: f64) -> Bar {
        Bar::new(index as i64 * 3_600_000, close, high, low, close, 100.0)
    }

    fn snap(prev_rsi: f64, rsi: f64, close: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            close,
            rsi: Some(rsi),
            prev_rsi: Some(prev_rsi),
            atr: Some(0.5),
            swing_low: Some(10.00),
            swing_high: Some(10.60),
            window_range_pct: Some(6.0),
            ..Default::default()
        }
    }

    fn scenario_strategy() -> StrategyConfig {
        StrategyConfig {
            detector: DetectorConfig::default(),
            entry: EntryConfig {
                anchor: LimitAnchor::SwingExtreme,
                offset: LimitOffset::AtrMultiple { multiple: 0.8 },
                max_wait_bars: 3,
            },
            fees: FeeModel::Flat {
                rate_pct: Decimal::ZERO,
            },
            ..Default::default()
        }
    }

    /// RSI 70 → 73 arms a short at swing low 10.00, the next close breaks it.
    fn arm_and_break(h: &mut Harness) {
        h.step(0, bar(0, 10.30, 10.05, 10.20), snap(70.0, 73.0, 10.20));
        assert!(matches!(h.slot.state(), SlotState::Armed(s) if s.break_level == 10.00));

        h.step(1, bar(1, 10.25, 9.90, 9.95), snap(73.0, 65.0, 9.95));
    }

    #[test]
    fn test_short_reversal_fills_at_limit() {
        let mut h = Harness::new(scenario_strategy());
        arm_and_break(&mut h);

        let SlotState::Pending(order) = h.slot.state().clone() else {
            panic!("expected pending order, got {}", h.slot.state().label());
        };
        assert_eq!(order.direction, Direction::Short);
        assert!((order.limit_price - 10.40).abs() < 1e-9);
        assert_eq!(order.placed_at, 1);

        h.step(2, bar(2, 10.55, 10.20, 10.30), snap(65.0, 66.0, 10.30));
        let SlotState::Open(position) = h.slot.state().clone() else {
            panic!("expected open position, got {}", h.slot.state().label());
        };
        assert!((position.entry_price - 10.40).abs() < 1e-9);
        assert_eq!(position.entry_bar, 2);
        // Entry-anchored: 10.40 ± 1.5/3.0 × 0.5
        assert!((position.stop_price - 11.15).abs() < 1e-9);
        assert!((position.target_price - 8.90).abs() < 1e-9);
        assert!(position.size > Decimal::ZERO);
        assert_eq!(h.counters.orders_filled, 1);
    }

    #[test]
    fn test_signal_anchored_levels_ignore_fill_price_and_atr() {
        let mut strategy = scenario_strategy();
        strategy.exits.anchor = AnchorPolicy::Signal;
        let mut h = Harness::new(strategy);
        arm_and_break(&mut h);

        // ATR has moved to 0.8 by the fill bar; the plan keeps the signal's 0.5
        let fill_snap = IndicatorSnapshot {
            atr: Some(0.8),
            ..snap(65.0, 66.0, 10.30)
        };
        h.step(2, bar(2, 10.55, 10.20, 10.30), fill_snap);

        let SlotState::Open(position) = h.slot.state().clone() else {
            panic!("expected open position, got {}", h.slot.state().label());
        };
        assert!((position.entry_price - 10.40).abs() < 1e-9);
        // Break close 9.95 ± 1.5/3.0 × 0.5
        assert!((position.stop_price - 10.70).abs() < 1e-9);
        assert!((position.target_price - 8.45).abs() < 1e-9);

        // Reaches the signal-anchored stop but not an entry-anchored one (11.15)
        h.step(3, bar(3, 10.75, 10.30, 10.60), snap(66.0, 68.0, 10.60));

        assert_eq!(h.slot.state(), &SlotState::Idle);
        let trade = &h.ledger.trades()[0];
        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert!((trade.exit_price - 10.70).abs() < 1e-9);
    }

    #[test]
    fn test_stop_wins_when_bar_spans_both_levels() {
        let mut h = Harness::new(scenario_strategy());
        arm_and_break(&mut h);
        h.step(2, bar(2, 10.55, 10.20, 10.30), snap(65.0, 66.0, 10.30));

        h.step(3, bar(3, 11.20, 8.80, 10.00), snap(66.0, 50.0, 10.00));

        assert_eq!(h.slot.state(), &SlotState::Idle);
        let trade = &h.ledger.trades()[0];
        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert!((trade.exit_price - 11.15).abs() < 1e-9);
        assert!(trade.pnl_amount < Decimal::ZERO);
        // Loss is the configured 1% of equity
        assert!((trade.pnl_amount + dec!(100)).abs() < dec!(0.01));
    }

    #[test]
    fn test_open_position_closed_at_data_end() {
        let mut h = Harness::new(scenario_strategy());
        arm_and_break(&mut h);
        h.step(2, bar(2, 10.55, 10.20, 10.30), snap(65.0, 66.0, 10.30));
        h.step(3, bar(3, 10.35, 10.10, 10.15), snap(66.0, 60.0, 10.15));

        h.finish();

        assert_eq!(h.slot.state(), &SlotState::Idle);
        let trade = &h.ledger.trades()[0];
        assert_eq!(trade.exit_reason, ExitReason::OpenAtDataEnd);
        assert_eq!(trade.exit_bar, 3);
        assert_eq!(trade.exit_price, 10.15);
    }

    #[test]
    fn test_busy_slot_ignores_new_triggers() {
        let mut h = Harness::new(scenario_strategy());
        arm_and_break(&mut h);

        // Another overbought crossing while the order rests
        h.step(2, bar(2, 10.35, 10.25, 10.30), snap(70.0, 75.0, 10.30));

        assert!(matches!(h.slot.state(), SlotState::Pending(_)));
        assert_eq!(h.counters.setups_armed, 1);
    }

    #[test]
    fn test_expired_order_frees_slot_for_same_bar_detection() {
        let mut h = Harness::new(scenario_strategy());
        arm_and_break(&mut h);
        let miss = |i: usize| bar(i, 10.35, 10.25, 10.30);

        h.step(2, miss(2), snap(65.0, 66.0, 10.30));
        h.step(3, miss(3), snap(66.0, 67.0, 10.30));
        // Expires on bar 4 and re-arms on the same bar
        h.step(4, miss(4), snap(70.0, 73.0, 10.30));

        assert_eq!(h.counters.orders_expired, 1);
        assert!(matches!(h.slot.state(), SlotState::Armed(_)));
        assert_eq!(h.counters.setups_armed, 2);
    }

    #[test]
    fn test_pending_order_dropped_at_data_end() {
        let mut h = Harness::new(scenario_strategy());
        arm_and_break(&mut h);

        h.finish();

        assert_eq!(h.counters.pending_dropped_at_end, 1);
        assert!(h.ledger.trades().is_empty());
        assert!(matches!(
            h.events.last().map(|e| &e.kind),
            Some(EventKind::PendingDropped { order_id: 1 })
        ));
    }

    #[test]
    fn test_fill_rejected_when_stop_not_losing() {
        let mut strategy = scenario_strategy();
        strategy.exits.structural_stop = true;
        let mut h = Harness::new(strategy);
        arm_and_break(&mut h);

        // Fill at 10.40 with a structural stop at 10.30 (window high) is on the winning side
        h.step(2, bar(2, 10.55, 10.20, 10.30), snap(65.0, 66.0, 10.30));

        assert_eq!(h.slot.state(), &SlotState::Idle);
        assert_eq!(h.counters.orders_rejected, 1);
        assert_eq!(h.counters.orders_filled, 0);
    }
}
