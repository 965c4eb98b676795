//! Backtesting engine.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use retrace_core::error::{ConfigError, DataError};
use retrace_core::traits::{ensure_ascending, ensure_valid_prices, SignalDetector, ValidateConfig};
use retrace_core::types::Bar;
use retrace_indicators::IndicatorProvider;
use retrace_risk::PositionSizer;
use retrace_strategies::RsiBreakDetector;

use crate::config::BacktestConfig;
use crate::ledger::Ledger;
use crate::report::BacktestReport;
use crate::slot::{Slot, SlotEnv};
use crate::statistics::{BacktestStats, RunCounters};

/// Single-threaded, deterministic bar-replay engine.
///
/// Every symbol gets its own slot; all slots share one pooled ledger.
pub struct BacktestEngine {
    config: BacktestConfig,
    detector: Box<dyn SignalDetector>,
    sizer: PositionSizer,
    provider: IndicatorProvider,
}

impl BacktestEngine {
    /// Create an engine running the RSI break detector described by
    /// `config.strategy`.
    pub fn new(config: BacktestConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let detector = RsiBreakDetector::new(
            config.strategy.name.clone(),
            config.strategy.detector.clone(),
        )?;
        Self::with_detector(config, Box::new(detector))
    }

    /// Create an engine with a custom detector.
    ///
    /// Indicators are still computed from `config.strategy`.
    pub fn with_detector(
        config: BacktestConfig,
        detector: Box<dyn SignalDetector>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let sizer = PositionSizer::new(config.strategy.sizing.clone())?;
        let provider = IndicatorProvider::new(&config.strategy.indicator_settings())
            .map_err(|e| ConfigError::Malformed(e.to_string()))?;

        Ok(Self {
            config,
            detector,
            sizer,
            provider,
        })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn detector(&self) -> &dyn SignalDetector {
        self.detector.as_ref()
    }

    /// Run over a single series.
    pub fn run_single(&self, symbol: &str, bars: &[Bar]) -> Result<BacktestReport, DataError> {
        let mut data = BTreeMap::new();
        data.insert(symbol.to_string(), bars.to_vec());
        self.run(&data)
    }

    /// Run over every series in `data`.
    ///
    /// Bars of all symbols are replayed in `(timestamp, symbol)` order.
    pub fn run(&self, data: &BTreeMap<String, Vec<Bar>>) -> Result<BacktestReport, DataError> {
        for (symbol, bars) in data {
            if let Err(e) = ensure_ascending(bars).and_then(|_| ensure_valid_prices(bars)) {
                warn!(%symbol, error = %e, "Rejecting series");
                return Err(e);
            }
        }

        let mut slots: Vec<Slot> = data
            .keys()
            .map(|symbol| Slot::new(symbol.clone(), self.provider.clone()))
            .collect();

        // Slot indices follow the map's symbol order, so this is (timestamp, symbol)
        let mut merged: Vec<(i64, usize, &Bar)> = data
            .values()
            .enumerate()
            .flat_map(|(slot, bars)| bars.iter().map(move |bar| (bar.timestamp, slot, bar)))
            .collect();
        merged.sort_by_key(|(timestamp, slot, _)| (*timestamp, *slot));

        let mut ledger = Ledger::new(self.config.initial_equity, self.config.strategy.fees);
        let mut counters = RunCounters::default();
        let mut events = Vec::new();
        let mut next_order_id = 1;

        {
            let mut env = SlotEnv {
                detector: self.detector.as_ref(),
                strategy: &self.config.strategy,
                sizer: &self.sizer,
                ledger: &mut ledger,
                counters: &mut counters,
                events: &mut events,
                next_order_id: &mut next_order_id,
            };

            for (_, slot, bar) in merged {
                slots[slot].on_bar(bar, &mut env);
            }

            let mut settle: Vec<usize> = (0..slots.len()).collect();
            settle.sort_by_key(|&i| (slots[i].last_timestamp(), i));
            for i in settle {
                debug!(symbol = slots[i].symbol(), state = slots[i].state().label(), "Settling slot");
                slots[i].finish(&mut env);
            }
        }

        let stats = BacktestStats::from_ledger(&ledger, counters);
        info!(
            strategy = %self.config.strategy.name,
            symbols = data.len(),
            bars = stats.counters.bars_processed,
            trades = stats.total_trades,
            total_return_pct = %stats.total_return_pct.round_dp(2),
            max_drawdown_pct = %stats.max_drawdown_pct.round_dp(2),
            "Backtest complete"
        );

        Ok(BacktestReport {
            config: self.config.clone(),
            symbols: data.keys().cloned().collect(),
            drawdown_pct: ledger.drawdown_series(),
            equity_curve: ledger.equity_curve().to_vec(),
            trades: ledger.trades().to_vec(),
            stats,
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use proptest::prelude::*;
    use retrace_core::traits::{BarContext, DetectorStep};
    use retrace_core::types::{ArmedSetup, Direction, ExitReason, IndicatorSnapshot, Signal, SignalReason};
    use rust_decimal::Decimal;

    use crate::position::IntrabarPriority;
    use crate::slot::{EventKind, LifecycleEvent};

    const HOUR: i64 = 3_600_000;

    fn wave(n: usize, phase: f64) -> Vec<Bar> {
        let mut prev = 100.0;
        (0..n)
            .map(|i| {
                let x = i as f64;
                let close = 100.0 + 10.0 * (x * 0.15 + phase).sin() + 0.8 * (x * 1.3).sin();
                let open = prev;
                prev = close;
                Bar::new(
                    1_704_067_200_000 + i as i64 * HOUR,
                    open,
                    open.max(close) + 0.4,
                    open.min(close) - 0.4,
                    close,
                    1_000.0,
                )
            })
            .collect()
    }

    fn config() -> BacktestConfig {
        let mut config = BacktestConfig::default();
        config.strategy.detector.max_stop_distance_pct = 20.0;
        config
    }

    fn assert_accounting(report: &BacktestReport) {
        let c = &report.stats.counters;
        assert_eq!(
            c.orders_placed,
            c.orders_filled + c.orders_expired + c.orders_rejected + c.pending_dropped_at_end
        );
        assert_eq!(report.trades.len(), c.orders_filled);
        assert_eq!(report.equity_curve.len(), report.trades.len());
        assert!(report.stats.max_drawdown_pct <= Decimal::ZERO);

        let mut equity = report.stats.initial_equity;
        for (i, trade) in report.trades.iter().enumerate() {
            assert_eq!(trade.trade_index, i + 1);
            equity += trade.pnl_amount;
            assert_eq!(trade.equity_after, equity);
            assert!(trade.exit_bar >= trade.entry_bar);
        }
        assert_eq!(report.stats.final_equity, equity);
    }

    #[test]
    fn test_backtest_runs() {
        let engine = BacktestEngine::new(config()).unwrap();
        let report = engine.run_single("BTCUSDT", &wave(400, 0.0)).unwrap();

        assert_eq!(report.stats.counters.bars_processed, 400);
        assert!(report.stats.counters.setups_armed > 0);
        assert!(report.stats.counters.signals > 0);
        assert_accounting(&report);
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let engine = BacktestEngine::new(config()).unwrap();
        let mut data = BTreeMap::new();
        data.insert("ETHUSDT".to_string(), wave(300, 0.0));
        data.insert("BTCUSDT".to_string(), wave(300, 1.1));

        let first = engine.run(&data).unwrap();
        let second = engine.run(&data).unwrap();

        assert_eq!(
            serde_json::to_string(&first.trades).unwrap(),
            serde_json::to_string(&second.trades).unwrap()
        );
        assert_eq!(first.events, second.events);
        assert_eq!(first.stats, second.stats);
    }

    #[test]
    fn test_multi_symbol_pooled_ledger() {
        let engine = BacktestEngine::new(config()).unwrap();
        let mut data = BTreeMap::new();
        data.insert("ETHUSDT".to_string(), wave(300, 0.0));
        data.insert("BTCUSDT".to_string(), wave(300, 2.0));
        data.insert("SOLUSDT".to_string(), wave(250, 4.0));

        let report = engine.run(&data).unwrap();

        assert_eq!(report.symbols, vec!["BTCUSDT", "ETHUSDT", "SOLUSDT"]);
        assert_eq!(report.stats.counters.bars_processed, 850);
        assert_accounting(&report);
        for pair in report.trades.windows(2) {
            assert!(pair[0].exit_time <= pair[1].exit_time);
        }
    }

    #[test]
    fn test_open_positions_settled_at_data_end() {
        let engine = BacktestEngine::new(config()).unwrap();
        let report = engine.run_single("BTCUSDT", &wave(400, 0.0)).unwrap();

        let at_end = report
            .trades
            .iter()
            .filter(|t| t.exit_reason == ExitReason::OpenAtDataEnd)
            .count();
        assert_eq!(report.stats.open_at_data_end, at_end);
        assert!(at_end <= 1);
    }

    #[test]
    fn test_rejects_unordered_bars() {
        let engine = BacktestEngine::new(config()).unwrap();
        let mut bars = wave(20, 0.0);
        bars.swap(5, 6);

        assert!(matches!(
            engine.run_single("BTCUSDT", &bars),
            Err(DataError::OutOfOrder { index: 6, .. })
        ));
    }

    #[test]
    fn test_rejects_invalid_prices() {
        let engine = BacktestEngine::new(config()).unwrap();
        let mut bars = wave(20, 0.0);
        bars[3].low = bars[3].high + 1.0;

        assert!(matches!(
            engine.run_single("BTCUSDT", &bars),
            Err(DataError::ParseError(_))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = config();
        config.strategy.sizing.risk_pct = Decimal::ZERO;
        assert!(BacktestEngine::new(config).is_err());
    }

    #[test]
    fn test_empty_data() {
        let engine = BacktestEngine::new(config()).unwrap();
        let report = engine.run(&BTreeMap::new()).unwrap();

        assert_eq!(report.stats.total_trades, 0);
        assert!(report.stats.win_rate_pct.is_none());
    }

    /// Emits a signal whenever the schedule says so and records every call.
    struct ScheduledDetector {
        fire: Vec<(bool, bool)>,
        calls: Arc<Mutex<Vec<usize>>>,
        warmup: usize,
    }

    impl SignalDetector for ScheduledDetector {
        fn name(&self) -> &str {
            "scheduled"
        }

        fn warmup_period(&self) -> usize {
            self.warmup
        }

        fn step(&self, _armed: Option<ArmedSetup>, ctx: &BarContext<'_>) -> DetectorStep {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(ctx.bar_index);
            }
            let Some(&(fire, short)) = self.fire.get(ctx.bar_index) else {
                return DetectorStep::Idle;
            };
            if !fire {
                return DetectorStep::Idle;
            }
            let direction = if short { Direction::Short } else { Direction::Long };
            let close = ctx.bar.close;
            DetectorStep::Signal(Signal {
                symbol: ctx.symbol.to_string(),
                direction,
                reference_price: close,
                bar_index: ctx.bar_index,
                timestamp: ctx.bar.timestamp,
                break_level: close,
                stop_reference: direction.adverse(close, close * 0.02),
                atr: ctx.snapshot.atr.unwrap_or(close * 0.01),
                quality: None,
                reason: SignalReason::OversoldReversal,
            })
        }

        fn opposite_trigger(&self, _direction: Direction, _snapshot: &IndicatorSnapshot) -> bool {
            false
        }
    }

    #[test]
    fn test_detector_not_consulted_during_warmup() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let detector = ScheduledDetector {
            fire: Vec::new(),
            calls: Arc::clone(&calls),
            warmup: 5,
        };
        let engine = BacktestEngine::with_detector(config(), Box::new(detector)).unwrap();

        let report = engine.run_single("BTCUSDT", &wave(20, 0.0)).unwrap();

        assert_eq!(report.stats.counters.bars_processed, 20);
        // Index 4 is the fifth bar, the first with a full warm-up behind it
        assert_eq!(*calls.lock().unwrap(), (4..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_target_first_exits_at_target_when_bar_spans_both_levels() {
        let quiet = |i: i64| Bar::new(i * HOUR, 100.0, 100.5, 99.6, 100.0, 1.0);
        let bars = vec![
            quiet(0),
            quiet(1),
            quiet(2),
            // Fills the long limit at 99.5 (break close 100 - 0.5 x ATR 1.0)
            Bar::new(3 * HOUR, 100.0, 100.2, 99.4, 99.8, 1.0),
            // Reaches both the stop (98.0) and the target (102.5)
            Bar::new(4 * HOUR, 99.8, 103.0, 97.5, 100.0, 1.0),
        ];
        let run = |priority: IntrabarPriority| {
            let mut config = config();
            config.strategy.exits.priority = priority;
            let detector = ScheduledDetector {
                fire: vec![(false, false), (false, false), (true, false)],
                calls: Arc::new(Mutex::new(Vec::new())),
                warmup: 0,
            };
            BacktestEngine::with_detector(config, Box::new(detector))
                .unwrap()
                .run_single("BTCUSDT", &bars)
                .unwrap()
        };

        let report = run(IntrabarPriority::TargetFirst);
        assert_eq!(report.trades.len(), 1);
        let trade = &report.trades[0];
        assert!((trade.entry_price - 99.5).abs() < 1e-9);
        assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
        assert!((trade.exit_price - 102.5).abs() < 1e-9);
        assert_eq!(trade.exit_bar, 4);
        assert!(trade.pnl_amount > Decimal::ZERO);

        let report = run(IntrabarPriority::StopFirst);
        assert_eq!(report.trades[0].exit_reason, ExitReason::StopLoss);
        assert!((report.trades[0].exit_price - 98.0).abs() < 1e-9);
    }

    /// Bars strictly between an order's placement and the bar its slot
    /// became idle again.
    fn busy_windows(events: &[LifecycleEvent]) -> Vec<(usize, usize)> {
        let mut windows = Vec::new();
        let mut placed = None;
        for event in events {
            match event.kind {
                EventKind::OrderPlaced { .. } => placed = Some(event.bar_index),
                EventKind::OrderExpired { .. }
                | EventKind::OrderRejected { .. }
                | EventKind::PositionClosed { .. }
                | EventKind::PendingDropped { .. } => {
                    if let Some(start) = placed.take() {
                        windows.push((start, event.bar_index));
                    }
                }
                _ => {}
            }
        }
        windows
    }

    proptest! {
        #[test]
        fn prop_busy_slot_never_consults_detector(
            steps in proptest::collection::vec(
                (-0.03f64..0.03, 0.0f64..0.02, 0.0f64..0.02, any::<bool>(), any::<bool>()),
                30..160,
            ),
            wait in 1usize..5,
            hold in 1usize..10,
        ) {
            let mut close = 100.0;
            let mut bars = Vec::with_capacity(steps.len());
            let mut fire = Vec::with_capacity(steps.len());
            for (i, (ret, up, down, f, short)) in steps.iter().enumerate() {
                let open = close;
                close *= 1.0 + ret;
                bars.push(Bar::new(
                    i as i64 * HOUR,
                    open,
                    open.max(close) * (1.0 + up),
                    open.min(close) * (1.0 - down),
                    close,
                    1.0,
                ));
                fire.push((*f, *short));
            }

            let mut config = BacktestConfig::default();
            config.strategy.entry.max_wait_bars = wait;
            config.strategy.exits.max_hold_bars = Some(hold);
            let calls = Arc::new(Mutex::new(Vec::new()));
            let detector = ScheduledDetector { fire, calls: Arc::clone(&calls), warmup: 0 };
            let engine = BacktestEngine::with_detector(config, Box::new(detector)).unwrap();

            let report = engine.run_single("TEST", &bars).unwrap();
            assert_accounting(&report);

            let calls = calls.lock().unwrap().clone();
            for (start, end) in busy_windows(&report.events) {
                prop_assert!(start <= end);
                prop_assert!(
                    !calls.iter().any(|&bar| start < bar && bar < end),
                    "detector consulted inside busy window {}..{}", start, end
                );
            }
        }
    }
}
