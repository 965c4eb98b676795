//! Live slot runner.
//!
//! Drives the same slot lifecycle as the backtester against an
//! [`ExchangeClient`]. Each symbol's slot sits behind its own async mutex.
//! Bar processing and fill notifications both take it, so a fill racing an
//! expiry cancel resolves to exactly one outcome.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::{Stream, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use retrace_backtest::orders;
use retrace_backtest::position::{check_exit, plan_exits};
use retrace_backtest::{
    detect, BacktestConfig, BacktestStats, Detection, EventKind, Ledger, LifecycleEvent,
    RunCounters, StrategyConfig,
};
use retrace_core::error::{ConfigError, ExchangeError};
use retrace_core::traits::{BarContext, ExchangeClient, SignalDetector, ValidateConfig};
use retrace_core::types::{
    ArmedSetup, Bar, CancelOutcome, ExitReason, Fill, OrderRequest, PendingOrder, Position,
    Signal, Timeframe,
};
use retrace_indicators::IndicatorProvider;
use retrace_risk::PositionSizer;
use retrace_strategies::RsiBreakDetector;

/// Live runner errors.
#[derive(Error, Debug)]
pub enum LiveError {
    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

/// Which clock pending-order expiry is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockMode {
    /// System time
    #[default]
    Wall,
    /// Close time of the bar being processed, for replaying history
    BarClose,
}

/// Live runner settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Bar interval of the feed
    pub timeframe: Timeframe,
    pub clock: ClockMode,
}

/// A limit order resting at the exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveOrder {
    pub order: PendingOrder,
    pub exchange_id: Uuid,
    /// Notional submitted with the order
    pub size: Decimal,
    /// Cancel once the clock reaches this instant
    pub expires_at: DateTime<Utc>,
}

/// What a live slot currently holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum LiveState {
    #[default]
    Idle,
    Armed(ArmedSetup),
    Pending(LiveOrder),
    Open(Position),
}

impl LiveState {
    pub fn is_busy(&self) -> bool {
        matches!(self, LiveState::Pending(_) | LiveState::Open(_))
    }

    fn armed(&self) -> Option<ArmedSetup> {
        match self {
            LiveState::Armed(setup) => Some(*setup),
            _ => None,
        }
    }
}

struct LiveSlot {
    provider: IndicatorProvider,
    state: LiveState,
    last_bar: Option<(usize, Bar)>,
    last_atr: Option<f64>,
}

#[derive(Default)]
struct Journal {
    counters: RunCounters,
    events: Vec<LifecycleEvent>,
}

impl Journal {
    fn record(&mut self, symbol: &str, bar_index: usize, timestamp: i64, kind: EventKind) {
        self.events.push(LifecycleEvent {
            symbol: symbol.to_string(),
            bar_index,
            timestamp,
            kind,
        });
    }
}

/// Runs one slot per symbol against an exchange, settling into a pooled
/// ledger.
pub struct LiveTrader {
    exchange: Arc<dyn ExchangeClient>,
    detector: Box<dyn SignalDetector>,
    strategy: StrategyConfig,
    sizer: PositionSizer,
    live: LiveConfig,
    slots: BTreeMap<String, Mutex<LiveSlot>>,
    ledger: Arc<Mutex<Ledger>>,
    journal: Mutex<Journal>,
    next_order_id: AtomicU64,
}

impl LiveTrader {
    /// Create a trader running the RSI break detector described by
    /// `config.strategy`.
    pub fn new(
        config: BacktestConfig,
        live: LiveConfig,
        symbols: &[String],
        exchange: Arc<dyn ExchangeClient>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let detector = RsiBreakDetector::new(
            config.strategy.name.clone(),
            config.strategy.detector.clone(),
        )?;
        Self::with_detector(config, live, symbols, exchange, Box::new(detector))
    }

    /// Create a trader with a custom detector.
    pub fn with_detector(
        config: BacktestConfig,
        live: LiveConfig,
        symbols: &[String],
        exchange: Arc<dyn ExchangeClient>,
        detector: Box<dyn SignalDetector>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let sizer = PositionSizer::new(config.strategy.sizing.clone())?;
        let provider = IndicatorProvider::new(&config.strategy.indicator_settings())
            .map_err(|e| ConfigError::Malformed(e.to_string()))?;

        let slots = symbols
            .iter()
            .map(|symbol| {
                let slot = LiveSlot {
                    provider: provider.clone(),
                    state: LiveState::Idle,
                    last_bar: None,
                    last_atr: None,
                };
                (symbol.clone(), Mutex::new(slot))
            })
            .collect();

        Ok(Self {
            exchange,
            detector,
            sizer,
            live,
            slots,
            ledger: Arc::new(Mutex::new(Ledger::new(
                config.initial_equity,
                config.strategy.fees,
            ))),
            strategy: config.strategy,
            journal: Mutex::new(Journal::default()),
            next_order_id: AtomicU64::new(1),
        })
    }

    /// Shared handle to the pooled ledger.
    pub fn ledger(&self) -> Arc<Mutex<Ledger>> {
        Arc::clone(&self.ledger)
    }

    pub async fn state(&self, symbol: &str) -> Option<LiveState> {
        match self.slots.get(symbol) {
            Some(slot) => Some(slot.lock().await.state.clone()),
            None => None,
        }
    }

    pub async fn counters(&self) -> RunCounters {
        self.journal.lock().await.counters.clone()
    }

    pub async fn events(&self) -> Vec<LifecycleEvent> {
        self.journal.lock().await.events.clone()
    }

    pub async fn stats(&self) -> BacktestStats {
        let counters = self.counters().await;
        let ledger = self.ledger.lock().await;
        BacktestStats::from_ledger(&ledger, counters)
    }

    fn clock(&self, bar: &Bar) -> DateTime<Utc> {
        match self.live.clock {
            ClockMode::Wall => Utc::now(),
            ClockMode::BarClose => bar.datetime() + self.bar_span(1),
        }
    }

    fn bar_span(&self, bars: usize) -> Duration {
        self.live.timeframe.span(bars)
    }

    /// Process a completed bar for `symbol`.
    pub async fn on_bar(&self, symbol: &str, bar: &Bar) -> Result<(), LiveError> {
        let slot = self
            .slots
            .get(symbol)
            .ok_or_else(|| LiveError::UnknownSymbol(symbol.to_string()))?;
        let mut slot = slot.lock().await;

        let now = self.clock(bar);
        let index = slot.provider.bars_seen();
        let snapshot = slot.provider.update(bar);
        slot.last_bar = Some((index, *bar));
        slot.last_atr = snapshot.atr;
        self.journal.lock().await.counters.bars_processed += 1;
        if index + 1 < self.detector.warmup_period() && !slot.state.is_busy() {
            return Ok(());
        }

        let state = match std::mem::take(&mut slot.state) {
            LiveState::Pending(order) => {
                self.service_pending(order, index, bar, now, snapshot.atr).await
            }
            LiveState::Open(position) => {
                let exits = &self.strategy.exits;
                let opposite = exits.exit_on_opposite
                    && self.detector.opposite_trigger(position.direction, &snapshot);
                self.service_open(position, index, bar, opposite).await
            }
            other => other,
        };

        slot.state = if state.is_busy() {
            state
        } else {
            let ctx = BarContext {
                symbol,
                bar_index: index,
                bar,
                snapshot: &snapshot,
            };
            let detection = {
                let mut journal = self.journal.lock().await;
                let journal = &mut *journal;
                detect(
                    self.detector.as_ref(),
                    state.armed(),
                    &ctx,
                    &mut journal.counters,
                    &mut journal.events,
                )
            };
            match detection {
                Detection::Idle => LiveState::Idle,
                Detection::Armed(setup) => LiveState::Armed(setup),
                Detection::Signal(signal) => self.place(signal, index, bar, now, snapshot.atr).await,
            }
        };

        Ok(())
    }

    /// Handle a fill notification from the exchange.
    ///
    /// Fills for orders that are no longer pending (already resolved by
    /// a cancel, or exit orders) are ignored.
    pub async fn on_fill(&self, fill: Fill) {
        for (symbol, slot) in &self.slots {
            let mut slot = slot.lock().await;
            match std::mem::take(&mut slot.state) {
                LiveState::Pending(order) if order.exchange_id == fill.order_id => {
                    let index = slot.provider.bars_seen();
                    let atr = slot.last_atr;
                    debug!(%symbol, order = order.order.id, "Fill notification");
                    slot.state = self.open(order, fill, index, atr).await;
                    return;
                }
                other => slot.state = other,
            }
        }
        debug!(order = %fill.order_id, "Fill for an order no longer pending");
    }

    async fn discard(&self, symbol: &str, index: usize, bar: &Bar, reason: &str) {
        debug!(%symbol, bar = index, %reason, "Signal discarded");
        let mut journal = self.journal.lock().await;
        journal.counters.signals_discarded += 1;
        journal.record(symbol, index, bar.timestamp, EventKind::SignalDiscarded);
    }

    async fn place(
        &self,
        signal: Signal,
        index: usize,
        bar: &Bar,
        now: DateTime<Utc>,
        atr: Option<f64>,
    ) -> LiveState {
        let symbol = signal.symbol.clone();
        let id = self.next_order_id.fetch_add(1, Ordering::Relaxed);
        let Some(order) = orders::place_order(id, &self.strategy.entry, signal) else {
            self.discard(&symbol, index, bar, "unusable limit price").await;
            return LiveState::Idle;
        };

        // Sized against the limit; the plan is recomputed at the actual fill
        let atr = atr.unwrap_or(order.signal.atr);
        let plan = match plan_exits(&self.strategy.exits, &order.signal, order.limit_price, atr) {
            Ok(plan) => plan,
            Err(rejection) => {
                self.discard(&symbol, index, bar, &rejection.to_string()).await;
                return LiveState::Idle;
            }
        };
        let equity = self.ledger.lock().await.equity();
        let decision =
            match self
                .sizer
                .size(equity, order.limit_price, plan.stop, order.signal.quality)
            {
                Ok(decision) => decision,
                Err(e) => {
                    self.discard(&symbol, index, bar, &e.to_string()).await;
                    return LiveState::Idle;
                }
            };

        let request = OrderRequest::limit(
            &symbol,
            order.direction.entry_side(),
            decision.size,
            order.limit_price,
        )
        .with_client_order_id(format!("{}-{}", symbol, id));

        let placed = match self.exchange.place_order(request).await {
            Ok(placed) => placed,
            Err(e) => {
                warn!(%symbol, error = %e, "Limit order submission failed");
                self.discard(&symbol, index, bar, &e.to_string()).await;
                return LiveState::Idle;
            }
        };

        info!(
            %symbol,
            order = id,
            exchange_id = %placed.id,
            direction = %order.direction,
            limit = order.limit_price,
            size = %decision.size,
            "Limit order placed"
        );
        {
            let mut journal = self.journal.lock().await;
            journal.counters.orders_placed += 1;
            journal.record(
                &symbol,
                index,
                bar.timestamp,
                EventKind::OrderPlaced {
                    order_id: id,
                    direction: order.direction,
                    limit_price: order.limit_price,
                },
            );
        }

        LiveState::Pending(LiveOrder {
            expires_at: now + self.bar_span(order.expiry_bars),
            order,
            exchange_id: placed.id,
            size: decision.size,
        })
    }

    async fn service_pending(
        &self,
        order: LiveOrder,
        index: usize,
        bar: &Bar,
        now: DateTime<Utc>,
        atr: Option<f64>,
    ) -> LiveState {
        if now >= order.expires_at {
            return match self.exchange.cancel_order(order.exchange_id).await {
                Ok(CancelOutcome::AlreadyFilled(fill)) => self.open(order, fill, index, atr).await,
                Ok(CancelOutcome::Canceled | CancelOutcome::AlreadyCanceled) => {
                    info!(symbol = %order.order.symbol, order = order.order.id, "Limit order expired");
                    let mut journal = self.journal.lock().await;
                    journal.counters.orders_expired += 1;
                    journal.record(
                        &order.order.symbol,
                        index,
                        bar.timestamp,
                        EventKind::OrderExpired {
                            order_id: order.order.id,
                        },
                    );
                    LiveState::Idle
                }
                Err(e) => {
                    warn!(order = order.order.id, error = %e, "Cancel failed, retrying next bar");
                    LiveState::Pending(order)
                }
            };
        }

        match self.exchange.poll_fill(order.exchange_id).await {
            Ok(Some(fill)) => self.open(order, fill, index, atr).await,
            Ok(None) => LiveState::Pending(order),
            Err(e) => {
                warn!(order = order.order.id, error = %e, "Fill poll failed");
                LiveState::Pending(order)
            }
        }
    }

    async fn open(
        &self,
        order: LiveOrder,
        fill: Fill,
        index: usize,
        atr: Option<f64>,
    ) -> LiveState {
        let LiveOrder { order, .. } = order;
        let symbol = order.symbol.clone();
        let timestamp = fill.timestamp.timestamp_millis();
        let atr = atr.unwrap_or(order.signal.atr);

        let plan = match plan_exits(&self.strategy.exits, &order.signal, fill.price, atr) {
            Ok(plan) => plan,
            Err(rejection) => {
                warn!(%symbol, order = order.id, reason = %rejection, "Fill rejected, flattening");
                let flatten =
                    OrderRequest::market(&symbol, order.direction.exit_side(), fill.size);
                if let Err(e) = self.exchange.place_order(flatten).await {
                    warn!(%symbol, error = %e, "Flatten order failed");
                }
                let mut journal = self.journal.lock().await;
                journal.counters.orders_rejected += 1;
                journal.record(
                    &symbol,
                    index,
                    timestamp,
                    EventKind::OrderRejected {
                        order_id: order.id,
                        reason: rejection.to_string(),
                    },
                );
                return LiveState::Idle;
            }
        };

        info!(
            %symbol,
            order = order.id,
            price = fill.price,
            stop = plan.stop,
            target = plan.target,
            "Position opened"
        );
        {
            let mut journal = self.journal.lock().await;
            journal.counters.orders_filled += 1;
            journal.record(
                &symbol,
                index,
                timestamp,
                EventKind::OrderFilled {
                    order_id: order.id,
                    price: fill.price,
                },
            );
        }

        LiveState::Open(Position {
            symbol,
            direction: order.direction,
            entry_price: fill.price,
            entry_bar: index,
            entry_time: timestamp,
            stop_price: plan.stop,
            target_price: plan.target,
            size: fill.size,
            signal: order.signal,
        })
    }

    async fn service_open(
        &self,
        position: Position,
        index: usize,
        bar: &Bar,
        opposite: bool,
    ) -> LiveState {
        let Some(exit) = check_exit(&self.strategy.exits, &position, index, bar, opposite) else {
            return LiveState::Open(position);
        };
        match self
            .close(&position, index, bar.timestamp, exit.price, exit.reason)
            .await
        {
            Ok(()) => LiveState::Idle,
            Err(e) => {
                warn!(symbol = %position.symbol, error = %e, "Exit order failed, retrying next bar");
                LiveState::Open(position)
            }
        }
    }

    /// Submit a market exit and realize the position at `price`.
    async fn close(
        &self,
        position: &Position,
        index: usize,
        timestamp: i64,
        price: f64,
        reason: ExitReason,
    ) -> Result<(), ExchangeError> {
        let request =
            OrderRequest::market(&position.symbol, position.direction.exit_side(), position.size);
        let order = self.exchange.place_order(request).await?;
        if let Some(fill) = &order.fill {
            debug!(symbol = %position.symbol, slippage = fill.price - price, "Exit filled");
        }

        let trade_index = self
            .ledger
            .lock()
            .await
            .close(position, index, timestamp, price, reason)
            .trade_index;
        info!(symbol = %position.symbol, trade = trade_index, %reason, price, "Position closed");

        self.journal.lock().await.record(
            &position.symbol,
            index,
            timestamp,
            EventKind::PositionClosed {
                trade_index,
                reason,
                price,
            },
        );
        Ok(())
    }

    /// Close out every slot at the end of a feed: open positions exit at
    /// the last close, pending orders are canceled.
    pub async fn settle(&self) {
        let mut order = Vec::with_capacity(self.slots.len());
        for (symbol, slot) in &self.slots {
            let last = slot.lock().await.last_bar.map(|(_, bar)| bar.timestamp);
            order.push((last, symbol));
        }
        order.sort();

        for (_, symbol) in order {
            let Some(slot) = self.slots.get(symbol) else {
                continue;
            };
            let mut slot = slot.lock().await;
            let Some((index, bar)) = slot.last_bar else {
                continue;
            };

            let state = match std::mem::take(&mut slot.state) {
                LiveState::Pending(pending) => {
                    match self.exchange.cancel_order(pending.exchange_id).await {
                        Ok(CancelOutcome::AlreadyFilled(fill)) => {
                            self.open(pending, fill, index, slot.last_atr).await
                        }
                        outcome => {
                            if let Err(e) = outcome {
                                warn!(%symbol, error = %e, "Cancel at end of feed failed");
                            }
                            let mut journal = self.journal.lock().await;
                            journal.counters.pending_dropped_at_end += 1;
                            journal.record(
                                symbol,
                                index,
                                bar.timestamp,
                                EventKind::PendingDropped {
                                    order_id: pending.order.id,
                                },
                            );
                            LiveState::Idle
                        }
                    }
                }
                other => other,
            };

            slot.state = match state {
                LiveState::Open(position) => {
                    match self
                        .close(&position, index, bar.timestamp, bar.close, ExitReason::OpenAtDataEnd)
                        .await
                    {
                        Ok(()) => LiveState::Idle,
                        Err(e) => {
                            warn!(%symbol, error = %e, "Exit at end of feed failed");
                            LiveState::Open(position)
                        }
                    }
                }
                LiveState::Armed(_) | LiveState::Idle => LiveState::Idle,
                pending => pending,
            };
        }
    }

    /// Consume a bar feed and fill notifications until the feed ends, then
    /// settle and report.
    pub async fn run<S>(
        &self,
        bars: S,
        mut fills: mpsc::UnboundedReceiver<Fill>,
    ) -> Result<BacktestStats, LiveError>
    where
        S: Stream<Item = (String, Bar)>,
    {
        let mut bars = std::pin::pin!(bars);
        info!(
            exchange = self.exchange.name(),
            symbols = self.slots.len(),
            "Live trader started"
        );

        loop {
            tokio::select! {
                biased;
                Some(fill) = fills.recv() => self.on_fill(fill).await,
                next = bars.next() => match next {
                    Some((symbol, bar)) => self.on_bar(&symbol, &bar).await?,
                    None => break,
                },
            }
        }
        while let Ok(fill) = fills.try_recv() {
            self.on_fill(fill).await;
        }
        self.settle().await;

        let stats = self.stats().await;
        info!(
            trades = stats.total_trades,
            final_equity = %stats.final_equity,
            "Live trader stopped"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::{replay_feed, PaperExchange};
    use retrace_core::types::{Direction, IndicatorSnapshot, OrderStatus, SignalReason};
    use retrace_core::traits::DetectorStep;

    const HOUR: i64 = 3_600_000;

    /// Signals long on one bar index and stays idle otherwise.
    struct SignalOn {
        at: usize,
        warmup: usize,
    }

    impl SignalDetector for SignalOn {
        fn name(&self) -> &str {
            "signal_on"
        }

        fn warmup_period(&self) -> usize {
            self.warmup
        }

        fn step(&self, _armed: Option<ArmedSetup>, ctx: &BarContext<'_>) -> DetectorStep {
            if ctx.bar_index != self.at {
                return DetectorStep::Idle;
            }
            DetectorStep::Signal(Signal {
                symbol: ctx.symbol.to_string(),
                direction: Direction::Long,
                reference_price: ctx.bar.close,
                bar_index: ctx.bar_index,
                timestamp: ctx.bar.timestamp,
                break_level: ctx.bar.close,
                stop_reference: ctx.bar.low - 2.0,
                atr: 1.0,
                quality: None,
                reason: SignalReason::OversoldReversal,
            })
        }

        fn opposite_trigger(&self, _direction: Direction, _snapshot: &IndicatorSnapshot) -> bool {
            false
        }
    }

    fn bars(fill_low: f64) -> Vec<Bar> {
        vec![
            Bar::new(0, 100.0, 100.2, 99.8, 100.0, 1.0),
            Bar::new(HOUR, 100.0, 100.2, 99.8, 100.0, 1.0),
            // Signal: limit 99.5, stop 98.0, target 102.5
            Bar::new(2 * HOUR, 100.0, 100.2, 99.8, 100.0, 1.0),
            Bar::new(3 * HOUR, 100.0, 100.1, fill_low, 99.6, 1.0),
            Bar::new(4 * HOUR, 99.6, 103.0, 99.5, 102.8, 1.0),
        ]
    }

    fn trader(max_wait_bars: usize, exchange: Arc<PaperExchange>) -> LiveTrader {
        trader_with_warmup(max_wait_bars, 0, exchange)
    }

    fn trader_with_warmup(
        max_wait_bars: usize,
        warmup: usize,
        exchange: Arc<PaperExchange>,
    ) -> LiveTrader {
        let mut config = BacktestConfig::default();
        config.strategy.entry.max_wait_bars = max_wait_bars;
        let live = LiveConfig {
            timeframe: Timeframe::Hour1,
            clock: ClockMode::BarClose,
        };
        LiveTrader::with_detector(
            config,
            live,
            &["SOLUSDT".to_string()],
            exchange,
            Box::new(SignalOn { at: 2, warmup }),
        )
        .unwrap()
    }

    async fn feed(exchange: &PaperExchange, trader: &LiveTrader, bar: &Bar) -> Vec<Fill> {
        let fills = exchange.on_bar_at("SOLUSDT", bar, bar.datetime()).await;
        trader.on_bar("SOLUSDT", bar).await.unwrap();
        fills
    }

    fn pending_id(state: Option<LiveState>) -> Uuid {
        match state {
            Some(LiveState::Pending(order)) => order.exchange_id,
            other => panic!("expected pending order, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_order_before_warmup_completes() {
        let exchange = Arc::new(PaperExchange::new());
        // Bar 2 signals, but four bars are needed first
        let trader = trader_with_warmup(3, 4, exchange.clone());

        for bar in &bars(99.3) {
            feed(&exchange, &trader, bar).await;
        }

        assert_eq!(trader.state("SOLUSDT").await, Some(LiveState::Idle));
        assert!(exchange.open_orders("SOLUSDT").await.is_empty());
        let ledger = trader.ledger();
        assert!(ledger.lock().await.trades().is_empty());
    }

    #[tokio::test]
    async fn test_fill_then_take_profit() {
        let exchange = Arc::new(PaperExchange::new());
        let trader = trader(3, exchange.clone());
        let bars = bars(99.3);

        for bar in &bars[..3] {
            feed(&exchange, &trader, bar).await;
        }
        let id = pending_id(trader.state("SOLUSDT").await);
        assert_eq!(exchange.order(id).await.unwrap().status, OrderStatus::Open);

        feed(&exchange, &trader, &bars[3]).await;
        match trader.state("SOLUSDT").await {
            Some(LiveState::Open(position)) => {
                assert_eq!(position.entry_price, 99.5);
                assert_eq!(position.entry_bar, 3);
                assert!((position.stop_price - 98.0).abs() < 1e-9);
                assert!((position.target_price - 102.5).abs() < 1e-9);
            }
            other => panic!("expected open position, got {:?}", other),
        }

        feed(&exchange, &trader, &bars[4]).await;
        assert_eq!(trader.state("SOLUSDT").await, Some(LiveState::Idle));

        let ledger = trader.ledger();
        let ledger = ledger.lock().await;
        assert_eq!(ledger.trades().len(), 1);
        assert_eq!(ledger.trades()[0].exit_reason, ExitReason::TakeProfit);
        assert_eq!(ledger.trades()[0].exit_price, 102.5);
        assert!(ledger.equity() > ledger.initial_equity());
    }

    #[tokio::test]
    async fn test_fill_racing_expiry_opens_once() {
        let exchange = Arc::new(PaperExchange::new());
        let trader = trader(1, exchange.clone());
        let bars = bars(99.3);

        for bar in &bars[..3] {
            feed(&exchange, &trader, bar).await;
        }
        let fills = exchange
            .on_bar_at("SOLUSDT", &bars[3], bars[3].datetime())
            .await;
        assert_eq!(fills.len(), 1);

        // The bar expires the order while the fill notification is in flight
        let (_, result) = tokio::join!(
            trader.on_fill(fills[0].clone()),
            trader.on_bar("SOLUSDT", &bars[3])
        );
        result.unwrap();
        // A duplicate notification changes nothing
        trader.on_fill(fills[0].clone()).await;

        match trader.state("SOLUSDT").await {
            Some(LiveState::Open(position)) => assert_eq!(position.entry_price, 99.5),
            other => panic!("expected open position, got {:?}", other),
        }
        let counters = trader.counters().await;
        assert_eq!(counters.orders_placed, 1);
        assert_eq!(counters.orders_filled, 1);
        assert_eq!(counters.orders_expired, 0);
    }

    #[tokio::test]
    async fn test_unfilled_order_expires_and_late_fill_ignored() {
        let exchange = Arc::new(PaperExchange::new());
        let trader = trader(1, exchange.clone());
        let bars = bars(99.7);

        for bar in &bars[..3] {
            feed(&exchange, &trader, bar).await;
        }
        let id = pending_id(trader.state("SOLUSDT").await);

        feed(&exchange, &trader, &bars[3]).await;
        assert_eq!(trader.state("SOLUSDT").await, Some(LiveState::Idle));
        assert_eq!(exchange.order(id).await.unwrap().status, OrderStatus::Canceled);

        trader
            .on_fill(Fill {
                order_id: id,
                price: 99.5,
                size: Decimal::ONE,
                timestamp: bars[3].datetime(),
            })
            .await;
        assert_eq!(trader.state("SOLUSDT").await, Some(LiveState::Idle));

        let counters = trader.counters().await;
        assert_eq!(counters.orders_expired, 1);
        assert_eq!(counters.orders_filled, 0);
    }

    #[tokio::test]
    async fn test_settle_closes_open_position() {
        let exchange = Arc::new(PaperExchange::new());
        let trader = trader(3, exchange.clone());
        let bars = bars(99.3);

        for bar in &bars[..4] {
            feed(&exchange, &trader, bar).await;
        }
        trader.settle().await;

        let stats = trader.stats().await;
        assert_eq!(stats.total_trades, 1);
        assert_eq!(stats.open_at_data_end, 1);
        let ledger = trader.ledger();
        let ledger = ledger.lock().await;
        assert_eq!(ledger.trades()[0].exit_price, 99.6);
        assert_eq!(ledger.trades()[0].exit_reason, ExitReason::OpenAtDataEnd);
    }

    #[tokio::test]
    async fn test_run_over_replayed_feed() {
        let (exchange, fills) = PaperExchange::with_fill_notifications();
        let exchange = Arc::new(exchange);
        let trader = trader(3, exchange.clone());

        let mut data = BTreeMap::new();
        data.insert("SOLUSDT".to_string(), bars(99.3));
        let stats = trader
            .run(replay_feed(exchange.clone(), data), fills)
            .await
            .unwrap();

        assert_eq!(stats.total_trades, 1);
        assert_eq!(stats.exit_reasons.get(&ExitReason::TakeProfit), Some(&1));
        assert_eq!(stats.counters.bars_processed, 5);
        assert_eq!(stats.counters.orders_filled, 1);
    }

    #[tokio::test]
    async fn test_unknown_symbol() {
        let exchange = Arc::new(PaperExchange::new());
        let trader = trader(3, exchange);
        let bar = Bar::new(0, 1.0, 1.0, 1.0, 1.0, 1.0);

        assert!(matches!(
            trader.on_bar("DOGEUSDT", &bar).await,
            Err(LiveError::UnknownSymbol(_))
        ));
    }
}
