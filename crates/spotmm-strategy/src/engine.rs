//! The market-making control loop.
//!
//! One iteration per refresh interval, in a fixed order: account refresh,
//! open-orders mirror, depth ingest, position init, fill polling, escape
//! check, NAV/risk gate, bootstrap inventory, quote maintenance. The loop
//! never unwinds past its own iteration boundary; transient errors consume
//! one tick.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use spotmm_book::{BookSnapshot, OrderBook, PriceLevel};
use spotmm_core::{
    floor_to_increment, from_units, pow10, round_down_dp, to_units, wall_clock_ms,
    ExchangeFilters, OrderIdFactory, Side, WorkingOrder,
};
use spotmm_exchange::{
    AccountInfo, DepthSnapshot, ExchangeClient, NewOrderRequest, OpenOrder, TradeRecord,
};
use spotmm_ledger::{LedgerConfig, TradeFill, TradeLedger};

use crate::config::{StrategyConfig, QUOTE_ASSET};
use crate::error::{StrategyError, StrategyResult};
use crate::governor::RateLimitGovernor;
use crate::quoting::{plan_quotes, QuoteInputs, QuoteSkip};
use crate::risk::{EscapeThrottle, RiskEvent, RiskState};

/// Depth levels used for volumes and the microprice.
const DEPTH_LEVELS: usize = 5;
const EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 9);
const BPS_DIVISOR: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Mirrored account balances for the pair.
#[derive(Debug, Clone, Copy, Default)]
struct Balances {
    base_free: Decimal,
    base_locked: Decimal,
    quote_free: Decimal,
    quote_locked: Decimal,
}

impl Balances {
    fn total_base(&self) -> Decimal {
        self.base_free + self.base_locked
    }

    fn total_quote(&self) -> Decimal {
        self.quote_free + self.quote_locked
    }
}

/// One fill observed this session, kept in memory for the PnL report.
#[derive(Debug, Clone)]
pub struct FillEvent {
    pub time_ms: i64,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub notional: Decimal,
    pub is_taker: bool,
}

/// The strategy: owns the balance mirror, order mirror, ledger, risk state,
/// and the backoff governor. All exchange calls go through `client`.
pub struct StrategyEngine<C: ExchangeClient> {
    client: Arc<C>,
    config: StrategyConfig,
    base_asset: String,
    book: Arc<OrderBook>,
    ledger: TradeLedger,
    ids: OrderIdFactory,
    governor: RateLimitGovernor,
    risk: RiskState,
    escape_throttle: EscapeThrottle,
    filters: Option<ExchangeFilters>,

    balances: Balances,
    buy_order: Option<WorkingOrder>,
    sell_order: Option<WorkingOrder>,

    position_base: Decimal,
    position_cost: Decimal,
    realized_pnl: Decimal,
    last_trade_id: i64,
    position_initialized: bool,
    fills: Vec<FillEvent>,

    last_depth_update_id: i64,
    last_fill_poll: Option<Instant>,
    first_iteration: bool,

    last_sell_escape: Option<Instant>,
    last_buy_escape: Option<Instant>,
    last_sell_escape_price: Option<Decimal>,
    last_buy_escape_price: Option<Decimal>,
}

impl<C: ExchangeClient> StrategyEngine<C> {
    pub fn new(
        client: Arc<C>,
        book: Arc<OrderBook>,
        config: StrategyConfig,
    ) -> StrategyResult<Self> {
        let base_asset = config.base_asset();
        let mut ledger = TradeLedger::new(LedgerConfig {
            storage_path: config.ledger_path.clone(),
            base_scale: pow10(config.quantity_precision as i32),
            quote_scale: pow10(config.quote_precision as i32),
        })?;

        let mut engine = Self {
            client,
            governor: RateLimitGovernor::new(
                config.rate_limit_backoff_ms_initial,
                config.rate_limit_backoff_ms_max,
            ),
            escape_throttle: EscapeThrottle::new(
                config.taker_escape_cooldown_ms,
                config.max_taker_escapes_per_min,
            ),
            base_asset,
            book,
            ids: OrderIdFactory::new(),
            risk: RiskState::new(),
            filters: None,
            balances: Balances::default(),
            buy_order: None,
            sell_order: None,
            position_base: Decimal::ZERO,
            position_cost: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            last_trade_id: 0,
            position_initialized: false,
            fills: Vec::new(),
            last_depth_update_id: 0,
            last_fill_poll: None,
            first_iteration: true,
            last_sell_escape: None,
            last_buy_escape: None,
            last_sell_escape_price: None,
            last_buy_escape_price: None,
            config,
            ledger: match ledger.load() {
                Ok(_) => ledger,
                Err(err) => {
                    // A damaged ledger must not stop the session; the file
                    // is append-only so nothing gets overwritten.
                    error!(error = %err, "Failed to load trade ledger; starting fresh");
                    ledger
                }
            },
        };

        let state = engine.ledger.state();
        engine.position_base = from_units(state.position_base, engine.ledger.base_scale());
        engine.position_cost = from_units(state.position_cost, engine.ledger.quote_scale());
        engine.realized_pnl = from_units(state.realized_pnl, engine.ledger.quote_scale());
        engine.last_trade_id = state.last_trade_id;
        engine.position_initialized = state.position_base > 0 || state.position_cost > 0;

        if state.last_trade_id > 0 {
            info!(
                last_trade_id = state.last_trade_id,
                position = %engine.position_base,
                cost = %engine.position_cost,
                realized = %engine.realized_pnl,
                "Restored ledger state"
            );
        } else {
            info!("No prior fills found; starting fresh");
        }

        Ok(engine)
    }

    /// Fills observed this session, oldest first.
    pub fn session_fills(&self) -> &[FillEvent] {
        &self.fills
    }

    /// Mirrored position from the ledger: base quantity and its cost basis.
    pub fn position(&self) -> (Decimal, Decimal) {
        (self.position_base, self.position_cost)
    }

    /// Run forever; returns only on a fatal error (ledger overflow or
    /// configuration breakage).
    pub async fn run(&mut self) -> StrategyResult<()> {
        info!(symbol = %self.config.symbol, "Starting market making");
        self.load_symbol_filters().await;

        let refresh = Duration::from_millis(self.config.refresh_interval_ms);
        loop {
            if let Some(wait) = self.governor.wait_duration(Instant::now()) {
                sleep(wait).await;
                continue;
            }
            self.governor.begin_loop();

            let loop_start = Instant::now();
            match self.tick().await {
                Ok(()) => self.governor.note_success(),
                Err(err) if err.is_fatal() => {
                    error!(error = %err, "Fatal strategy error; stopping");
                    return Err(err);
                }
                Err(err) => {
                    if err.is_rate_limit() {
                        self.governor.note_rate_limit(Instant::now());
                    }
                    warn!(error = %err, "Iteration failed; retrying next tick");
                }
            }

            let elapsed = loop_start.elapsed();
            if elapsed < refresh {
                sleep(refresh - elapsed).await;
            }
        }
    }

    async fn tick(&mut self) -> StrategyResult<()> {
        let account = self.client.account_info().await?;
        self.refresh_balances(&account)?;

        let open_orders = self.client.open_orders(&self.config.symbol).await?;
        self.refresh_open_orders(&open_orders);
        let open_ids: HashSet<String> = open_orders
            .iter()
            .map(|order| order.client_order_id.clone())
            .filter(|id| !id.is_empty())
            .collect();
        self.reconcile_orders(&open_ids);

        let depth = self
            .client
            .depth(&self.config.symbol, DEPTH_LEVELS as u32)
            .await?;
        let snap = self.ingest_depth(&depth)?;

        if !self.position_initialized {
            let mark = Self::mark_price(&snap);
            self.position_base = self.balances.total_base();
            self.position_cost = self.position_base * mark;
            self.position_initialized = true;
        }

        self.pull_recent_trades().await?;
        self.enforce_escape_conditions(&snap, &open_ids).await;

        let nav = self.compute_nav(&snap);
        let base_share = self.compute_base_share(nav, &snap);
        let risk_ok = self.enforce_risk_limits(nav, base_share).await;
        self.report_pnl(nav, base_share);

        if !risk_ok {
            return Ok(());
        }
        if !self.ensure_starting_inventory(&snap).await {
            return Ok(());
        }
        self.maintain_quotes(&snap).await;
        Ok(())
    }

    // --- account and order mirrors -----------------------------------------

    fn refresh_balances(&mut self, account: &AccountInfo) -> StrategyResult<()> {
        let base = account.balance(&self.base_asset);
        let quote = account.balance(QUOTE_ASSET);

        self.balances = Balances {
            base_free: base.free.max(Decimal::ZERO),
            base_locked: base.locked.max(Decimal::ZERO),
            quote_free: quote.free.max(Decimal::ZERO),
            quote_locked: quote.locked.max(Decimal::ZERO),
        };

        if self.config.account_staleness_ms > 0 && account.update_time > 0 {
            let age_ms = wall_clock_ms() - account.update_time;
            if age_ms > self.config.account_staleness_ms {
                return Err(StrategyError::StaleAccount { age_ms });
            }
        }

        debug!(
            base = %self.base_asset,
            base_free = %self.balances.base_free,
            base_locked = %self.balances.base_locked,
            quote_free = %self.balances.quote_free,
            quote_locked = %self.balances.quote_locked,
            "Balances refreshed"
        );
        Ok(())
    }

    /// Track the highest-priced BUY and the lowest-priced SELL with enough
    /// remaining size to matter.
    fn refresh_open_orders(&mut self, orders: &[OpenOrder]) {
        self.buy_order = None;
        self.sell_order = None;

        for order in orders {
            let remaining = order.remaining();
            if order.client_order_id.is_empty()
                || order.price <= Decimal::ZERO
                || remaining < self.config.min_base_quantity
            {
                continue;
            }

            let working = WorkingOrder {
                client_id: order.client_order_id.clone(),
                side: order.side,
                price: order.price,
                quantity: remaining,
            };
            match order.side {
                Side::Buy => {
                    if self
                        .buy_order
                        .as_ref()
                        .map(|existing| order.price > existing.price)
                        .unwrap_or(true)
                    {
                        self.buy_order = Some(working);
                    }
                }
                Side::Sell => {
                    if self
                        .sell_order
                        .as_ref()
                        .map(|existing| order.price < existing.price)
                        .unwrap_or(true)
                    {
                        self.sell_order = Some(working);
                    }
                }
            }
        }
    }

    /// Forget tracked orders the exchange no longer reports as open.
    fn reconcile_orders(&mut self, open_ids: &HashSet<String>) {
        if let Some(order) = &self.sell_order {
            if !open_ids.contains(&order.client_id) {
                info!(client_id = %order.client_id, "Sell order closed");
                self.sell_order = None;
            }
        }
        if let Some(order) = &self.buy_order {
            if !open_ids.contains(&order.client_id) {
                info!(client_id = %order.client_id, "Buy order closed");
                self.buy_order = None;
            }
        }
    }

    // --- depth --------------------------------------------------------------

    /// Feed the REST depth snapshot into the book and read back the market
    /// as seen without our own quotes.
    fn ingest_depth(&mut self, depth: &DepthSnapshot) -> StrategyResult<BookSnapshot> {
        if depth.last_update_id < self.last_depth_update_id {
            return Err(StrategyError::DepthRegression {
                received: depth.last_update_id,
                stored: self.last_depth_update_id,
            });
        }
        self.last_depth_update_id = depth.last_update_id;

        let bids: Vec<PriceLevel> = depth
            .bids
            .iter()
            .map(|&(price, quantity)| PriceLevel::new(price, quantity))
            .collect();
        let asks: Vec<PriceLevel> = depth
            .asks
            .iter()
            .map(|&(price, quantity)| PriceLevel::new(price, quantity))
            .collect();
        self.book.apply_snapshot(&bids, &asks, depth.last_update_id);

        let exclude_bids: Vec<Decimal> =
            self.buy_order.iter().map(|order| order.price).collect();
        let exclude_asks: Vec<Decimal> =
            self.sell_order.iter().map(|order| order.price).collect();
        let snap = self
            .book
            .get_snapshot_excluding(&exclude_bids, &exclude_asks, DEPTH_LEVELS);

        debug!(
            best_bid = %snap.best_bid,
            best_ask = %snap.best_ask,
            spread = %snap.spread,
            "Market ex-self"
        );
        Ok(snap)
    }

    fn mark_price(snap: &BookSnapshot) -> Decimal {
        if snap.microprice > EPSILON {
            snap.microprice
        } else {
            snap.best_bid.max(snap.best_ask)
        }
    }

    // --- fills --------------------------------------------------------------

    /// Pull own trades past the cursor and fold them into the ledger.
    async fn pull_recent_trades(&mut self) -> StrategyResult<()> {
        let now = Instant::now();
        if let Some(last) = self.last_fill_poll {
            if now.duration_since(last)
                < Duration::from_millis(self.config.fill_poll_interval_ms)
            {
                return Ok(());
            }
        }
        self.last_fill_poll = Some(now);

        let cursor = self.last_trade_id.max(self.ledger.state().last_trade_id);
        let from_id = (cursor > 0).then_some(cursor + 1);
        let trades = match self
            .client
            .my_trades(&self.config.symbol, from_id, 100)
            .await
        {
            Ok(trades) => trades,
            Err(err) => {
                if err.is_rate_limit() {
                    self.governor.note_rate_limit(Instant::now());
                }
                warn!(error = %err, "Failed to pull recent trades");
                return Ok(());
            }
        };

        let mut fresh: Vec<TradeRecord> =
            trades.into_iter().filter(|trade| trade.id > cursor).collect();
        if fresh.is_empty() {
            return Ok(());
        }
        fresh.sort_by_key(|trade| trade.id);

        for trade in fresh {
            // A ledger failure stops further appends this iteration; the
            // cursor has not advanced past the failed fill, so the next
            // poll re-fetches it.
            self.record_fill(trade)?;
        }

        let state = self.ledger.state();
        self.position_base = from_units(state.position_base, self.ledger.base_scale());
        self.position_cost = from_units(state.position_cost, self.ledger.quote_scale());
        self.realized_pnl = from_units(state.realized_pnl, self.ledger.quote_scale());
        self.last_trade_id = state.last_trade_id;
        self.position_initialized = true;
        Ok(())
    }

    /// Fold commission into the fill quantities and append it to the ledger.
    fn record_fill(&mut self, trade: TradeRecord) -> StrategyResult<()> {
        let mut effective_qty = trade.qty;
        let mut effective_quote = trade.quote_quantity();
        let mut fee_units = 0i64;

        if !trade.commission_asset.is_empty() {
            if trade.commission_asset == self.base_asset {
                effective_qty = (effective_qty - trade.commission).max(Decimal::ZERO);
                fee_units = to_units(trade.commission, self.ledger.base_scale());
            } else if trade.commission_asset == QUOTE_ASSET {
                effective_quote = (effective_quote - trade.commission).max(Decimal::ZERO);
                fee_units = to_units(trade.commission, self.ledger.quote_scale());
            } else {
                // Fee in a third asset: recorded, not applied to cost basis.
                fee_units = to_units(trade.commission, self.ledger.quote_scale());
            }
        }

        let base_units = to_units(effective_qty, self.ledger.base_scale());
        let quote_units = to_units(effective_quote, self.ledger.quote_scale());
        let before = self.ledger.state();

        self.ledger.append(TradeFill {
            id: trade.id,
            time_ms: trade.time,
            side: trade.side(),
            base_qty: base_units,
            quote_qty: quote_units,
            fee_qty: fee_units,
            fee_asset: trade.commission_asset.clone(),
            is_maker: trade.is_maker,
        })?;

        let after = self.ledger.state();
        let realized_delta = from_units(
            after.realized_pnl - before.realized_pnl,
            self.ledger.quote_scale(),
        );

        let event = FillEvent {
            time_ms: trade.time,
            side: trade.side(),
            price: trade.price,
            quantity: from_units(base_units, self.ledger.base_scale()),
            notional: from_units(quote_units, self.ledger.quote_scale()),
            is_taker: !trade.is_maker,
        };
        info!(
            side = %event.side,
            role = if trade.is_maker { "maker" } else { "taker" },
            qty = %event.quantity,
            price = %event.price,
            notional = %event.notional,
            realized_delta = %realized_delta,
            "Fill"
        );
        self.fills.push(event);
        Ok(())
    }

    // --- escape -------------------------------------------------------------

    /// Cancel a resting quote about to be adversely filled and, throttle
    /// permitting, liquidate the exposure with a taker order.
    async fn enforce_escape_conditions(
        &mut self,
        snap: &BookSnapshot,
        open_ids: &HashSet<String>,
    ) {
        let escape_fraction = self.config.escape_bps / BPS_DIVISOR;
        let hysteresis_fraction = self.config.escape_hysteresis_bps / BPS_DIVISOR;
        let min_interval = Duration::from_millis(self.config.min_escape_interval_ms);
        let now = Instant::now();

        if let Some(order) = self.sell_order.clone() {
            let interval_ok = self
                .last_sell_escape
                .map(|last| now.duration_since(last) >= min_interval)
                .unwrap_or(true);
            if open_ids.contains(&order.client_id) && interval_ok {
                let threshold = order.price * (Decimal::ONE - escape_fraction);
                let mut adjusted = threshold - order.price * hysteresis_fraction;
                if let Some(prev) = self.last_sell_escape_price {
                    adjusted = adjusted.min(prev - order.price * hysteresis_fraction);
                }
                if snap.best_bid > EPSILON && snap.best_bid < adjusted {
                    warn!(
                        best_bid = %snap.best_bid,
                        threshold = %threshold,
                        "Sell escape triggered"
                    );
                    self.cancel_tracked_order(&order).await;
                    self.wait_for_order_close(&order.client_id, Side::Sell).await;

                    let notional = order.quantity * snap.best_bid.max(EPSILON);
                    if notional >= self.notional_floor()
                        && self.escape_throttle.try_acquire(now)
                    {
                        self.place_market_order(Side::Sell, order.quantity, notional, "escape_sell")
                            .await;
                    }
                    self.sell_order = None;
                    self.last_sell_escape = Some(now);
                    self.last_sell_escape_price = Some(snap.best_bid);
                }
            }
        }

        if let Some(order) = self.buy_order.clone() {
            let interval_ok = self
                .last_buy_escape
                .map(|last| now.duration_since(last) >= min_interval)
                .unwrap_or(true);
            if open_ids.contains(&order.client_id) && interval_ok {
                let threshold = order.price * (Decimal::ONE + escape_fraction);
                let mut adjusted = threshold + order.price * hysteresis_fraction;
                if let Some(prev) = self.last_buy_escape_price {
                    adjusted = adjusted.max(prev + order.price * hysteresis_fraction);
                }
                if snap.best_ask > adjusted {
                    warn!(
                        best_ask = %snap.best_ask,
                        threshold = %threshold,
                        "Buy escape triggered"
                    );
                    self.cancel_tracked_order(&order).await;
                    self.wait_for_order_close(&order.client_id, Side::Buy).await;

                    let notional = order.quantity * snap.best_ask.max(EPSILON);
                    let spend = self
                        .balances
                        .quote_free
                        .min(self.config.min_quote_order.max(notional));
                    if spend >= self.notional_floor() && self.escape_throttle.try_acquire(now) {
                        self.place_market_order(Side::Buy, order.quantity, spend, "escape_buy")
                            .await;
                    }
                    self.buy_order = None;
                    self.last_buy_escape = Some(now);
                    self.last_buy_escape_price = Some(snap.best_ask);
                }
            }
        }
    }

    fn notional_floor(&self) -> Decimal {
        let exchange_floor = self
            .filters
            .as_ref()
            .map(|filters| filters.min_notional)
            .unwrap_or(Decimal::ZERO);
        self.config.min_quote_order.max(exchange_floor)
    }

    async fn cancel_tracked_order(&mut self, order: &WorkingOrder) {
        if let Err(err) = self
            .client
            .cancel_order(&self.config.symbol, &order.client_id)
            .await
        {
            if err.is_rate_limit() {
                self.governor.note_rate_limit(Instant::now());
            }
            warn!(client_id = %order.client_id, error = %err, "Failed to cancel order");
        }
    }

    /// Poll the order status until it goes terminal or the deadline passes.
    /// Timing out is logged but not fatal; the next reconcile re-discovers
    /// the order if it is in fact still open.
    async fn wait_for_order_close(&mut self, client_id: &str, side: Side) -> bool {
        let deadline = Instant::now() + Duration::from_millis(self.config.order_status_timeout_ms);
        while Instant::now() < deadline {
            sleep(Duration::from_millis(self.config.order_status_poll_ms)).await;
            match self.client.query_order(&self.config.symbol, client_id).await {
                Ok(status) if status.is_terminal() => {
                    info!(%side, client_id, %status, "Confirmed order closed");
                    return true;
                }
                Ok(_) => {}
                Err(err) => {
                    if err.is_rate_limit() {
                        self.governor.note_rate_limit(Instant::now());
                    }
                    warn!(client_id, error = %err, "Failed to query order status");
                }
            }
        }
        warn!(%side, client_id, "Timed out waiting for order to close");
        false
    }

    // --- risk and PnL -------------------------------------------------------

    fn compute_nav(&self, snap: &BookSnapshot) -> Decimal {
        let mark = Self::mark_price(snap);
        self.balances.total_quote() + self.balances.total_base() * mark
    }

    fn compute_base_share(&self, nav: Decimal, snap: &BookSnapshot) -> Decimal {
        if nav <= EPSILON {
            return Decimal::ZERO;
        }
        let mark = Self::mark_price(snap);
        self.balances.total_base() * mark / nav
    }

    async fn enforce_risk_limits(&mut self, nav: Decimal, base_share: Decimal) -> bool {
        let event = self.risk.evaluate(nav, Instant::now(), &self.config);
        if event == RiskEvent::Breached {
            self.cancel_all_quotes().await;
        }

        if base_share > self.config.max_inventory_ratio
            || base_share < Decimal::ONE - self.config.max_inventory_ratio
        {
            info!(
                base_share_pct = %(base_share * Decimal::ONE_HUNDRED),
                "Inventory imbalance"
            );
        }

        self.risk.trading_enabled()
    }

    async fn cancel_all_quotes(&mut self) {
        if let Err(err) = self.client.cancel_open_orders(&self.config.symbol).await {
            if err.is_rate_limit() {
                self.governor.note_rate_limit(Instant::now());
            }
            warn!(error = %err, "Failed to cancel open orders");
        }
    }

    fn report_pnl(&mut self, nav: Decimal, base_share: Decimal) {
        if self.first_iteration || self.risk.initial_nav().is_none() {
            self.first_iteration = false;
            self.risk.note_initial(nav);
            self.realized_pnl = Decimal::ZERO;
            info!(%nav, "Initialized session NAV");
            return;
        }

        let initial = self.risk.initial_nav().unwrap_or(nav);
        let session_pnl = nav - initial;
        let unrealized = session_pnl - self.realized_pnl;
        info!(
            %nav,
            session_pnl = %session_pnl,
            base_share_pct = %(base_share * Decimal::ONE_HUNDRED),
            realized = %self.realized_pnl,
            unrealized = %unrealized,
            "PnL"
        );
    }

    // --- bootstrap and quoting ---------------------------------------------

    /// Make sure both legs have something to quote with. Returns false when
    /// a bootstrap order was placed (or could not be) and quoting should
    /// wait for the next tick.
    async fn ensure_starting_inventory(&mut self, snap: &BookSnapshot) -> bool {
        if !self.risk.trading_enabled() || snap.microprice <= EPSILON {
            return false;
        }

        let mut ready = true;

        if self.balances.quote_free + EPSILON < self.config.min_quote_order
            && self.balances.base_free > self.config.min_base_quantity
        {
            let price = if snap.best_bid > EPSILON {
                snap.best_bid
            } else {
                snap.microprice
            };
            let desired_quote = (self.config.min_quote_order * Decimal::new(15, 1))
                .max(self.config.quote_budget);
            let needed_quote =
                (desired_quote - self.balances.quote_free).max(self.config.min_quote_order);

            let max_sell =
                (self.balances.base_free - self.config.min_base_quantity).max(Decimal::ZERO);
            let sell_qty = floor_to_increment(
                needed_quote / price.max(EPSILON),
                self.config.quantity_increment,
            )
            .min(max_sell);

            if sell_qty >= self.config.min_base_quantity {
                let order_id = self.ids.mint(&self.config.symbol, Some(Side::Sell));
                if self
                    .place_limit_order(Side::Sell, price, sell_qty, &order_id)
                    .await
                {
                    self.sell_order = Some(WorkingOrder {
                        client_id: order_id,
                        side: Side::Sell,
                        price,
                        quantity: sell_qty,
                    });
                    ready = false;
                }
            } else {
                ready = false;
            }
        }

        if ready
            && self.balances.base_free + EPSILON < self.config.min_base_quantity
            && self.balances.quote_free >= self.config.min_quote_order
        {
            let price = if snap.best_ask > EPSILON {
                snap.best_ask
            } else {
                snap.microprice
            };
            let buy_notional = floor_to_increment(
                self.balances
                    .quote_free
                    .min(self.config.min_quote_order.max(self.config.quote_budget)),
                self.config.quote_increment,
            );

            if buy_notional >= self.config.min_quote_order {
                let buy_qty = floor_to_increment(
                    buy_notional / price.max(EPSILON),
                    self.config.quantity_increment,
                );
                if buy_qty >= self.config.min_base_quantity {
                    let order_id = self.ids.mint(&self.config.symbol, Some(Side::Buy));
                    if self
                        .place_limit_order(Side::Buy, price, buy_qty, &order_id)
                        .await
                    {
                        self.buy_order = Some(WorkingOrder {
                            client_id: order_id,
                            side: Side::Buy,
                            price,
                            quantity: buy_qty,
                        });
                        ready = false;
                    }
                }
            } else {
                ready = false;
            }
        }

        ready
    }

    async fn maintain_quotes(&mut self, snap: &BookSnapshot) {
        if !self.risk.trading_enabled() {
            info!("Trading disabled by risk manager; skipping quotes");
            return;
        }

        if self.config.depth_staleness_ms > 0 {
            let age_ms = (Utc::now() - snap.timestamp).num_milliseconds();
            if age_ms > self.config.depth_staleness_ms {
                warn!(age_ms, "Book snapshot stale; skipping quoting");
                return;
            }
        }

        let inputs = QuoteInputs {
            microprice: snap.microprice,
            spread: snap.spread,
            bid_volume: snap.bid_volume,
            ask_volume: snap.ask_volume,
            total_base: self.balances.total_base(),
            total_quote: self.balances.total_quote(),
        };
        let plan = match plan_quotes(&inputs, &self.config) {
            Ok(plan) => plan,
            Err(QuoteSkip::SpreadTooTight { spread_bps }) => {
                info!(%spread_bps, "Spread too tight; skipping quoting");
                return;
            }
            Err(QuoteSkip::InvalidMicroprice) => {
                warn!("Invalid microprice; skipping quoting");
                return;
            }
            Err(QuoteSkip::NoInventory) => {
                warn!("No inventory to deploy");
                return;
            }
            Err(QuoteSkip::CrossedAfterRounding) => {
                warn!("Price rounding collapsed spread; skipping quoting");
                return;
            }
        };

        let total_base = self.balances.total_base();
        let free_base = self.balances.base_free;

        if self.sell_order.is_none()
            && plan.allow_sell
            && total_base > plan.lower_qty
            && free_base > self.config.min_base_quantity
        {
            let excess = (total_base - plan.lower_qty).max(Decimal::ZERO);
            let capacity = (free_base - self.config.min_base_quantity).max(Decimal::ZERO);
            let budget_qty = self.config.quote_budget / plan.sell_price.max(EPSILON);
            let sell_qty = floor_to_increment(
                excess.min(capacity).min(budget_qty),
                self.config.quantity_increment,
            );

            if sell_qty >= self.config.min_base_quantity {
                let order_id = self.ids.mint(&self.config.symbol, Some(Side::Sell));
                if self
                    .place_limit_order(Side::Sell, plan.sell_price, sell_qty, &order_id)
                    .await
                {
                    self.sell_order = Some(WorkingOrder {
                        client_id: order_id,
                        side: Side::Sell,
                        price: plan.sell_price,
                        quantity: sell_qty,
                    });
                }
            }
        } else if self.sell_order.is_none() && !plan.allow_sell {
            info!(base_share = %plan.inventory_ratio, "Sell side paused; base share below guard");
        }

        if self.buy_order.is_none()
            && plan.allow_buy
            && total_base < plan.upper_qty
            && self.balances.quote_free >= self.config.min_quote_order
        {
            let buy_notional = floor_to_increment(
                self.config
                    .quote_budget
                    .min(self.balances.quote_free)
                    .max(self.config.min_quote_order),
                self.config.quote_increment,
            )
            .min(self.balances.quote_free);

            if buy_notional >= self.config.min_quote_order {
                let buy_qty = floor_to_increment(
                    buy_notional / plan.buy_price.max(EPSILON),
                    self.config.quantity_increment,
                );
                if buy_qty >= self.config.min_base_quantity {
                    let order_id = self.ids.mint(&self.config.symbol, Some(Side::Buy));
                    if self
                        .place_limit_order(Side::Buy, plan.buy_price, buy_qty, &order_id)
                        .await
                    {
                        self.buy_order = Some(WorkingOrder {
                            client_id: order_id,
                            side: Side::Buy,
                            price: plan.buy_price,
                            quantity: buy_qty,
                        });
                    }
                }
            }
        } else if self.buy_order.is_none() && !plan.allow_buy {
            info!(base_share = %plan.inventory_ratio, "Buy side paused; base share above guard");
        }
    }

    // --- order placement ----------------------------------------------------

    async fn place_limit_order(
        &mut self,
        side: Side,
        price: Decimal,
        quantity: Decimal,
        client_order_id: &str,
    ) -> bool {
        if price <= Decimal::ZERO || quantity <= Decimal::ZERO {
            return false;
        }

        let quantity = floor_to_increment(quantity, self.config.quantity_increment);
        let notional = quantity * price;
        if quantity < self.config.min_base_quantity || notional < self.config.min_quote_order {
            return false;
        }
        if let Some(filters) = &self.filters {
            if let Err(violation) = filters.check(price, quantity, notional) {
                warn!(%violation, "Order fails exchange filters; not sending");
                return false;
            }
        }

        let request = NewOrderRequest::limit(
            self.config.symbol.clone(),
            side,
            self.format_price(price),
            self.format_quantity(quantity),
            client_order_id.to_string(),
        );
        match self.client.new_order(request).await {
            Ok(ack) => {
                if let Some(status) = &ack.status {
                    if !status.is_accepted() {
                        warn!(%status, "Limit order rejected");
                        return false;
                    }
                }
                info!(
                    %side,
                    order_id = ack.order_id.as_deref().unwrap_or(client_order_id),
                    %price,
                    %quantity,
                    "Placed limit order"
                );
                true
            }
            Err(err) => {
                if err.is_rate_limit() {
                    self.governor.note_rate_limit(Instant::now());
                }
                warn!(error = %err, "Failed to place limit order");
                false
            }
        }
    }

    /// Market orders use base quantity for sells and quote spend for buys;
    /// price-grid filters do not apply.
    async fn place_market_order(
        &mut self,
        side: Side,
        quantity: Decimal,
        quote_amount: Decimal,
        reason: &str,
    ) -> bool {
        let request = match side {
            Side::Sell => {
                let qty = floor_to_increment(quantity, self.config.quantity_increment);
                if qty < self.config.min_base_quantity {
                    return false;
                }
                if let Some(filters) = &self.filters {
                    if let Err(violation) = filters.check(Decimal::ZERO, qty, quote_amount) {
                        warn!(%violation, "Market sell fails exchange filters");
                        return false;
                    }
                }
                NewOrderRequest::market_sell(self.config.symbol.clone(), self.format_quantity(qty))
            }
            Side::Buy => {
                let quote = floor_to_increment(
                    quote_amount.max(self.config.min_quote_order),
                    self.config.quote_increment,
                )
                .min(self.balances.quote_free);
                if quote < self.config.min_quote_order {
                    return false;
                }
                if let Some(filters) = &self.filters {
                    if let Err(violation) =
                        filters.check(Decimal::ZERO, Decimal::ZERO, quote)
                    {
                        warn!(%violation, "Market buy fails exchange filters");
                        return false;
                    }
                }
                NewOrderRequest::market_buy(self.config.symbol.clone(), self.format_quote(quote))
            }
        };

        match self.client.new_order(request).await {
            Ok(ack) => {
                info!(%side, reason, status = ?ack.status, "Executed market order");
                true
            }
            Err(err) => {
                if err.is_rate_limit() {
                    self.governor.note_rate_limit(Instant::now());
                }
                warn!(error = %err, "Failed to place market order");
                false
            }
        }
    }

    // --- startup ------------------------------------------------------------

    async fn load_symbol_filters(&mut self) {
        match self.client.exchange_info(&self.config.symbol).await {
            Ok(info) => {
                self.config.apply_exchange_filters(&info.filters);
                info!(
                    tick_size = %info.filters.tick_size,
                    step_size = %info.filters.step_size,
                    min_notional = %info.filters.min_notional,
                    "Loaded symbol filters"
                );
                self.filters = Some(info.filters);
            }
            Err(err) => {
                if err.is_rate_limit() {
                    self.governor.note_rate_limit(Instant::now());
                }
                warn!(error = %err, "Failed to load symbol filters");
            }
        }
    }

    // --- formatting ---------------------------------------------------------

    fn format_price(&self, value: Decimal) -> String {
        round_down_dp(value, self.config.price_precision).to_string()
    }

    fn format_quantity(&self, value: Decimal) -> String {
        round_down_dp(value, self.config.quantity_precision).to_string()
    }

    fn format_quote(&self, value: Decimal) -> String {
        round_down_dp(value, self.config.quote_precision).to_string()
    }
}
