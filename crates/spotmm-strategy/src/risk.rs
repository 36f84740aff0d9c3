//! Drawdown halt and taker-escape throttling.

use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::config::StrategyConfig;

/// What a risk evaluation decided this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskEvent {
    /// No state change.
    Unchanged,
    /// Drawdown breached a threshold; quoting disabled, orders must be
    /// cancelled.
    Breached,
    /// Cooldown elapsed and NAV recovered; quoting re-enabled.
    Recovered,
}

/// Session drawdown tracking against the peak NAV.
///
/// Recovery requires both the cooldown to elapse and NAV to climb back above
/// the half-drawdown line `peak * (1 - 0.5 * max_drawdown_pct)`.
#[derive(Debug)]
pub struct RiskState {
    trading_enabled: bool,
    initial_nav: Option<Decimal>,
    session_peak_nav: Option<Decimal>,
    disabled_since: Option<Instant>,
}

impl Default for RiskState {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskState {
    pub fn new() -> Self {
        Self {
            trading_enabled: true,
            initial_nav: None,
            session_peak_nav: None,
            disabled_since: None,
        }
    }

    pub fn trading_enabled(&self) -> bool {
        self.trading_enabled
    }

    pub fn initial_nav(&self) -> Option<Decimal> {
        self.initial_nav
    }

    pub fn session_peak_nav(&self) -> Option<Decimal> {
        self.session_peak_nav
    }

    /// Record the session baseline; called once on the first loop iteration.
    pub fn note_initial(&mut self, nav: Decimal) {
        self.initial_nav = Some(nav);
        self.session_peak_nav = Some(nav);
    }

    /// Evaluate the drawdown gates for this tick's NAV.
    pub fn evaluate(&mut self, nav: Decimal, now: Instant, config: &StrategyConfig) -> RiskEvent {
        // No baseline yet: first iteration, nothing to compare against.
        let Some(_) = self.initial_nav else {
            self.session_peak_nav = Some(nav);
            self.trading_enabled = true;
            self.disabled_since = None;
            return RiskEvent::Unchanged;
        };

        let peak = match self.session_peak_nav {
            Some(peak) if nav <= peak => peak,
            _ => {
                self.session_peak_nav = Some(nav);
                nav
            }
        };

        let drawdown_abs = peak - nav;
        let drawdown_pct = if peak > Decimal::ZERO {
            drawdown_abs / peak
        } else {
            Decimal::ZERO
        };

        if self.trading_enabled {
            let usd_breach =
                config.max_drawdown_usd > Decimal::ZERO && drawdown_abs > config.max_drawdown_usd;
            let pct_breach =
                config.max_drawdown_pct > Decimal::ZERO && drawdown_pct > config.max_drawdown_pct;
            if usd_breach || pct_breach {
                self.trading_enabled = false;
                self.disabled_since = Some(now);
                warn!(
                    drawdown = %drawdown_abs,
                    drawdown_pct = %(drawdown_pct * Decimal::ONE_HUNDRED),
                    "Drawdown exceeded thresholds; disabling quoting"
                );
                return RiskEvent::Breached;
            }
            return RiskEvent::Unchanged;
        }

        match self.disabled_since {
            None => {
                self.disabled_since = Some(now);
                RiskEvent::Unchanged
            }
            Some(since) if config.risk_cooldown_ms > 0 => {
                let cooldown = Duration::from_millis(config.risk_cooldown_ms);
                let recovery_floor = peak
                    * (Decimal::ONE - Decimal::new(5, 1) * config.max_drawdown_pct);
                if now.duration_since(since) >= cooldown && nav >= recovery_floor {
                    self.trading_enabled = true;
                    self.disabled_since = None;
                    info!("Risk cooldown elapsed and NAV recovered; re-enabling quoting");
                    RiskEvent::Recovered
                } else {
                    RiskEvent::Unchanged
                }
            }
            Some(_) => RiskEvent::Unchanged,
        }
    }
}

/// Sliding-window throttle for taker escapes.
///
/// Rejects an escape fired within the cooldown of the previous one, or once
/// the rolling-minute count reaches the cap.
#[derive(Debug)]
pub struct EscapeThrottle {
    cooldown: Duration,
    max_per_min: u32,
    last_escape: Option<Instant>,
    window_start: Option<Instant>,
    count_in_window: u32,
}

impl EscapeThrottle {
    pub fn new(cooldown_ms: u64, max_per_min: u32) -> Self {
        Self {
            cooldown: Duration::from_millis(cooldown_ms),
            max_per_min,
            last_escape: None,
            window_start: None,
            count_in_window: 0,
        }
    }

    /// Try to take one escape slot. On success the slot is consumed.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_escape {
            let since = now.duration_since(last);
            if since < self.cooldown {
                info!(since_ms = since.as_millis() as u64, "Escape throttled by cooldown");
                return false;
            }
        }

        let window_expired = self
            .window_start
            .map(|start| now.duration_since(start) >= Duration::from_secs(60))
            .unwrap_or(true);
        if window_expired {
            self.window_start = Some(now);
            self.count_in_window = 0;
        }

        if self.max_per_min > 0 && self.count_in_window >= self.max_per_min {
            info!(count = self.count_in_window, "Escape limit reached for this minute");
            return false;
        }

        self.last_escape = Some(now);
        self.count_in_window += 1;
        true
    }
}
