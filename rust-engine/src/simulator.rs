//! Session simulator
//!
//! Walks the derived series bar by bar holding at most one position. Each
//! bar is checked in a fixed order: forced exit, stop-loss, trailing stop,
//! opposite-signal exit, then entry. The first exit that fires ends the bar,
//! except that a signal exit may reverse into the new side when
//! `reverse_on_signal_exit` is set. Capital is floored at zero and an
//! exhausted account opens no further positions.

use tracing::{debug, warn};

use crate::config::StrategyConfig;
use crate::error::{BacktestError, Result};
use crate::monthly::MonthlyTracker;
use crate::types::{DerivedBar, ExitReason, MonthlyReturn, Position, Side, Trade};

/// Everything the bar loop produces for one run
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOutcome {
    pub trades: Vec<Trade>,
    pub final_capital: f64,
    pub peak_capital: f64,
    pub monthly_returns: Vec<MonthlyReturn>,
    /// Number of positions opened, including one still open at the end
    pub entries: usize,
    /// Position left open when the data ran out. Not counted as a trade.
    pub open_position: Option<Position>,
    /// Bars inside trading hours that were evaluated
    pub bars_processed: usize,
}

/// Single-run state machine. Owns the live position and capital.
pub struct SessionSimulator<'a> {
    config: &'a StrategyConfig,
    capital: f64,
    peak_capital: f64,
    position: Option<Position>,
    trades: Vec<Trade>,
    entries: usize,
    monthly: MonthlyTracker,
}

impl<'a> SessionSimulator<'a> {
    pub fn new(config: &'a StrategyConfig) -> Self {
        Self {
            config,
            capital: config.initial_capital,
            peak_capital: config.initial_capital,
            position: None,
            trades: Vec::new(),
            entries: 0,
            monthly: MonthlyTracker::new(config.initial_capital),
        }
    }

    /// Runs over `bars`, skipping those outside `[market_open, market_close]`.
    pub fn run(mut self, bars: &[DerivedBar]) -> Result<SimulationOutcome> {
        let session = self.config.session;
        let mut previous: Option<&DerivedBar> = None;
        let mut bars_processed = 0usize;

        for (index, bar) in bars.iter().enumerate() {
            if !session.in_trading_hours(bar.timestamp.time()) {
                continue;
            }
            if let Some(prev) = previous {
                if bar.timestamp <= prev.timestamp {
                    return Err(BacktestError::NonMonotonic {
                        index,
                        previous: prev.timestamp,
                        current: bar.timestamp,
                    });
                }
            }
            self.step(index, bar)?;
            previous = Some(bar);
            bars_processed += 1;
        }

        if bars_processed == 0 {
            warn!("no bars inside trading hours");
        }
        if let Some(position) = &self.position {
            debug!(side = %position.side, entry_time = %position.entry_time, "position still open at end of data");
        }

        Ok(SimulationOutcome {
            monthly_returns: self.monthly.finish(self.capital),
            trades: self.trades,
            final_capital: self.capital,
            peak_capital: self.peak_capital,
            entries: self.entries,
            open_position: self.position,
            bars_processed,
        })
    }

    fn step(&mut self, index: usize, bar: &DerivedBar) -> Result<()> {
        self.monthly.observe(bar.timestamp, self.capital);

        let price = bar.close;
        if let Some(position) = self.position.as_mut() {
            position.water_mark = match position.side {
                Side::Long => position.water_mark.max(price),
                Side::Short => position.water_mark.min(price),
            };
        }

        if let Some(position) = self.position {
            match self.exit_reason(&position, bar) {
                Some(reason) => {
                    self.close(index, bar, position, reason)?;
                    let reverses = reason == ExitReason::Signal && self.config.reverse_on_signal_exit;
                    if !reverses {
                        return Ok(());
                    }
                }
                None => return Ok(()),
            }
        }

        self.try_enter(index, bar)
    }

    fn exit_reason(&self, position: &Position, bar: &DerivedBar) -> Option<ExitReason> {
        let price = bar.close;
        let risk = &self.config.risk;

        if bar.timestamp.time() >= self.config.session.force_exit {
            return Some(ExitReason::ForceExit);
        }

        if risk.use_stop_loss {
            let hit = match position.side {
                Side::Long => price <= position.entry_price * (1.0 - risk.stop_loss_pct / 100.0),
                Side::Short => price >= position.entry_price * (1.0 + risk.stop_loss_pct / 100.0),
            };
            if hit {
                return Some(ExitReason::StopLoss);
            }
        }

        if risk.use_trailing_stop {
            // only once the water-mark has moved past entry in the position's favour
            let hit = match position.side {
                Side::Long => {
                    price <= position.water_mark * (1.0 - risk.trailing_stop_pct / 100.0)
                        && position.water_mark > position.entry_price
                }
                Side::Short => {
                    price >= position.water_mark * (1.0 + risk.trailing_stop_pct / 100.0)
                        && position.water_mark < position.entry_price
                }
            };
            if hit {
                return Some(ExitReason::TrailingStop);
            }
        }

        if bar.signal.side() == Some(position.side.opposite()) {
            return Some(ExitReason::Signal);
        }

        None
    }

    fn close(&mut self, index: usize, bar: &DerivedBar, position: Position, reason: ExitReason) -> Result<()> {
        let exit_price = bar.close;
        let pnl = match position.side {
            Side::Long => (exit_price - position.entry_price) * self.capital / position.entry_price,
            Side::Short => (position.entry_price - exit_price) * self.capital / position.entry_price,
        };
        if !pnl.is_finite() {
            return Err(BacktestError::Computation {
                index,
                timestamp: bar.timestamp,
                message: format!("non-finite pnl closing {} at {exit_price}", position.side),
            });
        }
        // the account cannot lose more than it holds
        let pnl = pnl.max(-self.capital);

        let duration_minutes =
            (bar.timestamp - position.entry_time).num_seconds() as f64 / 60.0;
        let trade = Trade {
            entry_time: position.entry_time,
            exit_time: bar.timestamp,
            entry_price: position.entry_price,
            exit_price,
            side: position.side,
            pnl,
            duration_minutes,
            exit_reason: reason,
        };

        debug!(
            side = %trade.side,
            entry = trade.entry_price,
            exit = trade.exit_price,
            pnl = trade.pnl,
            reason = %trade.exit_reason,
            "closed position"
        );

        self.capital = (self.capital + pnl).max(0.0);
        self.peak_capital = self.peak_capital.max(self.capital);
        if self.capital <= 0.0 {
            warn!(time = %bar.timestamp, "capital exhausted, no further entries");
        }
        self.position = None;
        self.trades.push(trade);
        Ok(())
    }

    fn try_enter(&mut self, index: usize, bar: &DerivedBar) -> Result<()> {
        if self.capital <= 0.0 || !self.config.session.in_entry_window(bar.timestamp.time()) {
            return Ok(());
        }
        let side = match bar.signal.side() {
            Some(side) if self.config.trading_mode.allows(side) => side,
            _ => return Ok(()),
        };

        let price = bar.close;
        if !price.is_finite() || price <= 0.0 {
            return Err(BacktestError::Computation {
                index,
                timestamp: bar.timestamp,
                message: format!("cannot enter {side} at non-positive price {price}"),
            });
        }

        debug!(side = %side, price, time = %bar.timestamp, "opened position");
        self.position = Some(Position {
            side,
            entry_price: price,
            entry_time: bar.timestamp,
            water_mark: price,
        });
        self.entries += 1;
        Ok(())
    }
}

/// Convenience wrapper around [`SessionSimulator::run`]
pub fn simulate(config: &StrategyConfig, bars: &[DerivedBar]) -> Result<SimulationOutcome> {
    SessionSimulator::new(config).run(bars)
}
