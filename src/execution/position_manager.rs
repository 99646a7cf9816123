use serde::{Deserialize, Serialize};

use crate::error::{LevelKind, TrapError};
use crate::models::{OrderRequest, OrderSide, Side, Signal};
use crate::risk::RiskSizer;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    FirstTarget,
    SecondTarget,
    StopLoss,
    Reversal, // Opposite-side signal while open
}

/// The single tracked position
///
/// A flat position is fully zeroed: no side, zero size and zero prices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: Option<Side>,
    pub size: f64,                 // Remaining size, halved after the first target
    pub entry_price: f64,
    pub stop_loss: f64,
    pub target_price: f64,         // First target, 1:1 against the stop
    pub second_target: f64,        // Last swing level
    pub partial_booked: bool,
}

impl Position {
    pub fn flat() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.side.is_some()
    }

    /// Mark-to-market P&L of the remaining size
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        match self.side {
            Some(Side::Buy) => (price - self.entry_price) * self.size,
            Some(Side::Sell) => (self.entry_price - price) * self.size,
            None => 0.0,
        }
    }
}

/// Order the position manager wants placed
#[derive(Debug, Clone, PartialEq)]
pub enum OrderIntent {
    Open { side: Side, size: f64 },
    Close { size: f64, reason: ExitReason },
}

impl OrderIntent {
    pub fn size(&self) -> f64 {
        match self {
            OrderIntent::Open { size, .. } | OrderIntent::Close { size, .. } => *size,
        }
    }

    pub fn order_side(&self) -> OrderSide {
        match self {
            OrderIntent::Open { side, .. } => (*side).into(),
            OrderIntent::Close { .. } => OrderSide::Close,
        }
    }

    pub fn to_request(&self, symbol: &str) -> OrderRequest {
        OrderRequest::market(symbol, self.order_side(), self.size())
    }
}

/// One step of the state machine: the order to place and the position it leads to
///
/// `next` only becomes the current position once the order is acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub intent: OrderIntent,
    pub next: Position,
}

/// A classified bar handed to the position manager
#[derive(Debug, Clone, Copy)]
pub struct SignalEvent {
    pub bar: usize,
    pub signal: Signal,
    pub close: f64,
    /// Opposing level for the second target: resistance for sells, support for buys
    pub last_swing: Option<f64>,
}

/// Single-position state machine
///
/// Holds no position itself. Callers pass the current position in and receive the
/// transitions to apply, so state changes stay with whoever confirms the orders.
#[derive(Debug, Clone)]
pub struct PositionManager {
    sizer: RiskSizer,
    enforce_stop_loss: bool,
}

impl Default for PositionManager {
    fn default() -> Self {
        Self::new(RiskSizer::default(), true)
    }
}

impl PositionManager {
    pub fn new(sizer: RiskSizer, enforce_stop_loss: bool) -> Self {
        Self {
            sizer,
            enforce_stop_loss,
        }
    }

    pub fn sizer(&self) -> &RiskSizer {
        &self.sizer
    }

    /// Transitions triggered by a classified bar
    ///
    /// Empty for `Signal::None` and for a signal on the side already held. An opposite
    /// signal yields a full close followed by the new open.
    ///
    /// # Errors
    /// `InvalidRiskInput` or `MalformedLevel` when the new position cannot be built; the
    /// signal is rejected as a whole and an existing position is left alone.
    pub fn on_signal(
        &self,
        position: &Position,
        event: SignalEvent,
        balance: f64,
    ) -> Result<Vec<Transition>> {
        let Some(side) = event.signal.side() else {
            return Ok(Vec::new());
        };

        if position.side == Some(side) {
            tracing::debug!(
                bar = event.bar,
                signal = %event.signal,
                "Already holding {} position, ignoring signal",
                side
            );
            return Ok(Vec::new());
        }

        let opened = self.open(side, event, balance)?;

        let mut plan = Vec::with_capacity(2);
        if position.is_open() {
            plan.push(Transition {
                intent: OrderIntent::Close {
                    size: position.size,
                    reason: ExitReason::Reversal,
                },
                next: Position::flat(),
            });
        }
        plan.push(Transition {
            intent: OrderIntent::Open {
                side,
                size: opened.size,
            },
            next: opened,
        });

        Ok(plan)
    }

    /// Build the position a signal would open
    fn open(&self, side: Side, event: SignalEvent, balance: f64) -> Result<Position> {
        let second_target = event.last_swing.ok_or(TrapError::MalformedLevel {
            level: match side {
                Side::Sell => LevelKind::Resistance,
                Side::Buy => LevelKind::Support,
            },
            bar: event.bar,
        })?;

        let entry_price = event.close;
        let stop_loss = self.sizer.stop_for(side, entry_price);
        let size = self.sizer.size(balance, entry_price, stop_loss)?;

        let target_price = match side {
            Side::Buy => entry_price + (entry_price - stop_loss),
            Side::Sell => entry_price - (stop_loss - entry_price),
        };

        Ok(Position {
            side: Some(side),
            size,
            entry_price,
            stop_loss,
            target_price,
            second_target,
            partial_booked: false,
        })
    }

    /// Transition triggered by a price update, if any
    ///
    /// Checks the first target, then the second target once half is booked, then the
    /// stop-loss.
    pub fn on_price(&self, position: &Position, price: f64) -> Option<Transition> {
        let side = position.side?;

        if !position.partial_booked && reached(side, price, position.target_price) {
            let half = position.size / 2.0;
            return Some(Transition {
                intent: OrderIntent::Close {
                    size: half,
                    reason: ExitReason::FirstTarget,
                },
                next: Position {
                    size: position.size - half,
                    partial_booked: true,
                    ..position.clone()
                },
            });
        }

        if position.partial_booked && reached(side, price, position.second_target) {
            return Some(Transition {
                intent: OrderIntent::Close {
                    size: position.size,
                    reason: ExitReason::SecondTarget,
                },
                next: Position::flat(),
            });
        }

        if self.enforce_stop_loss && reached(side.opposite(), price, position.stop_loss) {
            return Some(Transition {
                intent: OrderIntent::Close {
                    size: position.size,
                    reason: ExitReason::StopLoss,
                },
                next: Position::flat(),
            });
        }

        None
    }
}

/// Price has reached `level` in the direction that favors `side`
fn reached(side: Side, price: f64, level: f64) -> bool {
    match side {
        Side::Buy => price >= level,
        Side::Sell => price <= level,
    }
}
