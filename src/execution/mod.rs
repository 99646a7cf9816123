// Position state machine, order routing and the polling loop
pub mod candle_buffer;
pub mod executor;
pub mod order_sink;
pub mod position_manager;
pub mod price_feed;
pub mod runner;
pub mod scheduler;

pub use candle_buffer::CandleBuffer;
pub use executor::{BotState, CycleError, CycleReport, Executor};
pub use order_sink::{OrderSink, PaperOrderSink};
pub use position_manager::{
    ExitReason, OrderIntent, Position, PositionManager, SignalEvent, Transition,
};
pub use price_feed::{CandleFeed, FeedSnapshot};
pub use runner::{RunSummary, Runner};
pub use scheduler::{IntervalScheduler, ManualScheduler, Scheduler};
