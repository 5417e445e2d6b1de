//! Aggregate execution: per-group accumulators, the transition/combine/final
//! dispatcher, ordered-set buffering, moving windows, grouped and parallel
//! drivers.

pub mod accumulator;
pub mod dispatch;
pub mod grouped;
pub mod ordered_set;
pub mod parallel;
pub mod window;

pub use accumulator::{AccumulatorStore, GroupAccumulator};
pub use dispatch::{apply_input, combine, deserialize, finalize, serialize};
pub use grouped::{GroupedAggregate, ResultSink};
pub use ordered_set::OrderedSetBuffer;
pub use parallel::{ParallelAggregate, PartitionMode, StateBoundary};
pub use window::{sliding_window, FrameSpec, MovingAggregate, MovingPhase, WindowEvaluator, WindowStats};
