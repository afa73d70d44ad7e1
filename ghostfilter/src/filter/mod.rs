//! Classification and the concurrent pipeline built on top of it.
//!
//! ```text
//! input lines ──▶ producer ──▶ [candidate queue] ──▶ worker × N ──▶ [result queue] ──▶ collector ──▶ sink
//!                                                        │
//!                                                        └──▶ StatsAggregator
//! ```
//!
//! Both queues are bounded, so a slow sink eventually blocks the producer
//! instead of letting buffered input grow without limit.
pub mod classifier;
pub mod pipeline;

pub use classifier::{classify, Verdict};
pub use pipeline::{run, PipelineFailure, PipelineOptions, DEFAULT_QUEUE_CAPACITY};
