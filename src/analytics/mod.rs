//! Click analytics: publisher, consumer, daily aggregation, click flusher

pub mod aggregate;
pub mod consumer;
pub mod flusher;
pub mod publisher;
pub mod recorder;

pub use consumer::{ClickConsumer, ConsumerConfig};
pub use flusher::ClickFlusher;
pub use publisher::AnalyticsPublisher;
pub use recorder::{ClickRecorder, ClickRequest};
