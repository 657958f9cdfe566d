//! StreamAssist client and response aggregation.
//!
//! [`StreamAssistClient`] speaks the HTTP/SSE protocol, [`StreamingAggregator`]
//! turns its chunks into partial outputs plus one final answer, and an
//! [`OutputConvention`] decides whether that answer is a tool call.

pub mod aggregator;
pub mod client;
pub mod convention;
pub mod session;

pub use aggregator::{AssistStream, StreamingAggregator, collect};
pub use client::StreamAssistClient;
pub use convention::{FencedJsonConvention, OutputConvention};
pub use session::StreamSession;
