//! Kismet Bridge - A Rust library and CLI for turning kismet drone
//! telemetry into batched domain events.
//!
//! This crate provides:
//! - A nom-based parser for the kismet sentence protocol
//! - A per-connection aggregator batching measurements at cycle boundaries
//! - An async connection worker with external release
//! - An adapter managing listener activations and their connections
//!
//! # Example
//!
//! ```rust
//! use kismet_bridge::{aggregator::Aggregator, sentence::parse_sentence};
//!
//! let mut aggregator = Aggregator::new();
//!
//! let line = "*SOURCE: drone drone alpha 6 7c1e5200-0000-0000-0000-000000000001";
//! let sentence = parse_sentence(line).expect("Failed to parse sentence");
//! assert!(aggregator.apply(sentence).is_none());
//!
//! let message = aggregator
//!     .apply(parse_sentence("*TIME: 1001").unwrap())
//!     .expect("Cycle boundary produces a message");
//! assert_eq!(message.drone_names.len(), 1);
//! ```

pub mod adapter;
pub mod aggregator;
pub mod config;
pub mod connection;
pub mod delivery;
pub mod message;
pub mod metrics;
pub mod sentence;
pub mod stats;

pub use adapter::{ActivationError, DroneAdapter};
pub use aggregator::Aggregator;
pub use config::{ActivationConfig, DEFAULT_PORT, DEFAULT_SERVER_NAME};
pub use connection::{ConnectionError, ReleaseHandle, ServerConnection};
pub use delivery::{ListenerFactory, MessageListener, deliver};
pub use message::{MeasuredValue, Message};
pub use sentence::{ParseError, Sentence, parse_sentence};
pub use stats::{ConnectionStats, StatsSummary};
