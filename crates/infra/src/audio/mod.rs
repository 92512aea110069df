//! Cross-thread handoff between the control and audio threads
//!
//! This module provides:
//! - A lock-free parameter mailbox drained once per block
//! - A lossy, bounded meter feed for visualization
//! - The block-level engine that ties them to the signal router

pub mod engine;
pub mod meter_feed;
pub mod parameter_mailbox;

pub use engine::*;
pub use meter_feed::*;
pub use parameter_mailbox::*;
