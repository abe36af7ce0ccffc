//! Lookahead: a playback scheduling engine for pattern and playlist sequencing.
//!
//! A fixed-rate poll runs scheduling passes that place note triggers and
//! automation instructions a short time ahead of the transport, on a
//! sample-accurate event queue.

pub mod config;
pub mod content;
pub mod error;
pub mod event;
pub mod playback;
pub mod scheduler;
pub mod target;
pub mod transport;
