//! # DSP Core
//!
//! Everything that runs per sample, with no knowledge of the plugin host:
//!
//! - **`parameters`**: the [`DelayParameters`](parameters::DelayParameters)
//!   snapshot plus the ms→samples and dB→gain conversions.
//! - **`delay_buffer`**: a ring buffer holding the last two seconds of one
//!   channel.
//! - **`limiter`**: a soft limiter that keeps the feedback loop bounded.
//! - **`engine`**: the multi-tap delay itself, tying the three together.

pub mod delay_buffer;
pub mod engine;
pub mod limiter;
pub mod parameters;
