//! Time subsystem.
//!
//! The context owns one default `Clock` plus any number of auxiliary clocks;
//! `GpuContext::draw_frame` measures wall time, clamps it, and ticks them all.

mod clock;

pub use clock::{Clock, ClockTick, FrameTimer};
