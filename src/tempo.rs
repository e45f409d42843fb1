//! Process-wide tempo in cycles per second.
//!
//! Schedulers capture the tempo at construction; anything already running
//! only picks a change up if the host pushes it (the live session does this
//! on reload).

use std::sync::atomic::{AtomicU64, Ordering};

pub const DEFAULT_CPS: f64 = 0.5;

// 0.5f64 in IEEE-754 bits; the atomic needs a const initializer.
static CPS_BITS: AtomicU64 = AtomicU64::new(0x3FE0_0000_0000_0000);

/// Current global tempo in cycles per second.
pub fn cps() -> f64 {
    f64::from_bits(CPS_BITS.load(Ordering::Relaxed))
}

/// Set the global tempo. Non-finite or non-positive values are ignored.
pub fn set_cps(value: f64) {
    if value.is_finite() && value > 0.0 {
        CPS_BITS.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Cycles per minute.
pub fn cpm() -> f64 {
    cps() * 60.0
}

/// Beats per minute at `beats_per_cycle` beats to the cycle.
pub fn bpm(beats_per_cycle: f64) -> f64 {
    cps() * 60.0 * beats_per_cycle
}

/// Set the tempo from beats per minute.
pub fn set_bpm(bpm: f64, beats_per_cycle: f64) {
    if beats_per_cycle > 0.0 {
        set_cps(bpm / (60.0 * beats_per_cycle));
    }
}
