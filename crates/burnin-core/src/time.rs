//! Frame rate and output frame timing.
//!
//! Rates are kept as rationals so NTSC-style rates (30000/1001) stay exact;
//! the pipeline itself steps in integer milliseconds, matching the
//! timestamps carried by container samples.

use num_rational::Rational64;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A video frame rate as an exact rational (frames per second).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRate {
    pub numerator: i64,
    pub denominator: i64,
}

impl FrameRate {
    pub const FPS_24: Self = Self::new(24, 1);
    pub const FPS_30: Self = Self::new(30, 1);
    pub const FPS_60: Self = Self::new(60, 1);

    pub const fn new(numerator: i64, denominator: i64) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Integer frames per second, rounded to nearest.
    pub fn fps_hz(&self) -> u32 {
        let r = Rational64::new(self.numerator, self.denominator);
        ((*r.numer() as f64 / *r.denom() as f64).round()) as u32
    }

    /// Duration of one frame in milliseconds (floor, minimum 1).
    pub fn frame_interval_ms(&self) -> i64 {
        let interval = Rational64::new(1000 * self.denominator, self.numerator);
        (*interval.numer() / *interval.denom()).max(1)
    }

    /// Duration of one frame in microseconds.
    pub fn frame_interval_us(&self) -> i64 {
        let interval = Rational64::new(1_000_000 * self.denominator, self.numerator);
        *interval.numer() / *interval.denom()
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator == 1 {
            write!(f, "{} fps", self.numerator)
        } else {
            write!(f, "{}/{} fps", self.numerator, self.denominator)
        }
    }
}

/// Output position accounting for the draw loop.
///
/// Owned by the pipeline coordinator; stepped exactly once per draw
/// iteration. The position never moves backward, which is what lets the
/// decoder consume its track strictly forward.
#[derive(Debug, Clone)]
pub struct FrameTiming {
    rate: FrameRate,
    interval_ms: i64,
    position_ms: i64,
}

impl FrameTiming {
    pub fn new(rate: FrameRate) -> Self {
        Self {
            rate,
            interval_ms: rate.frame_interval_ms(),
            position_ms: 0,
        }
    }

    pub fn rate(&self) -> FrameRate {
        self.rate
    }

    pub fn interval_ms(&self) -> i64 {
        self.interval_ms
    }

    /// The next output timestamp to request, in milliseconds.
    pub fn position_ms(&self) -> i64 {
        self.position_ms
    }

    /// Return the current position and advance by one frame interval.
    pub fn step(&mut self) -> i64 {
        let current = self.position_ms;
        self.position_ms += self.interval_ms;
        current
    }
}
