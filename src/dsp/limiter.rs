//! # Feedback Soft Limiter
//!
//! All four taps are summed before feedback is applied, so the loop gain
//! isn't simply the feedback amount. Four coincident taps at 50% feedback
//! already recirculate at 2x per pass and grow without bound.
//!
//! The limiter sits on the feedback path only. Below the knee it passes
//! the signal through untouched, so normal echoes decay exactly as the
//! feedback setting says. Above the knee it bends smoothly toward a hard
//! ceiling:
//!
//! ```text
//!          |x| <= KNEE : y = x
//!          |x| >  KNEE : y = sign(x) * (KNEE + R * tanh((|x| - KNEE) / R))
//!                        where R = CEILING - KNEE
//! ```
//!
//! The slope is 1 on both sides of the knee, so there's no audible kink
//! where limiting starts.

/// Level up to which the feedback signal passes unchanged.
pub const KNEE: f32 = 1.0;

/// Level the limited signal approaches but never exceeds.
pub const CEILING: f32 = 2.0;

pub fn soft_limit(x: f32) -> f32 {
    let magnitude = x.abs();
    if magnitude <= KNEE {
        return x;
    }

    let range = CEILING - KNEE;
    let limited = KNEE + range * ((magnitude - KNEE) / range).tanh();
    limited.copysign(x)
}
