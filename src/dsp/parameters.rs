//! # Delay Parameters
//!
//! The engine never reads host parameters directly. Instead, the host
//! glue bundles every tunable value into a [`DelayParameters`] snapshot
//! and hands the whole thing over. A snapshot is replaced as a unit and
//! never edited in place once the engine owns it, so the audio thread
//! can't see tap times from one update mixed with gains from another.
//!
//! ## Units
//!
//! The snapshot stores values the way a user thinks about them:
//!
//! - tap times in **milliseconds**
//! - feedback as a **percentage**
//! - wet and dry levels in **decibels**
//!
//! The engine converts them into what the per-sample loop needs
//! (samples and linear gain factors) once per update, not once per sample.

use std::ops::RangeInclusive;

use nih_plug::util;

/// Number of independently delayed read points.
pub const NUM_TAPS: usize = 4;

/// Longest delay any tap can ask for.
pub const MAX_DELAY_MS: f32 = 2000.0;

pub const TAP_TIME_RANGE_MS: RangeInclusive<f32> = 0.0..=MAX_DELAY_MS;
pub const FEEDBACK_RANGE_PCT: RangeInclusive<f32> = 0.0..=100.0;

/// Wet and dry level range. The bottom of the range means "off".
pub const LEVEL_RANGE_DB: RangeInclusive<f32> = -60.0..=12.0;

/// Identifies one host-facing parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterId {
    Tap1,
    Tap2,
    Tap3,
    Tap4,
    Feedback,
    WetLevel,
    DryLevel,
}

impl ParameterId {
    pub const ALL: [ParameterId; 7] = [
        ParameterId::Tap1,
        ParameterId::Tap2,
        ParameterId::Tap3,
        ParameterId::Tap4,
        ParameterId::Feedback,
        ParameterId::WetLevel,
        ParameterId::DryLevel,
    ];

    /// The stable string ID the host stores in presets and automation
    /// lanes. Never change these once published.
    pub const fn as_str(self) -> &'static str {
        match self {
            ParameterId::Tap1 => "delayTimeID1",
            ParameterId::Tap2 => "delayTimeID2",
            ParameterId::Tap3 => "delayTimeID3",
            ParameterId::Tap4 => "delayTimeID4",
            ParameterId::Feedback => "delayFeedbackID",
            ParameterId::WetLevel => "wetLevelID",
            ParameterId::DryLevel => "dryLevelID",
        }
    }

    pub fn range(self) -> RangeInclusive<f32> {
        match self {
            ParameterId::Tap1 | ParameterId::Tap2 | ParameterId::Tap3 | ParameterId::Tap4 => {
                TAP_TIME_RANGE_MS
            }
            ParameterId::Feedback => FEEDBACK_RANGE_PCT,
            ParameterId::WetLevel | ParameterId::DryLevel => LEVEL_RANGE_DB,
        }
    }
}

/// One parameter-change event from the host: a single named value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterChange {
    pub id: ParameterId,
    pub value: f32,
}

impl ParameterChange {
    pub const fn new(id: ParameterId, value: f32) -> Self {
        Self { id, value }
    }
}

/// A complete, immutable-per-update set of engine settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayParameters {
    /// Delay of each tap, in milliseconds.
    pub tap_ms: [f32; NUM_TAPS],
    /// Share of the summed tap output fed back into the buffers, 0-100.
    pub feedback_pct: f32,
    pub wet_level_db: f32,
    pub dry_level_db: f32,
    /// Soft-limit the recirculating signal so stacked taps at high
    /// feedback can't run away. See [`crate::dsp::limiter`].
    ///
    /// When off, nothing bounds the buffer contents. Stacked taps at high
    /// feedback grow until they overflow `f32` and get flushed to zero, so
    /// the output stays finite but can be arbitrarily loud.
    pub limit_feedback: bool,
}

impl Default for DelayParameters {
    fn default() -> Self {
        Self {
            tap_ms: [250.0, 350.0, 450.0, 550.0],
            feedback_pct: 30.0,
            wet_level_db: -3.0,
            dry_level_db: -3.0,
            limit_feedback: true,
        }
    }
}

impl DelayParameters {
    /// Returns a copy with every field forced into its documented range.
    ///
    /// The host glue already clamps, so for well-behaved input this is
    /// the identity. NaN resolves to the bottom of the range.
    pub fn clamped(self) -> Self {
        Self {
            tap_ms: self.tap_ms.map(|ms| clamp_finite(ms, &TAP_TIME_RANGE_MS)),
            feedback_pct: clamp_finite(self.feedback_pct, &FEEDBACK_RANGE_PCT),
            wet_level_db: clamp_finite(self.wet_level_db, &LEVEL_RANGE_DB),
            dry_level_db: clamp_finite(self.dry_level_db, &LEVEL_RANGE_DB),
            limit_feedback: self.limit_feedback,
        }
    }

    /// Returns this snapshot with one field replaced by `change`.
    pub fn with_change(mut self, change: ParameterChange) -> Self {
        let value = clamp_finite(change.value, &change.id.range());
        match change.id {
            ParameterId::Tap1 => self.tap_ms[0] = value,
            ParameterId::Tap2 => self.tap_ms[1] = value,
            ParameterId::Tap3 => self.tap_ms[2] = value,
            ParameterId::Tap4 => self.tap_ms[3] = value,
            ParameterId::Feedback => self.feedback_pct = value,
            ParameterId::WetLevel => self.wet_level_db = value,
            ParameterId::DryLevel => self.dry_level_db = value,
        }
        self
    }

    #[cfg(test)]
    pub(crate) fn get(&self, id: ParameterId) -> f32 {
        match id {
            ParameterId::Tap1 => self.tap_ms[0],
            ParameterId::Tap2 => self.tap_ms[1],
            ParameterId::Tap3 => self.tap_ms[2],
            ParameterId::Tap4 => self.tap_ms[3],
            ParameterId::Feedback => self.feedback_pct,
            ParameterId::WetLevel => self.wet_level_db,
            ParameterId::DryLevel => self.dry_level_db,
        }
    }
}

fn clamp_finite(value: f32, range: &RangeInclusive<f32>) -> f32 {
    if value.is_nan() {
        *range.start()
    } else {
        value.clamp(*range.start(), *range.end())
    }
}

/// Convert a delay time from milliseconds to a whole number of samples.
///
/// ```text
/// delay_samples = round(delay_ms * sample_rate / 1000)
/// ```
///
/// Taps read whole samples, so the result is rounded to the nearest one.
/// At 44.1 kHz, 10 ms is exactly 441 samples and 10.01 ms still is.
pub fn ms_to_samples(delay_ms: f32, sample_rate: f32) -> usize {
    let samples = (f64::from(delay_ms) * f64::from(sample_rate) / 1000.0).round();
    if samples.is_finite() && samples > 0.0 {
        samples as usize
    } else {
        0
    }
}

/// Convert a wet/dry level in decibels to a linear gain factor.
///
/// ```text
/// gain = 10^(dB / 20)
/// ```
///
/// The bottom of [`LEVEL_RANGE_DB`] is treated as minus infinity, so a
/// level pulled all the way down is truly silent rather than -60 dB.
pub fn level_to_gain(level_db: f32) -> f32 {
    if level_db.is_nan() || level_db <= *LEVEL_RANGE_DB.start() {
        0.0
    } else {
        util::db_to_gain(level_db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_in_range() {
        let params = DelayParameters::default();
        assert_eq!(params, params.clamped());
    }

    #[test]
    fn test_clamp_out_of_range() {
        let params = DelayParameters {
            tap_ms: [-5.0, 2500.0, f32::NAN, f32::INFINITY],
            feedback_pct: 150.0,
            wet_level_db: 40.0,
            dry_level_db: f32::NEG_INFINITY,
            limit_feedback: false,
        }
        .clamped();

        assert_eq!(params.tap_ms, [0.0, 2000.0, 0.0, 2000.0]);
        assert_eq!(params.feedback_pct, 100.0);
        assert_eq!(params.wet_level_db, 12.0);
        assert_eq!(params.dry_level_db, -60.0);
        assert!(!params.limit_feedback);
    }

    #[test]
    fn test_with_change_replaces_one_field() {
        let before = DelayParameters::default();
        let after = before.with_change(ParameterChange::new(ParameterId::Tap3, 1200.0));

        assert_eq!(after.tap_ms, [250.0, 350.0, 1200.0, 550.0]);
        assert_eq!(after.feedback_pct, before.feedback_pct);
        assert_eq!(after.wet_level_db, before.wet_level_db);
        assert_eq!(after.dry_level_db, before.dry_level_db);

        let clamped = before.with_change(ParameterChange::new(ParameterId::Feedback, 250.0));
        assert_eq!(clamped.feedback_pct, 100.0);
    }

    #[test]
    fn test_ms_to_samples_rounds_to_nearest() {
        assert_eq!(ms_to_samples(250.0, 48000.0), 12000);
        assert_eq!(ms_to_samples(2000.0, 44100.0), 88200);
        // 10.01 ms at 44.1 kHz = 441.441 samples
        assert_eq!(ms_to_samples(10.01, 44100.0), 441);
        // 0.02 ms at 44.1 kHz = 0.882 samples
        assert_eq!(ms_to_samples(0.02, 44100.0), 1);
        assert_eq!(ms_to_samples(0.0, 44100.0), 0);
        assert_eq!(ms_to_samples(-3.0, 44100.0), 0);
    }

    #[test]
    fn test_level_to_gain() {
        assert!((level_to_gain(0.0) - 1.0).abs() < 1e-6);
        assert!((level_to_gain(-6.0) - 0.501_187).abs() < 1e-5);
        assert!((level_to_gain(12.0) - 3.981_072).abs() < 1e-4);
        assert!((level_to_gain(-59.0) - 0.001_122).abs() < 1e-5);
        assert_eq!(level_to_gain(-60.0), 0.0);
        assert_eq!(level_to_gain(f32::NEG_INFINITY), 0.0);
    }
}
