//! # Plugin Parameters
//!
//! The knobs the DAW shows. Each one has:
//!
//! - A **unique string ID** (`#[id = "..."]`) the host uses to save and
//!   recall presets. These match
//!   [`ParameterId::as_str`](crate::dsp::parameters::ParameterId::as_str); never change them.
//! - A **range** matching the engine's documented domain, stepped in whole
//!   units (1 ms, 1 %, 1 dB).
//! - A **callback** that raises a shared dirty flag.
//!
//! ## No smoothing
//!
//! The engine takes whole snapshots and applies each one from a single
//! frame onward. Per-parameter smoothers would hand it values from several
//! half-finished ramps at once, so none are used. The audio thread sees
//! the dirty flag at the start of the next block, builds one
//! [`DelayParameters`] from the current values and installs it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nih_plug::prelude::*;

use crate::dsp::parameters::{
    DelayParameters, FEEDBACK_RANGE_PCT, LEVEL_RANGE_DB, NUM_TAPS, TAP_TIME_RANGE_MS,
};

#[derive(Params)]
pub struct PluginParams {
    /// **Tap 1-4 times**: how long after the dry signal each echo lands.
    #[id = "delayTimeID1"]
    pub tap1: FloatParam,
    #[id = "delayTimeID2"]
    pub tap2: FloatParam,
    #[id = "delayTimeID3"]
    pub tap3: FloatParam,
    #[id = "delayTimeID4"]
    pub tap4: FloatParam,

    /// **Feedback**: how much of the summed taps goes back into the delay.
    ///
    /// All four taps are summed before feedback, so even 30% with four
    /// taps recirculates a lot of signal. See `limit_feedback`.
    #[id = "delayFeedbackID"]
    pub feedback: FloatParam,

    /// **Wet level**: gain on the summed taps. Fully down is off.
    #[id = "wetLevelID"]
    pub wet_level: FloatParam,

    /// **Dry level**: gain on the direct signal. Fully down is off.
    #[id = "dryLevelID"]
    pub dry_level: FloatParam,

    /// **Feedback limiter**: soft-limits the recirculating signal so high
    /// feedback with stacked taps saturates instead of exploding.
    #[id = "limitFeedbackID"]
    pub limit_feedback: BoolParam,
}

impl Default for PluginParams {
    fn default() -> Self {
        Self::new(Arc::new(AtomicBool::new(false)))
    }
}

impl PluginParams {
    /// `changed` is set whenever any parameter changes, from any thread.
    pub fn new(changed: Arc<AtomicBool>) -> Self {
        let defaults = DelayParameters::default();

        // Every parameter gets its own clone of the flag. Callbacks run on
        // whatever thread the host changes values from, so all they do is
        // one atomic store; the audio thread does the real work.
        let mark_changed = || -> Arc<dyn Fn(f32) + Send + Sync> {
            let changed = changed.clone();
            Arc::new(move |_| changed.store(true, Ordering::Release))
        };

        Self {
            // Tap times: 0-2000 ms in 1 ms steps. 0 ms turns a tap off.
            tap1: tap_time_param("time 1", defaults.tap_ms[0])
                .with_callback(mark_changed()),
            tap2: tap_time_param("time 2", defaults.tap_ms[1])
                .with_callback(mark_changed()),
            tap3: tap_time_param("time 3", defaults.tap_ms[2])
                .with_callback(mark_changed()),
            tap4: tap_time_param("time 4", defaults.tap_ms[3])
                .with_callback(mark_changed()),

            feedback: FloatParam::new(
                "feedback",
                defaults.feedback_pct,
                FloatRange::Linear {
                    min: *FEEDBACK_RANGE_PCT.start(),
                    max: *FEEDBACK_RANGE_PCT.end(),
                },
            )
            .with_unit("%")
            .with_step_size(1.0)
            .with_callback(mark_changed()),

            // Levels: -60 to +12 dB. The bottom step is silence, not -60 dB.
            wet_level: level_param("wetLevel", defaults.wet_level_db)
                .with_callback(mark_changed()),
            dry_level: level_param("dryLevel", defaults.dry_level_db)
                .with_callback(mark_changed()),

            // `BoolParam` callbacks take a `bool`, so this one can't share
            // `mark_changed`.
            limit_feedback: BoolParam::new("Feedback Limiter", defaults.limit_feedback)
                .with_callback({
                    let changed = changed.clone();
                    Arc::new(move |_| changed.store(true, Ordering::Release))
                }),
        }
    }

    /// Bundle the current values into one engine snapshot.
    ///
    /// `.value()` is the unsmoothed current value. A change that lands
    /// while these are read raises the flag again, so the next block gets
    /// a fresh snapshot.
    pub fn snapshot(&self) -> DelayParameters {
        let tap_params: [&FloatParam; NUM_TAPS] =
            [&self.tap1, &self.tap2, &self.tap3, &self.tap4];

        DelayParameters {
            tap_ms: tap_params.map(|param| param.value()),
            feedback_pct: self.feedback.value(),
            wet_level_db: self.wet_level.value(),
            dry_level_db: self.dry_level.value(),
            limit_feedback: self.limit_feedback.value(),
        }
    }
}

fn tap_time_param(name: &str, default: f32) -> FloatParam {
    FloatParam::new(
        name,
        default,
        FloatRange::Linear {
            min: *TAP_TIME_RANGE_MS.start(),
            max: *TAP_TIME_RANGE_MS.end(),
        },
    )
    .with_unit(" ms")
    .with_step_size(1.0)
}

fn level_param(name: &str, default: f32) -> FloatParam {
    let floor = *LEVEL_RANGE_DB.start();

    FloatParam::new(
        name,
        default,
        FloatRange::Linear {
            min: floor,
            max: *LEVEL_RANGE_DB.end(),
        },
    )
    .with_unit(" dB")
    .with_step_size(1.0)
    // The bottom of the range is silence, so show it as such.
    .with_value_to_string(Arc::new(move |value| {
        if value <= floor {
            String::from("-inf")
        } else {
            format!("{value:.0}")
        }
    }))
}
