//! # Multi-Tap Delay Engine
//!
//! Owns one [`DelayBuffer`] per channel and turns one input frame into
//! one output frame. Per sample, per channel:
//!
//! 1. **Read** four taps from the buffer, each at its own distance behind
//!    the write head.
//! 2. **Sum** them into the raw wet signal. All taps weigh the same; the
//!    wet level is the only gain on the delayed path.
//! 3. **Write** `input + feedback * wet` into the buffer.
//! 4. **Advance** the write head.
//! 5. **Mix** `dry * input + wet_level * wet` into the output.
//!
//! ## Lifecycle
//!
//! ```text
//!                 create_delay_buffers          process_audio_frame
//! Uninitialized ───────────────────────► Ready ───────────────────► Processing
//!                                          ▲                            │
//!                                          └────────── reset ───────────┘
//! ```
//!
//! Allocation only happens in [`MultiTapDelay::create_delay_buffers`].
//! Everything else, including [`MultiTapDelay::reset`], is safe to call
//! on the audio thread.
//!
//! ## Parameter handoff
//!
//! Parameters arrive as whole [`DelayParameters`] snapshots, either
//! directly on the audio thread via
//! [`MultiTapDelay::set_multi_tap_parameters`] or from another thread
//! through a [`ParameterSender`]. The sender publishes into a triple
//! buffer; the engine checks for a fresh snapshot at the top of every
//! frame and derives all per-sample values from it before reading any
//! tap. A frame therefore uses exactly one snapshot, never a mix.
//!
//! The plugin doesn't use a sender: nih-plug runs parameter callbacks
//! without a channel to the engine, so `process()` watches a dirty flag
//! and installs snapshots itself. [`MultiTapDelay::with_sender`] is for
//! hosts that own a control thread, such as an editor or a scripting
//! layer, and is covered by this module's tests.

use std::num::NonZeroUsize;

use nih_plug::{nih_error, nih_log, nih_warn};
use thiserror::Error;
use triple_buffer::TripleBuffer;

use super::delay_buffer::DelayBuffer;
use super::limiter::soft_limit;
use super::parameters::{
    level_to_gain, ms_to_samples, DelayParameters, ParameterChange, MAX_DELAY_MS, NUM_TAPS,
};

/// The engine always runs stereo.
pub const NUM_CHANNELS: usize = 2;

/// Largest buffer `create_delay_buffers` will try to allocate per channel:
/// 2^28 samples, 1 GiB of `f32`, or about 23 minutes at 192 kHz.
pub const MAX_BUFFER_SAMPLES: usize = 1 << 28;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum EngineError {
    #[error("sample rate must be positive and finite, got {0} Hz")]
    InvalidSampleRate(f32),

    #[error("maximum delay must be positive, finite and at most 2^28 samples long, got {0} ms")]
    InvalidMaxDelay(f32),

    #[error("could not allocate delay buffers of {0} samples")]
    AllocationFailed(usize),

    #[error("delay buffers have not been created")]
    NotReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No delay buffers yet. Processing outputs silence and reports
    /// [`EngineError::NotReady`].
    Uninitialized,
    /// Buffers exist and are silent.
    Ready,
    /// At least one frame has been processed since the last reset.
    Processing,
}

/// Per-sample values derived from one parameter snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TapSettings {
    /// Tap delays in samples. 0 means the tap is silent.
    offsets: [usize; NUM_TAPS],
    feedback_gain: f32,
    wet_gain: f32,
    dry_gain: f32,
    limit_feedback: bool,
}

impl TapSettings {
    fn derive(params: &DelayParameters, sample_rate: f32, capacity: Option<usize>) -> Self {
        Self {
            offsets: params.tap_ms.map(|ms| {
                let offset = ms_to_samples(ms, sample_rate);
                capacity.map_or(offset, |capacity| offset.min(capacity))
            }),
            feedback_gain: params.feedback_pct / 100.0,
            wet_gain: level_to_gain(params.wet_level_db),
            dry_gain: level_to_gain(params.dry_level_db),
            limit_feedback: params.limit_feedback,
        }
    }
}

/// The producer half of the parameter handoff.
///
/// Lives on whichever thread receives parameter changes from the host.
/// Every call publishes a complete snapshot; the engine picks up the
/// latest one at its next frame.
pub struct ParameterSender {
    input: triple_buffer::Input<DelayParameters>,
    current: DelayParameters,
}

impl ParameterSender {
    /// Publish a whole new snapshot.
    pub fn set_multi_tap_parameters(&mut self, params: DelayParameters) {
        self.current = params.clamped();
        self.input.write(self.current);
    }

    /// Apply a single host parameter change on top of the last published
    /// snapshot and publish the result.
    pub fn apply(&mut self, change: ParameterChange) {
        self.current = self.current.with_change(change);
        self.input.write(self.current);
    }

    /// The last snapshot this sender published.
    pub fn parameters(&self) -> DelayParameters {
        self.current
    }
}

/// A stereo four-tap delay with shared feedback and wet/dry levels.
pub struct MultiTapDelay {
    state: EngineState,

    /// The rate tap times are converted at. Placeholder until the host
    /// tells us the real one.
    sample_rate: f32,

    /// One ring buffer per channel. Empty while uninitialized.
    buffers: Vec<DelayBuffer>,

    /// The snapshot currently in effect, already clamped.
    params: DelayParameters,
    taps: TapSettings,

    updates: triple_buffer::Output<DelayParameters>,
}

impl MultiTapDelay {
    /// Create an engine that only takes parameters on the audio thread.
    pub fn new(initial: DelayParameters) -> Self {
        Self::with_sender(initial).0
    }

    /// Create an engine together with a [`ParameterSender`] that can feed
    /// it snapshots from another thread.
    pub fn with_sender(initial: DelayParameters) -> (Self, ParameterSender) {
        let params = initial.clamped();
        let (input, output) = TripleBuffer::new(&params).split();
        let sample_rate = 44100.0;

        let engine = Self {
            state: EngineState::Uninitialized,
            sample_rate,
            buffers: Vec::new(),
            params,
            taps: TapSettings::derive(&params, sample_rate, None),
            updates: output,
        };
        let sender = ParameterSender {
            input,
            current: params,
        };

        (engine, sender)
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Samples held per channel, or `None` before buffers exist.
    pub fn capacity(&self) -> Option<usize> {
        self.buffers.first().map(DelayBuffer::capacity)
    }

    /// The snapshot currently in effect.
    pub fn parameters(&self) -> DelayParameters {
        self.params
    }

    /// Tap delays in samples as the next frame will read them.
    pub fn tap_offsets(&self) -> [usize; NUM_TAPS] {
        self.taps.offsets
    }

    /// Allocate `ceil(sample_rate * max_delay_ms / 1000)` samples of
    /// silence per channel.
    ///
    /// This allocates, so never call it while frames are being processed.
    /// Use at least [`MAX_DELAY_MS`] so every legal tap time fits. Sizes
    /// above [`MAX_BUFFER_SAMPLES`] are rejected with
    /// [`EngineError::InvalidMaxDelay`], and an allocator refusal is
    /// reported as [`EngineError::AllocationFailed`]. On error the engine
    /// is left exactly as it was.
    pub fn create_delay_buffers(
        &mut self,
        sample_rate: f32,
        max_delay_ms: f32,
    ) -> Result<(), EngineError> {
        validate_sample_rate(sample_rate)?;
        if !(max_delay_ms.is_finite() && max_delay_ms > 0.0) {
            nih_error!("Refusing to create delay buffers for {max_delay_ms} ms");
            return Err(EngineError::InvalidMaxDelay(max_delay_ms));
        }

        let samples = (f64::from(sample_rate) * f64::from(max_delay_ms) / 1000.0).ceil();
        if samples > MAX_BUFFER_SAMPLES as f64 {
            nih_error!(
                "Refusing to create delay buffers of {samples} samples, the limit is {MAX_BUFFER_SAMPLES}"
            );
            return Err(EngineError::InvalidMaxDelay(max_delay_ms));
        }
        let capacity = NonZeroUsize::new(samples as usize)
            .ok_or(EngineError::InvalidMaxDelay(max_delay_ms))?;

        if max_delay_ms < MAX_DELAY_MS {
            nih_warn!(
                "Delay buffers hold {max_delay_ms} ms, taps longer than that will be clamped"
            );
        }

        // Build the new buffers completely before dropping the old ones, so
        // a failed allocation leaves the engine untouched.
        let buffers = (0..NUM_CHANNELS)
            .map(|_| DelayBuffer::new(capacity))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| {
                nih_error!("Could not allocate {} delay samples: {err}", capacity.get());
                EngineError::AllocationFailed(capacity.get())
            })?;

        self.buffers = buffers;
        self.sample_rate = sample_rate;
        self.refresh_taps();
        self.state = EngineState::Ready;

        nih_log!(
            "Allocated {NUM_CHANNELS} delay buffers of {} samples ({max_delay_ms} ms at {sample_rate} Hz)",
            capacity.get()
        );

        Ok(())
    }

    /// Clear the buffers to silence and adopt `sample_rate` for tap time
    /// conversion. Doesn't allocate.
    ///
    /// Before buffers exist this only records the sample rate. Tap offsets
    /// are recomputed either way; at a higher rate than the buffers were
    /// created for, long taps clamp to the buffer's capacity.
    pub fn reset(&mut self, sample_rate: f32) -> Result<(), EngineError> {
        validate_sample_rate(sample_rate)?;

        if sample_rate != self.sample_rate {
            nih_log!(
                "Delay sample rate changed from {} Hz to {sample_rate} Hz",
                self.sample_rate
            );
            if let Some(capacity) = self.capacity() {
                if ms_to_samples(MAX_DELAY_MS, sample_rate) > capacity {
                    nih_warn!(
                        "Delay buffers hold {capacity} samples, too few for {MAX_DELAY_MS} ms at {sample_rate} Hz; recreate them"
                    );
                }
            }
        }

        self.sample_rate = sample_rate;
        for buffer in &mut self.buffers {
            buffer.clear();
        }
        self.refresh_taps();

        if !self.buffers.is_empty() {
            self.state = EngineState::Ready;
        }

        Ok(())
    }

    /// Install a new snapshot on the audio thread.
    ///
    /// Takes effect from the next frame. Anything still pending from a
    /// [`ParameterSender`] is older than this call and gets dropped.
    pub fn set_multi_tap_parameters(&mut self, params: DelayParameters) {
        self.updates.update();
        self.install(params);
    }

    /// Process one frame. Channel counts are the slice lengths.
    ///
    /// `min(inputs.len(), outputs.len(), 2)` channels are processed; any
    /// further output channels are set to silence and further inputs are
    /// ignored. Never allocates, blocks or panics.
    ///
    /// Before [`create_delay_buffers`](Self::create_delay_buffers), every
    /// output is silenced and [`EngineError::NotReady`] is returned.
    pub fn process_audio_frame(
        &mut self,
        inputs: &[f32],
        outputs: &mut [f32],
    ) -> Result<(), EngineError> {
        if self.state == EngineState::Uninitialized {
            outputs.fill(0.0);
            return Err(EngineError::NotReady);
        }

        if self.updates.updated() {
            let params = *self.updates.read();
            self.install(params);
        }
        self.state = EngineState::Processing;

        let taps = self.taps;
        let mut processed = 0;
        for ((buffer, &input), output) in self
            .buffers
            .iter_mut()
            .zip(inputs)
            .zip(outputs.iter_mut())
        {
            let input = finite_or_silence(input);

            let wet: f32 = taps.offsets.iter().map(|&offset| buffer.read(offset)).sum();

            // Unlimited feedback is only kept finite by the flush below.
            let mut feedback = taps.feedback_gain * wet;
            if taps.limit_feedback {
                feedback = soft_limit(feedback);
            }
            buffer.write(finite_or_silence(input + feedback));
            buffer.advance();

            *output = finite_or_silence(taps.dry_gain * input + taps.wet_gain * wet);
            processed += 1;
        }

        outputs[processed..].fill(0.0);

        Ok(())
    }

    /// How long the echoes ring after the input stops, or `None` if they
    /// never die out.
    ///
    /// Uses the worst case where every active tap lines up, so the loop
    /// gain is `feedback * active_taps`. The tail ends once that has
    /// decayed below -60 dB, measured in passes of the longest tap.
    pub fn tail_samples(&self) -> Option<u32> {
        let longest = self.taps.offsets.iter().copied().max().unwrap_or(0);
        let active_taps = self.taps.offsets.iter().filter(|&&o| o > 0).count();
        let loop_gain = self.taps.feedback_gain * active_taps as f32;

        if longest == 0 || loop_gain <= 0.001 {
            Some(longest as u32)
        } else if loop_gain >= 1.0 {
            None
        } else {
            // log10(0.001) = -3
            let repeats = -3.0 / loop_gain.log10();
            Some((repeats * longest as f32).ceil() as u32)
        }
    }

    fn install(&mut self, params: DelayParameters) {
        self.params = params.clamped();
        self.refresh_taps();
    }

    fn refresh_taps(&mut self) {
        self.taps = TapSettings::derive(&self.params, self.sample_rate, self.capacity());
    }
}

fn validate_sample_rate(sample_rate: f32) -> Result<(), EngineError> {
    if sample_rate.is_finite() && sample_rate > 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidSampleRate(sample_rate))
    }
}

#[inline]
fn finite_or_silence(sample: f32) -> f32 {
    if sample.is_finite() {
        sample
    } else {
        0.0
    }
}
