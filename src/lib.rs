//! # Multi-Tap Delay: An AU/VST3/CLAP Delay Plugin
//!
//! A four-tap stereo delay built with [nih-plug](https://github.com/robbert-vdh/nih-plug).
//! Each tap has its own delay time; all four share one feedback amount and
//! one pair of wet/dry levels.
//!
//! ## Signal Flow
//!
//! ```text
//! Input ──┬─────────────────────────────────────────────── × dry ───────┐
//!         │                                                             │
//!         │       ┌──────────────── FEEDBACK LOOP ─────────────────┐    │
//!         │       │                                                │    │
//!         └──►(+)─┴─► [Ring Buffer] ──┬── tap 1 ──┐                │    │
//!              ▲                      ├── tap 2 ──┤                │    │
//!              │                      ├── tap 3 ──┼──►(Σ)── wet ───┤    │
//!              │                      └── tap 4 ──┘                │    │
//!              │                                                   │    │
//!              └──── [Soft Limiter] ◄── × feedback ◄───────────────┘    │
//!                                                                       │
//!                                          wet ──── × wet level ──────►(+)──► Output
//! ```
//!
//! The host-facing side (parameters, buffers, layouts) lives here and in
//! `params.rs`. The per-sample work lives in [`dsp`] and knows nothing
//! about plugin hosts.

pub mod dsp;
mod params;

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dsp::engine::{EngineError, MultiTapDelay, NUM_CHANNELS};
use dsp::parameters::MAX_DELAY_MS;
use nih_plug::prelude::*;
use params::PluginParams;

/// The plugin: host parameters on one side, the delay engine on the other.
///
/// Parameters are shared with the host through an `Arc` and may change on
/// any thread. The engine is owned by the audio thread. The two meet only
/// through `params_changed`: parameter callbacks raise it, and `process()`
/// clears it and installs a fresh snapshot before touching any audio.
struct MultiTapDelayPlugin {
    params: Arc<PluginParams>,

    /// Raised by every parameter callback.
    params_changed: Arc<AtomicBool>,

    /// Placeholder until `initialize()` reports the real rate.
    sample_rate: f32,

    engine: MultiTapDelay,
}

impl Default for MultiTapDelayPlugin {
    fn default() -> Self {
        let params_changed = Arc::new(AtomicBool::new(false));
        let params = Arc::new(PluginParams::new(params_changed.clone()));
        let engine = MultiTapDelay::new(params.snapshot());

        Self {
            params,
            params_changed,
            sample_rate: 44100.0,
            engine,
        }
    }
}

impl MultiTapDelayPlugin {
    /// Size the delay buffers for `sample_rate` and load the current
    /// parameter values. Allocates; only call from `initialize()`.
    fn prepare(&mut self, sample_rate: f32) -> Result<(), EngineError> {
        // Same order a host uses: tell the engine the rate first, then
        // allocate. 2000 ms at 48 kHz is 96000 samples, about 375 KB
        // per channel.
        self.engine.reset(sample_rate)?;
        self.engine.create_delay_buffers(sample_rate, MAX_DELAY_MS)?;

        // Clear the flag *before* taking the snapshot. A knob moved in
        // between raises it again and process() picks the change up.
        self.params_changed.store(false, Ordering::Release);
        self.engine.set_multi_tap_parameters(self.params.snapshot());

        // Only remember the rate once everything above succeeded, so a
        // failed initialize() doesn't leave reset() using a rate the
        // buffers were never sized for.
        self.sample_rate = sample_rate;

        Ok(())
    }
}

impl Plugin for MultiTapDelayPlugin {
    const NAME: &'static str = "Multi-Tap Delay";
    const VENDOR: &'static str = "Loveless Audio";
    const URL: &'static str = "";
    const EMAIL: &'static str = "steve.loveless@gmail.com";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    // Stereo first; most DAW tracks are stereo. Mono runs the left
    // channel's delay buffer only.
    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
    ];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;

    // nih-plug splits the block wherever a parameter changes, so checking
    // the dirty flag once per `process()` call still lands each snapshot
    // on the right sample.
    const SAMPLE_ACCURATE_AUTOMATION: bool = true;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    /// Called before playback and whenever the sample rate or layout
    /// changes. The only place the delay buffers are (re)allocated.
    ///
    /// Returning `false` tells the host this configuration can't be used,
    /// e.g. a sample rate of 0 or buffers too large to allocate. The
    /// engine keeps its previous buffers in that case.
    fn initialize(
        &mut self,
        _audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        match self.prepare(buffer_config.sample_rate) {
            Ok(()) => true,
            Err(err) => {
                nih_error!("Could not set up the delay engine: {err}");
                false
            }
        }
    }

    /// Clear the delay buffers so stale echoes don't play on restart.
    fn reset(&mut self) {
        let result = self.engine.reset(self.sample_rate);
        nih_debug_assert!(result.is_ok());
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        _context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        // ─── Pick up parameter changes ───
        //
        // `swap` reads and clears the flag in one step, so a callback that
        // fires while we build the snapshot isn't lost: it raises the flag
        // again and the next block sees it. With sample-accurate
        // automation, nih-plug has already split the block at the change.
        if self.params_changed.swap(false, Ordering::AcqRel) {
            self.engine.set_multi_tap_parameters(self.params.snapshot());
        }

        // ─── Run the engine one frame at a time ───
        //
        // `iter_samples()` yields one time step across all channels. The
        // engine wants separate input and output slices, so each frame is
        // copied into fixed-size stack arrays. No `Vec`, so nothing here
        // allocates (`assert_process_allocs` would catch it in debug).
        for mut channel_samples in buffer.iter_samples() {
            let num_channels = channel_samples.len().min(NUM_CHANNELS);

            // 1. Gather this frame's input, one sample per channel.
            let mut inputs = [0.0; NUM_CHANNELS];
            for (input, sample) in inputs.iter_mut().zip(channel_samples.iter_mut()) {
                *input = *sample;
            }

            // 2. Read taps, feed back, mix. Only fails before initialize(),
            //    and then the outputs are already silence.
            let mut outputs = [0.0; NUM_CHANNELS];
            let result = self
                .engine
                .process_audio_frame(&inputs[..num_channels], &mut outputs[..num_channels]);
            nih_debug_assert!(result.is_ok(), "process() called before initialize()");

            // 3. Write the mixed frame back over the input, in place.
            for (sample, output) in channel_samples.iter_mut().zip(outputs) {
                *sample = output;
            }
        }

        // Keep the host calling process() after the input stops so the
        // echoes aren't cut off.
        match self.engine.tail_samples() {
            Some(tail) => ProcessStatus::Tail(tail),
            None => ProcessStatus::KeepAlive,
        }
    }
}

impl ClapPlugin for MultiTapDelayPlugin {
    const CLAP_ID: &'static str = "com.loveless-audio.multitap-delay";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("A four-tap stereo delay with shared feedback and wet/dry levels");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Stereo,
        ClapFeature::Mono,
        ClapFeature::Delay,
    ];
}

impl Vst3Plugin for MultiTapDelayPlugin {
    // `*b"..."` turns a 16-character ASCII literal into the `[u8; 16]`
    // class ID.
    const VST3_CLASS_ID: [u8; 16] = *b"LvlssMultiTapDly";

    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Fx, Vst3SubCategory::Delay];
}

nih_export_clap!(MultiTapDelayPlugin);
nih_export_vst3!(MultiTapDelayPlugin);

// AUv2 entry point for Logic Pro, wrapping the CLAP plugin.
clap_wrapper::export_auv2!();
