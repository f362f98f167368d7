#![doc = include_str!("../README.md")]
// When we return an error type, the possible errors are encoded within it.
#![allow(clippy::missing_errors_doc)]

mod channel;
mod interpolation;
mod register;
mod result;
mod ring_buffer;
mod sample;
mod synth;
pub mod tables;
pub mod timing;
mod track;

pub use {
    channel::{
        CHANNEL_COUNT, Channel, ChannelState, DUTY_CHANNELS, NOISE_CHANNELS, NoteParams,
        START_DELAY,
    },
    interpolation::{
        Interpolation, SINC_RESOLUTION, SINC_SAMPLES, SINC_WIDTH, SincTables,
        ensure_tables_initialized, interpolate,
    },
    register::{ControlWord, PendingRegister, RepeatMode, SampleFormat, SoundRegister},
    result::{ConfigError, ConfigResult, SourceError, SourceResult},
    ring_buffer::{HISTORY_LEN, RingBuffer},
    sample::SampleSource,
    synth::{Channels, MAX_SAMPLE_RATE, Sequencer, Synth, SynthConfig},
    tables::{
        AMPL_K, AMPL_MIN, AMPL_THRESHOLD, attack_rate, fall_rate, scale_to_cb, sust_to_cb,
        timer_adjust,
    },
    timing::{ARM7_CLOCK, SampleRate, Tick, TickClock},
    track::{ModType, Modulation, TRACK_COUNT, TrackId, TrackParams, TrackUpdateFlags},
};

#[cfg(target_endian = "big")]
const _: () = panic!("Only little endian architectures are supported currently.");
