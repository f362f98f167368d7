//! Per-track state that sequence interpretation hands to the channels a track owns

use crate::tables::{AMPL_MIN, sust_to_cb};

/// Index of a track of the sequence player
pub type TrackId = u8;

/// Number of tracks a sequence can have
pub const TRACK_COUNT: usize = 16;

bitflags::bitflags! {
    /// What a track changed during the current tick
    #[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
    pub struct TrackUpdateFlags: u8 {
        /// A tick passed, count down note lengths
        const LENGTH = 0b0_0001;
        /// Volume or expression changed
        const VOLUME = 0b0_0010;
        /// Pan changed
        const PAN = 0b0_0100;
        /// Pitch bend or tuning changed
        const TIMER = 0b0_1000;
        /// Modulation parameters changed
        const MODULATION = 0b1_0000;
    }
}

/// What the modulation LFO acts on
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum ModType {
    /// Vibrato
    #[default]
    Pitch = 0,
    /// Tremolo
    Volume = 1,
    /// Auto-pan
    Pan = 2,
}

impl ModType {
    /// Modulation type for a sequence command argument
    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Pitch),
            1 => Some(Self::Volume),
            2 => Some(Self::Pan),
            _ => None,
        }
    }
}

/// LFO parameters of a track
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Modulation {
    /// What the LFO acts on
    pub kind: ModType,
    /// Phase advance per tick
    pub speed: u8,
    /// Depth, 0 turns modulation off
    pub depth: u8,
    /// Range multiplier
    pub range: u8,
    /// Ticks to wait after a note starts before modulating
    pub delay: u16,
}

impl Default for Modulation {
    fn default() -> Self {
        Self {
            kind: ModType::Pitch,
            speed: 16,
            depth: 0,
            range: 1,
            delay: 0,
        }
    }
}

/// The state of a sequence track that channels follow
#[derive(Clone, Debug)]
pub struct TrackParams {
    /// What changed this tick
    pub update_flags: TrackUpdateFlags,
    /// Player master volume, in centibels
    pub master_volume: i32,
    /// Volume of the whole sequence, in centibels (see [`scale_to_cb`](crate::scale_to_cb))
    pub sequence_volume: i32,
    /// Track volume (0-127)
    pub volume: u8,
    /// Track expression (0-127)
    pub expression: u8,
    /// Track pan (-64 is left, 63 right)
    pub pan: i8,
    /// Pitch bend (-128..=127 is a full bend range)
    pub pitch_bend: i8,
    /// Pitch bend range in semitones
    pub pitch_bend_range: u8,
    /// Whether notes glide from `porta_key`
    pub portamento: bool,
    /// Key the portamento starts from
    pub porta_key: u8,
    /// Portamento duration, 0 means the glide lasts the whole note
    pub porta_time: u8,
    /// Initial pitch offset of a sweep, in 1/64 semitones
    pub sweep_pitch: i16,
    /// LFO parameters
    pub modulation: Modulation,
}

impl Default for TrackParams {
    fn default() -> Self {
        Self {
            update_flags: TrackUpdateFlags::empty(),
            master_volume: 0,
            sequence_volume: 0,
            volume: 0x7F,
            expression: 0x7F,
            pan: 0,
            pitch_bend: 0,
            pitch_bend_range: 2,
            portamento: false,
            porta_key: 60,
            porta_time: 0,
            sweep_pitch: 0,
            modulation: Modulation {
                delay: 10,
                ..Modulation::default()
            },
        }
    }
}

impl TrackParams {
    /// Total attenuation of the track in centibels, never below [`AMPL_MIN`]
    #[must_use]
    pub fn volume_cb(&self) -> i32 {
        let total = self.master_volume
            + self.sequence_volume
            + sust_to_cb(self.volume)
            + sust_to_cb(self.expression);
        total.max(AMPL_MIN)
    }
    /// Pitch offset in 1/64 semitones for a note at `key` of a sample recorded at `org_key`
    #[must_use]
    pub fn tune(&self, key: u8, org_key: u8) -> i32 {
        let transpose = (i32::from(key) - i32::from(org_key)) * 64;
        transpose + ((i32::from(self.pitch_bend) * i32::from(self.pitch_bend_range)) >> 1)
    }
}
