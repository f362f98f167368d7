//! Sound channel registers

use crate::sample::SampleSource;

/// What happens when playback reaches the end of the sample
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum RepeatMode {
    /// Behaves like one-shot, the sequence driver stops the channel
    #[default]
    Manual = 0,
    /// Jump back to the loop start
    Loop = 1,
    /// Stop the channel
    OneShot = 2,
}

impl RepeatMode {
    const fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            1 => Self::Loop,
            2 => Self::OneShot,
            _ => Self::Manual,
        }
    }
}

/// Sample data format
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum SampleFormat {
    /// Signed 8 bit PCM
    #[default]
    Pcm8 = 0,
    /// Signed 16 bit PCM
    Pcm16 = 1,
    /// IMA-ADPCM
    Adpcm = 2,
    /// Square wave (channels 8-13) or noise (channels 14 and 15), no sample data
    Psg = 3,
}

impl SampleFormat {
    const fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => Self::Pcm8,
            1 => Self::Pcm16,
            2 => Self::Adpcm,
            _ => Self::Psg,
        }
    }
}

/// The `SOUNDxCNT` control word of a channel
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct ControlWord(pub u32);

impl ControlWord {
    const VOLUME: u32 = 0x7F;
    const DIVIDER_SHIFT: u32 = 8;
    const PAN_SHIFT: u32 = 16;
    const DUTY_SHIFT: u32 = 24;
    const REPEAT_SHIFT: u32 = 27;
    const FORMAT_SHIFT: u32 = 29;
    const ENABLE: u32 = 1 << 31;

    const fn with_field(self, shift: u32, mask: u32, value: u32) -> Self {
        Self((self.0 & !(mask << shift)) | ((value & mask) << shift))
    }
    const fn field(self, shift: u32, mask: u32) -> u32 {
        (self.0 >> shift) & mask
    }
    /// Set the volume multiplier (0-127)
    #[must_use]
    pub const fn with_volume(self, volume: u8) -> Self {
        self.with_field(0, Self::VOLUME, volume as u32)
    }
    /// Set the volume divider (0-3)
    #[must_use]
    pub const fn with_divider(self, div: u8) -> Self {
        self.with_field(Self::DIVIDER_SHIFT, 3, div as u32)
    }
    /// Set the panning (0 is left, 64 center, 127 right)
    #[must_use]
    pub const fn with_pan(self, pan: u8) -> Self {
        self.with_field(Self::PAN_SHIFT, 0x7F, pan as u32)
    }
    /// Set the square wave duty (0-7)
    #[must_use]
    pub const fn with_duty(self, duty: u8) -> Self {
        self.with_field(Self::DUTY_SHIFT, 7, duty as u32)
    }
    /// Set the repeat mode
    #[must_use]
    pub const fn with_repeat(self, mode: RepeatMode) -> Self {
        self.with_field(Self::REPEAT_SHIFT, 3, mode as u32)
    }
    /// Set the sample format
    #[must_use]
    pub const fn with_format(self, format: SampleFormat) -> Self {
        self.with_field(Self::FORMAT_SHIFT, 3, format as u32)
    }
    /// Set or clear the enable bit
    #[must_use]
    pub const fn with_enable(self, enable: bool) -> Self {
        self.with_field(31, 1, enable as u32)
    }
    /// Volume multiplier
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "Masked to 7 bits")]
    pub const fn volume(self) -> u8 {
        self.field(0, Self::VOLUME) as u8
    }
    /// Volume divider
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "Masked to 2 bits")]
    pub const fn divider(self) -> u8 {
        self.field(Self::DIVIDER_SHIFT, 3) as u8
    }
    /// Panning
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "Masked to 7 bits")]
    pub const fn pan(self) -> u8 {
        self.field(Self::PAN_SHIFT, 0x7F) as u8
    }
    /// Square wave duty
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "Masked to 3 bits")]
    pub const fn duty(self) -> u8 {
        self.field(Self::DUTY_SHIFT, 7) as u8
    }
    /// Repeat mode
    #[must_use]
    pub const fn repeat(self) -> RepeatMode {
        RepeatMode::from_bits(self.field(Self::REPEAT_SHIFT, 3))
    }
    /// Sample format
    #[must_use]
    pub const fn format(self) -> SampleFormat {
        SampleFormat::from_bits(self.field(Self::FORMAT_SHIFT, 3))
    }
    /// Whether the enable bit is set
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        self.0 & Self::ENABLE != 0
    }
}

/// Register values a note will be started with.
///
/// Copied into the live [`SoundRegister`] when the channel starts playing.
#[derive(Clone, Default, Debug)]
pub struct PendingRegister {
    /// Control word, also the base that volume and pan updates are written into
    pub control: ControlWord,
    /// Sample data, `None` for PSG notes
    pub source: Option<SampleSource>,
    /// Timer of the note at its original pitch
    pub timer: u16,
    /// First sample of the loop
    pub loop_start: u32,
    /// Number of samples in the loop
    pub length: u32,
}

impl PendingRegister {
    /// A note playing `source`, stored as `format`
    #[must_use]
    pub fn pcm(source: SampleSource, format: SampleFormat, repeat: RepeatMode, timer: u16) -> Self {
        Self {
            control: ControlWord::default()
                .with_format(format)
                .with_repeat(repeat)
                .with_enable(true),
            loop_start: source.loop_start(),
            length: source.loop_len(),
            source: Some(source),
            timer,
        }
    }
    /// A square wave (channels 8-13) or noise (channels 14 and 15) note
    #[must_use]
    pub fn psg(duty: u8, timer: u16) -> Self {
        Self {
            control: ControlWord::default()
                .with_format(SampleFormat::Psg)
                .with_duty(duty)
                .with_enable(true),
            source: None,
            timer,
            loop_start: 0,
            length: 0,
        }
    }
}

/// Live register state of a playing channel
#[derive(Clone, Debug)]
pub struct SoundRegister {
    /// Volume multiplier (0-127)
    pub volume_mul: u8,
    /// Volume divider (0-3, 3 divides by 16)
    pub volume_div: u8,
    /// Panning (0-127)
    pub panning: u8,
    /// Square wave duty (0-7)
    pub wave_duty: u8,
    /// Repeat mode
    pub repeat_mode: RepeatMode,
    /// Sample format
    pub format: SampleFormat,
    /// Whether the channel is running
    pub enable: bool,
    /// Sample data
    pub source: Option<SampleSource>,
    /// Timer, stored negated like the hardware counts it
    pub timer: u16,
    /// Noise generator state
    pub psg_x: u16,
    /// Last noise output
    pub psg_last: i16,
    /// Position the noise generator was last advanced to
    pub psg_last_count: u32,
    /// Read position in source samples. Negative while the start delay runs.
    pub sample_position: f64,
    /// Source samples advanced per output sample
    pub sample_increase: f64,
    /// First sample of the loop
    pub loop_start: u32,
    /// Number of samples in the loop
    pub length: u32,
    /// `loop_start + length`
    pub total_length: u32,
}

impl Default for SoundRegister {
    fn default() -> Self {
        Self {
            volume_mul: 0,
            volume_div: 0,
            panning: 0,
            wave_duty: 0,
            repeat_mode: RepeatMode::Manual,
            format: SampleFormat::Pcm8,
            enable: false,
            source: None,
            timer: 0,
            psg_x: 0,
            psg_last: 0,
            psg_last_count: 0,
            sample_position: 0.0,
            sample_increase: 0.0,
            loop_start: 0,
            length: 0,
            total_length: 0,
        }
    }
}

impl SoundRegister {
    /// Decode a control word into the register fields
    pub const fn set_control(&mut self, cw: ControlWord) {
        self.volume_mul = cw.volume();
        self.volume_div = cw.divider();
        self.panning = cw.pan();
        self.wave_duty = cw.duty();
        self.repeat_mode = cw.repeat();
        self.format = cw.format();
        self.enable = cw.is_enabled();
    }
    /// Encode the register fields back into a control word
    #[must_use]
    pub const fn control(&self) -> ControlWord {
        ControlWord(0)
            .with_volume(self.volume_mul)
            .with_divider(self.volume_div)
            .with_pan(self.panning)
            .with_duty(self.wave_duty)
            .with_repeat(self.repeat_mode)
            .with_format(self.format)
            .with_enable(self.enable)
    }
    /// Reset the control fields like writing a zero control word does
    pub const fn clear_control(&mut self) {
        self.set_control(ControlWord(0));
    }
    /// Latch the sample data and loop geometry of a pending register.
    ///
    /// The control word and timer are written by the channel's volume, pan and timer updates.
    pub fn latch(&mut self, pending: &PendingRegister) {
        self.source.clone_from(&pending.source);
        self.loop_start = pending.loop_start;
        self.length = pending.length;
        self.total_length = pending.loop_start.saturating_add(pending.length);
    }
    /// Whether playback wraps around at the end of the sample
    #[must_use]
    pub fn is_looping(&self) -> bool {
        self.repeat_mode == RepeatMode::Loop && self.length != 0
    }
    /// Source sample at `idx`, or silence when there is no sample data
    #[must_use]
    pub fn sample_at(&self, idx: u32) -> i16 {
        self.source.as_ref().map_or(0, |src| src.get(idx))
    }
}
