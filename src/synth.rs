//! The 16 channel mixer, and the tick loop that drives it

use crate::{
    channel::{CHANNEL_COUNT, Channel, ChannelState},
    interpolation::{Interpolation, ensure_tables_initialized},
    result::{ConfigError, ConfigResult},
    tables::vol_div_shift,
    timing::{SampleRate, Tick, TickClock},
    track::{TrackId, TrackParams},
};

/// All the channels of the sound hardware, indexed by channel number
pub type Channels = [Channel; CHANNEL_COUNT];

/// Highest supported output sample rate
pub const MAX_SAMPLE_RATE: SampleRate = 384_000;

/// Sequence interpretation that triggers notes and feeds track state to the channels
pub trait Sequencer {
    /// Run one tick of the sequence.
    ///
    /// Notes are started with [`Channel::note_on`] and stopped with [`Channel::release`] here.
    fn tick(&mut self, channels: &mut Channels);
    /// State of track `id`, if it exists
    fn track(&self, id: TrackId) -> Option<&TrackParams>;
    /// Called after every channel has seen this tick's track state
    fn end_tick(&mut self) {}
}

/// A sequencer that never plays anything. Notes triggered directly on the channels still play.
impl Sequencer for () {
    fn tick(&mut self, _channels: &mut Channels) {}
    fn track(&self, _id: TrackId) -> Option<&TrackParams> {
        None
    }
}

/// Output and playback settings of a [`Synth`]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SynthConfig {
    /// Output sample rate in Hz
    pub sample_rate: SampleRate,
    /// How channels resample their source data
    pub interpolation: Interpolation,
    /// Bit mask of muted channels (bit 0 is channel 0)
    pub mutes: u16,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            interpolation: Interpolation::default(),
            mutes: 0,
        }
    }
}

impl SynthConfig {
    /// Check that the configuration can be played
    pub const fn validate(&self) -> ConfigResult {
        if self.sample_rate == 0 || self.sample_rate > MAX_SAMPLE_RATE {
            return Err(ConfigError::SampleRate(self.sample_rate));
        }
        Ok(())
    }
}

/// Mixes the sound channels into stereo output and runs the sequencer at the hardware tick rate
pub struct Synth {
    channels: Channels,
    config: SynthConfig,
    clock: TickClock,
    /// Whether a tick has run yet
    started: bool,
}

impl Synth {
    /// Create a synth with 16 idle channels
    pub fn new(config: SynthConfig) -> ConfigResult<Self> {
        config.validate()?;
        ensure_tables_initialized();
        tracing::debug!(
            sample_rate = config.sample_rate,
            interpolation = %config.interpolation,
            mutes = config.mutes,
            "synth created"
        );
        #[expect(clippy::cast_possible_truncation, reason = "There are 16 channels")]
        let channels =
            std::array::from_fn(|id| Channel::new(id as u8, config.sample_rate, config.interpolation));
        Ok(Self {
            channels,
            config,
            clock: TickClock::new(config.sample_rate),
            started: false,
        })
    }
    /// Current configuration
    #[must_use]
    pub const fn config(&self) -> &SynthConfig {
        &self.config
    }
    /// All channels
    #[must_use]
    pub const fn channels(&self) -> &Channels {
        &self.channels
    }
    /// Mutable access to all channels, for triggering notes outside of a [`Sequencer`]
    pub const fn channels_mut(&mut self) -> &mut Channels {
        &mut self.channels
    }
    /// Number of ticks run by [`render`](Self::render)
    #[must_use]
    pub const fn ticks(&self) -> Tick {
        self.clock.ticks()
    }
    /// Select the interpolation of every channel
    pub fn set_interpolation(&mut self, interpolation: Interpolation) {
        tracing::debug!(%interpolation, "interpolation changed");
        self.config.interpolation = interpolation;
        for ch in &mut self.channels {
            ch.set_interpolation(interpolation);
        }
    }
    /// Mute or unmute a channel. Muted channels keep playing, but aren't mixed.
    pub fn set_muted(&mut self, id: u8, muted: bool) {
        if usize::from(id) >= CHANNEL_COUNT {
            tracing::warn!(id, "mute request for nonexistent channel");
            return;
        }
        if muted {
            self.config.mutes |= 1 << id;
        } else {
            self.config.mutes &= !(1 << id);
        }
    }
    /// Whether channel `id` is muted
    #[must_use]
    pub const fn is_muted(&self, id: u8) -> bool {
        id < 16 && self.config.mutes & (1 << id) != 0
    }
    /// Number of channels that are playing a note
    #[must_use]
    pub fn active_channels(&self) -> usize {
        self.channels.iter().filter(|ch| !ch.is_idle()).count()
    }
    /// Run one sequencer tick, then update every channel
    pub fn tick<S: Sequencer + ?Sized>(&mut self, seq: &mut S) {
        self.started = true;
        seq.tick(&mut self.channels);
        for ch in &mut self.channels {
            if let Some(track) = ch.track_id().and_then(|id| seq.track(id)) {
                ch.update_track(track);
            }
        }
        seq.end_tick();
        for ch in &mut self.channels {
            ch.update();
        }
    }
    /// Produce one stereo frame (left, right), advancing every playing channel by one sample
    pub fn mix_frame(&mut self) -> [i32; 2] {
        let mut left = 0;
        let mut right = 0;
        let mutes = self.config.mutes;
        for ch in &mut self.channels {
            if ch.state() == ChannelState::None {
                continue;
            }
            let mut sample = ch.generate_sample();
            ch.increment_sample();
            if mutes & (1 << ch.id()) != 0 {
                continue;
            }
            let reg = ch.register();
            sample = muldiv7(sample, reg.volume_mul) >> vol_div_shift(reg.volume_div);
            left += muldiv7(sample, 127 - reg.panning);
            right += muldiv7(sample, reg.panning);
        }
        [left, right]
    }
    /// Fill `out` with interleaved stereo frames, running sequencer ticks as time passes.
    ///
    /// If no tick has run yet, one runs before the first frame, so notes triggered before
    /// rendering start right away. A trailing odd sample is left untouched.
    pub fn render<S: Sequencer + ?Sized>(&mut self, seq: &mut S, out: &mut [i32]) {
        if !self.started {
            self.tick(seq);
        }
        for frame in out.as_chunks_mut::<2>().0 {
            let due = self.clock.advance();
            *frame = self.mix_frame();
            if due {
                self.tick(seq);
            }
        }
    }
}

/// `val * mul / 128`, with a multiplier of 127 passing the value through unchanged
const fn muldiv7(val: i32, mul: u8) -> i32 {
    if mul == 127 {
        val
    } else {
        (val * mul as i32) >> 7
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            channel::NoteParams,
            register::{PendingRegister, RepeatMode, SampleFormat},
            sample::SampleSource,
            track::TrackUpdateFlags,
        },
    };

    const UNIT_RATE: SampleRate = 53_881;
    const UNIT_TIMER: u16 = 311;

    fn synth() -> Synth {
        Synth::new(SynthConfig {
            sample_rate: UNIT_RATE,
            interpolation: Interpolation::None,
            mutes: 0,
        })
        .unwrap()
    }

    fn dc_pending(level: i16) -> PendingRegister {
        let source = SampleSource::new(vec![level; 8], 0, 8).unwrap();
        PendingRegister::pcm(source, SampleFormat::Pcm16, RepeatMode::Loop, UNIT_TIMER)
    }

    /// Plays one note on channel 0 at the first tick, owned by track 0
    struct OneNote {
        track: TrackParams,
        note: NoteParams,
        played: bool,
    }

    impl OneNote {
        fn new(note_length: i32) -> Self {
            Self {
                track: TrackParams::default(),
                note: NoteParams {
                    note_length,
                    ..NoteParams::default()
                },
                played: false,
            }
        }
    }

    impl Sequencer for OneNote {
        fn tick(&mut self, channels: &mut Channels) {
            self.track.update_flags = TrackUpdateFlags::LENGTH;
            if !self.played {
                self.played = true;
                channels[0].note_on(dc_pending(1000), 0, 64, self.note, &self.track);
            }
        }
        fn track(&self, id: TrackId) -> Option<&TrackParams> {
            (id == 0).then_some(&self.track)
        }
        fn end_tick(&mut self) {
            self.track.update_flags = TrackUpdateFlags::empty();
        }
    }

    #[test]
    fn config_validation() {
        assert!(SynthConfig::default().validate().is_ok());
        let bad = SynthConfig {
            sample_rate: 0,
            ..SynthConfig::default()
        };
        assert_eq!(bad.validate(), Err(ConfigError::SampleRate(0)));
        assert!(Synth::new(bad).is_err());
        let too_fast = SynthConfig {
            sample_rate: MAX_SAMPLE_RATE + 1,
            ..SynthConfig::default()
        };
        assert!(too_fast.validate().is_err());
    }

    #[test]
    fn channel_ids() {
        let synth = synth();
        for (i, ch) in synth.channels().iter().enumerate() {
            assert_eq!(usize::from(ch.id()), i);
            assert!(ch.is_idle());
        }
        assert_eq!(synth.active_channels(), 0);
    }

    #[test]
    fn muldiv7_passes_full_scale() {
        assert_eq!(muldiv7(-32767, 127), -32767);
        assert_eq!(muldiv7(1000, 64), 500);
        assert_eq!(muldiv7(1000, 0), 0);
    }

    #[test]
    fn centred_full_volume_mix() {
        let mut synth = synth();
        synth.channels_mut()[0].trigger_start(dc_pending(1000), None, 64, NoteParams::default());
        synth.tick(&mut ());
        let frames: Vec<[i32; 2]> = (0..6).map(|_| synth.mix_frame()).collect();
        // Pre-roll
        assert_eq!(frames[..3], [[0, 0]; 3]);
        // Volume 127 passes through, pan 64 splits 63/64
        assert_eq!(frames[3], [(1000 * 63) >> 7, (1000 * 64) >> 7]);
        assert_eq!(frames[5], frames[3]);
    }

    #[test]
    fn mute_mask_silences_but_advances() {
        let mut synth = synth();
        synth.set_muted(0, true);
        assert!(synth.is_muted(0));
        assert!(!synth.is_muted(1));
        synth.set_muted(16, true);
        assert_eq!(synth.config().mutes, 1);
        let one_shot = SampleSource::new(vec![500i16; 4], 0, 4).unwrap();
        let pending =
            PendingRegister::pcm(one_shot, SampleFormat::Pcm16, RepeatMode::OneShot, UNIT_TIMER);
        synth.channels_mut()[0].trigger_start(pending, None, 64, NoteParams::default());
        synth.tick(&mut ());
        for _ in 0..7 {
            assert_eq!(synth.mix_frame(), [0, 0]);
        }
        // The muted channel still ran to the end of its sample
        assert_eq!(synth.active_channels(), 0);
        synth.set_muted(0, false);
        assert_eq!(synth.config().mutes, 0);
    }

    #[test]
    fn render_runs_ticks_and_note_length() {
        let mut synth = synth();
        let mut seq = OneNote::new(4);
        let mut out = vec![0; 2 * 2000];
        synth.render(&mut seq, &mut out);
        assert!(synth.ticks() >= 6);
        // The note starts at the tick before the first frame, after the pre-roll
        assert_eq!(out[..6], [0; 6]);
        assert_eq!(out[6..8], [(1000 * 63) >> 7, (1000 * 64) >> 7]);
        // The note released after 4 ticks and faded out
        assert_eq!(synth.active_channels(), 0);
        assert!(out[out.len() - 200..].iter().all(|&s| s == 0));
    }

    #[test]
    fn render_ticks_once_before_the_first_frame() {
        let mut auto = synth();
        auto.channels_mut()[0].trigger_start(dc_pending(1000), None, 64, NoteParams::default());
        let mut out = [0; 8];
        auto.render(&mut (), &mut out);
        assert_eq!(auto.channels()[0].state(), ChannelState::Decay);
        assert_eq!(out[6..], [(1000 * 63) >> 7, (1000 * 64) >> 7]);
        // A manual tick before rendering takes the place of the automatic one
        let mut manual = synth();
        manual.channels_mut()[0].trigger_start(dc_pending(1000), None, 64, NoteParams::default());
        manual.tick(&mut ());
        let mut out_manual = [0; 8];
        manual.render(&mut (), &mut out_manual);
        assert_eq!(out, out_manual);
    }

    #[test]
    fn render_ignores_trailing_odd_sample() {
        let mut synth = synth();
        let mut out = [7; 5];
        synth.render(&mut (), &mut out);
        assert_eq!(out, [0, 0, 0, 0, 7]);
    }

    #[test]
    fn interpolation_switch_reaches_channels() {
        let mut synth = synth();
        synth.set_interpolation(Interpolation::Sinc);
        assert_eq!(synth.config().interpolation, Interpolation::Sinc);
    }
}
