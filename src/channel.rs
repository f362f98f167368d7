//! A sound channel: envelope, modulation, pitch and sample playback of one hardware voice

use {
    crate::{
        interpolation::{Interpolation, SINC_WIDTH, interpolate},
        register::{PendingRegister, SampleFormat, SoundRegister},
        ring_buffer::RingBuffer,
        sample::SampleSource,
        tables::{
            AMPL_K, AMPL_THRESHOLD, WAVE_DUTY_TABLE, attack_rate, fall_rate, sine, sust_to_cb,
            timer_adjust, vol_div_shift, volume_magnitude,
        },
        timing::{ARM7_CLOCK, SampleRate},
        track::{ModType, Modulation, TrackId, TrackParams, TrackUpdateFlags},
    },
    std::ops::{ControlFlow, RangeInclusive},
};

/// Number of hardware sound channels
pub const CHANNEL_COUNT: usize = 16;
/// Channels that play square waves in PSG format
pub const DUTY_CHANNELS: RangeInclusive<u8> = 8..=13;
/// Channels that play noise in PSG format
pub const NOISE_CHANNELS: RangeInclusive<u8> = 14..=15;
/// Samples of silence the hardware plays after a channel is started
pub const START_DELAY: f64 = 3.0;

const NOISE_SEED: u16 = 0x7FFF;
/// Source samples the history runs ahead of the read position
const HISTORY_AHEAD: u32 = 9;
const _: () = assert!(HISTORY_AHEAD as usize == SINC_WIDTH + 1);
/// Modulation phase wraps at this value (one sine period is 128 steps of 256)
const MOD_PERIOD: u32 = 0x8000;

/// Life cycle of a note on a channel
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum ChannelState {
    /// Idle
    #[default]
    None,
    /// Triggered, starts playing at the next update
    Start,
    /// Amplitude rising
    Attack,
    /// Amplitude falling to the sustain level
    Decay,
    /// Amplitude held
    Sustain,
    /// Amplitude falling to silence
    Release,
}

bitflags::bitflags! {
    /// Register fields that need recomputing at the next update
    #[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
    struct ChannelFlags: u8 {
        const UPDATE_VOLUME = 0b001;
        const UPDATE_PAN = 0b010;
        const UPDATE_TIMER = 0b100;
    }
}

impl ChannelFlags {
    const fn for_mod_type(kind: ModType) -> Self {
        match kind {
            ModType::Pitch => Self::UPDATE_TIMER,
            ModType::Volume => Self::UPDATE_VOLUME,
            ModType::Pan => Self::UPDATE_PAN,
        }
    }
}

/// Envelope and note parameters a channel is started with
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct NoteParams {
    /// Attack coefficient (out of 256, 0 is instant)
    pub attack: u8,
    /// Amplitude decrement per tick during decay
    pub decay: u16,
    /// Sustain volume (0-127)
    pub sustain: u8,
    /// Amplitude decrement per tick during release
    pub release: u16,
    /// Key being played
    pub key: u8,
    /// Key the sample plays at its original pitch
    pub org_key: u8,
    /// Note velocity (0-127)
    pub velocity: u8,
    /// Pan of the note (-64 is left, 63 right)
    pub pan: i8,
    /// Ticks until the note is released, -1 holds it until [`Channel::release`]
    pub note_length: i32,
}

impl Default for NoteParams {
    fn default() -> Self {
        Self {
            attack: 0,
            decay: 0xFFFF,
            sustain: 0x7F,
            release: 0xFFFF,
            key: 60,
            org_key: 60,
            velocity: 0x7F,
            pan: 0,
            note_length: -1,
        }
    }
}

impl NoteParams {
    /// Note parameters from instrument style envelope rates (0-127 each)
    #[must_use]
    pub fn from_adsr(attack: u8, decay: u8, sustain: u8, release: u8) -> Self {
        Self {
            attack: attack_rate(attack),
            decay: fall_rate(decay),
            sustain,
            release: fall_rate(release),
            ..Self::default()
        }
    }
}

/// One of the 16 sound channels
#[derive(Clone, Debug)]
pub struct Channel {
    id: u8,
    state: ChannelState,
    track_id: Option<TrackId>,
    priority: u8,
    pending: PendingRegister,
    reg: SoundRegister,
    /// Envelope amplitude, centibels in 7 bit fixed point
    ampl: i32,
    attack: u8,
    decay: u16,
    sustain: u8,
    release: u16,
    note_length: i32,
    manual_sweep: bool,
    sweep_len: i32,
    sweep_cnt: i32,
    sweep_pitch: i32,
    modulation: Modulation,
    mod_delay_cnt: u16,
    mod_counter: u32,
    pan: i32,
    key: u8,
    org_key: u8,
    ext_tune: i32,
    ext_pan: i32,
    ext_ampl: i32,
    velocity: i32,
    flags: ChannelFlags,
    ring: RingBuffer,
    vol: i32,
    sample_rate: SampleRate,
    interpolation: Interpolation,
}

impl Channel {
    /// Create an idle channel with hardware channel number `id`
    #[must_use]
    pub fn new(id: u8, sample_rate: SampleRate, interpolation: Interpolation) -> Self {
        Self {
            id,
            state: ChannelState::None,
            track_id: None,
            priority: 0,
            pending: PendingRegister::default(),
            reg: SoundRegister::default(),
            ampl: 0,
            attack: 0,
            decay: 0,
            sustain: 0x7F,
            release: 0xFFFF,
            note_length: -1,
            manual_sweep: false,
            sweep_len: 0,
            sweep_cnt: 0,
            sweep_pitch: 0,
            modulation: Modulation::default(),
            mod_delay_cnt: 0,
            mod_counter: 0,
            pan: 0,
            key: 0,
            org_key: 0,
            ext_tune: 0,
            ext_pan: 0,
            ext_ampl: 0,
            velocity: 0,
            flags: ChannelFlags::empty(),
            ring: RingBuffer::default(),
            vol: 0,
            sample_rate,
            interpolation,
        }
    }
    /// Hardware channel number
    #[must_use]
    pub const fn id(&self) -> u8 {
        self.id
    }
    /// Current state
    #[must_use]
    pub const fn state(&self) -> ChannelState {
        self.state
    }
    /// Track that owns the playing note
    #[must_use]
    pub const fn track_id(&self) -> Option<TrackId> {
        self.track_id
    }
    /// Allocation priority of the playing note
    #[must_use]
    pub const fn priority(&self) -> u8 {
        self.priority
    }
    /// Linear volume (`volume << 4 >> divider shift`) as of the last update
    #[must_use]
    pub const fn volume(&self) -> i32 {
        self.vol
    }
    /// Envelope amplitude (centibels in 7 bit fixed point)
    #[must_use]
    pub const fn amplitude(&self) -> i32 {
        self.ampl
    }
    /// Ticks until the note is released (-1 if it's held)
    #[must_use]
    pub const fn note_length(&self) -> i32 {
        self.note_length
    }
    /// The live hardware register
    #[must_use]
    pub const fn register(&self) -> &SoundRegister {
        &self.reg
    }
    /// Mutable access to the live hardware register
    pub const fn register_mut(&mut self) -> &mut SoundRegister {
        &mut self.reg
    }
    /// Samples around the read position, as the interpolation kernels see them
    #[must_use]
    pub const fn history(&self) -> &RingBuffer {
        &self.ring
    }
    /// Select how samples between source positions are reconstructed
    pub const fn set_interpolation(&mut self, interpolation: Interpolation) {
        self.interpolation = interpolation;
    }
    /// Whether the channel is idle
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state == ChannelState::None
    }
    /// Trigger a note. It starts playing at the next [`update`](Self::update).
    pub fn trigger_start(
        &mut self,
        pending: PendingRegister,
        track_id: Option<TrackId>,
        priority: u8,
        note: NoteParams,
    ) {
        tracing::trace!(
            channel = self.id,
            key = note.key,
            format = ?pending.control.format(),
            "start"
        );
        self.pending = pending;
        self.state = ChannelState::Start;
        self.track_id = track_id;
        self.priority = priority;
        self.attack = note.attack;
        self.decay = note.decay;
        self.sustain = note.sustain;
        self.release = note.release;
        self.key = note.key;
        self.org_key = note.org_key;
        self.velocity = sust_to_cb(note.velocity);
        self.pan = i32::from(note.pan);
        self.note_length = note.note_length;
        self.ext_tune = 0;
        self.ext_pan = 0;
        self.ext_ampl = 0;
        self.manual_sweep = false;
        self.sweep_len = 0;
        self.sweep_cnt = 0;
        self.sweep_pitch = 0;
        self.modulation.depth = 0;
        self.mod_delay_cnt = 0;
        self.mod_counter = 0;
        self.flags = ChannelFlags::empty();
        self.reg.sample_position = -START_DELAY;
        self.reg.psg_x = NOISE_SEED;
        self.reg.psg_last = 0;
        self.reg.psg_last_count = 0;
    }
    /// Trigger a note owned by `track_id`, and take over the track's volume, pan, tuning,
    /// modulation and portamento.
    pub fn note_on(
        &mut self,
        pending: PendingRegister,
        track_id: TrackId,
        priority: u8,
        note: NoteParams,
        track: &TrackParams,
    ) {
        self.trigger_start(pending, Some(track_id), priority, note);
        self.ext_ampl = track.volume_cb();
        self.ext_pan = i32::from(track.pan);
        self.ext_tune = track.tune(self.key, self.org_key);
        self.modulation = track.modulation;
        self.start_portamento(track);
    }
    /// Set up the pitch sweep of a freshly triggered note from the track's portamento settings
    pub fn start_portamento(&mut self, track: &TrackParams) {
        self.manual_sweep = false;
        self.sweep_pitch = i32::from(track.sweep_pitch);
        self.sweep_cnt = 0;
        if !track.portamento {
            self.sweep_len = 0;
            return;
        }
        let diff = (i32::from(track.porta_key) - i32::from(self.key)) << 22;
        self.sweep_pitch += diff >> 16;
        if track.porta_time == 0 {
            self.sweep_len = self.note_length;
            self.manual_sweep = true;
        } else {
            let sq_time = i32::from(track.porta_time) * i32::from(track.porta_time);
            self.sweep_len = (self.sweep_pitch.abs() * sq_time) >> 11;
        }
    }
    /// Let the note fade out with its release rate
    pub const fn release(&mut self) {
        self.note_length = -1;
        self.priority = 1;
        self.state = ChannelState::Release;
    }
    /// Stop the channel immediately
    pub fn kill(&mut self) {
        if self.state != ChannelState::None {
            tracing::trace!(channel = self.id, "kill");
        }
        self.state = ChannelState::None;
        self.track_id = None;
        self.priority = 0;
        self.reg.clear_control();
        self.vol = 0;
        self.note_length = -1;
    }
    /// Apply what the owning track changed this tick
    pub fn update_track(&mut self, track: &TrackParams) {
        let changes = track.update_flags;
        if changes.is_empty() {
            return;
        }
        if changes.contains(TrackUpdateFlags::LENGTH) && self.state > ChannelState::Start {
            if self.state < ChannelState::Release && self.note_length > 0 {
                self.note_length -= 1;
                if self.note_length == 0 {
                    self.release();
                }
            }
            if self.manual_sweep && self.sweep_cnt < self.sweep_len {
                self.sweep_cnt += 1;
            }
        }
        if changes.contains(TrackUpdateFlags::VOLUME) {
            self.ext_ampl = track.volume_cb();
            self.flags.insert(ChannelFlags::UPDATE_VOLUME);
        }
        if changes.contains(TrackUpdateFlags::PAN) {
            self.ext_pan = i32::from(track.pan);
            self.flags.insert(ChannelFlags::UPDATE_PAN);
        }
        if changes.contains(TrackUpdateFlags::TIMER) {
            self.ext_tune = track.tune(self.key, self.org_key);
            self.flags.insert(ChannelFlags::UPDATE_TIMER);
        }
        if changes.contains(TrackUpdateFlags::MODULATION) {
            let old = self.modulation.kind;
            self.modulation = track.modulation;
            if old != self.modulation.kind {
                self.flags.insert(ChannelFlags::for_mod_type(old));
                self.flags.insert(ChannelFlags::for_mod_type(self.modulation.kind));
            }
        }
    }
    const fn pitch_sweep_active(&self) -> bool {
        self.sweep_pitch != 0 && self.sweep_len != 0 && self.sweep_cnt <= self.sweep_len
    }
    /// Per-tick update: envelope, modulation, and the register fields that depend on them
    pub fn update(&mut self) {
        if self.state > ChannelState::Start && !self.reg.enable {
            self.kill();
            return;
        }
        let not_in_sustain = self.state != ChannelState::Sustain;
        let in_start = self.state == ChannelState::Start;
        let pitch_sweep = self.pitch_sweep_active();
        let mut modulating = self.modulation.depth != 0;
        let mut vol_update = self.flags.contains(ChannelFlags::UPDATE_VOLUME) || not_in_sustain;
        let mut pan_update = self.flags.contains(ChannelFlags::UPDATE_PAN) || in_start;
        let mut timer_update =
            self.flags.contains(ChannelFlags::UPDATE_TIMER) || in_start || pitch_sweep;

        if self.step_envelope().is_break() {
            return;
        }

        if modulating && self.mod_delay_cnt < self.modulation.delay {
            self.mod_delay_cnt += 1;
            modulating = false;
        }
        let mut mod_param = 0;
        if modulating {
            match self.modulation.kind {
                ModType::Pitch => timer_update = true,
                ModType::Volume => vol_update = true,
                ModType::Pan => pan_update = true,
            }
            mod_param = self.modulation_param();
            self.mod_counter =
                (self.mod_counter + (u32::from(self.modulation.speed) << 6)) % MOD_PERIOD;
        }
        let modulation = modulating.then_some((self.modulation.kind, mod_param));

        if timer_update {
            self.update_timer(pitch_sweep, modulation);
        }
        if vol_update || pan_update {
            self.update_control(vol_update, pan_update, modulation);
        }
    }
    /// Advance the envelope by one tick. Breaks if the channel is (or became) idle.
    fn step_envelope(&mut self) -> ControlFlow<()> {
        match self.state {
            ChannelState::None => return ControlFlow::Break(()),
            ChannelState::Start => {
                self.reg.clear_control();
                self.reg.latch(&self.pending);
                self.ampl = AMPL_THRESHOLD;
                self.state = ChannelState::Attack;
                self.step_attack();
            }
            ChannelState::Attack => self.step_attack(),
            ChannelState::Decay => {
                self.ampl -= i32::from(self.decay);
                let sustain_level = sust_to_cb(self.sustain) << 7;
                if self.ampl <= sustain_level {
                    self.ampl = sustain_level;
                    self.state = ChannelState::Sustain;
                }
            }
            ChannelState::Sustain => {}
            ChannelState::Release => {
                self.ampl -= i32::from(self.release);
                if self.ampl <= AMPL_THRESHOLD {
                    self.kill();
                    return ControlFlow::Break(());
                }
            }
        }
        ControlFlow::Continue(())
    }
    fn step_attack(&mut self) {
        let old = self.ampl >> 7;
        let mut ampl = self.ampl;
        // Step until the integer centibel value changes
        loop {
            ampl = ampl * i32::from(self.attack) / 256;
            if ampl >> 7 != old {
                break;
            }
        }
        self.ampl = ampl;
        if self.ampl == 0 {
            self.state = ChannelState::Decay;
        }
    }
    /// Current LFO output, scaled for what it modulates
    fn modulation_param(&self) -> i32 {
        let phase = (self.mod_counter >> 8).cast_signed();
        // 7.14 fixed point
        let param =
            sine(phase) * i32::from(self.modulation.range) * i32::from(self.modulation.depth);
        match self.modulation.kind {
            // 6 dB (60 cB) range, no fractional bits
            ModType::Volume => (param * 60) >> 14,
            ModType::Pitch | ModType::Pan => param >> 8,
        }
    }
    #[expect(
        clippy::cast_possible_truncation,
        reason = "Sweep offset is bounded by the sweep pitch"
    )]
    fn update_timer(&mut self, pitch_sweep: bool, modulation: Option<(ModType, i32)>) {
        let mut total_adj = self.ext_tune;
        if let Some((ModType::Pitch, param)) = modulation {
            total_adj += param;
        }
        if pitch_sweep {
            let len = i64::from(self.sweep_len);
            let cnt = i64::from(self.sweep_cnt);
            let sweep = i64::from(self.sweep_pitch) * (len - cnt) / len;
            total_adj = (i64::from(total_adj) + sweep) as i32;
            if !self.manual_sweep {
                self.sweep_cnt += 1;
            }
        }
        let mut tmr = self.pending.timer;
        if total_adj != 0 {
            tmr = timer_adjust(tmr, total_adj);
        }
        self.reg.timer = tmr.wrapping_neg();
        self.reg.sample_increase = f64::from(ARM7_CLOCK)
            / (f64::from(self.sample_rate) * 2.0)
            / f64::from(0x10000 - u32::from(self.reg.timer));
        self.flags.remove(ChannelFlags::UPDATE_TIMER);
    }
    /// Recompute volume and/or pan into the control word
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "Pan is clamped to 0..=127"
    )]
    fn update_control(&mut self, vol: bool, pan: bool, modulation: Option<(ModType, i32)>) {
        let mut cw = self.pending.control;
        if vol {
            let mut total = (self.ampl >> 7) + self.ext_ampl + self.velocity;
            if let Some((ModType::Volume, param)) = modulation {
                total += param;
            }
            let total = (total + AMPL_K).clamp(0, AMPL_K);
            let divider = if total < AMPL_K - 240 {
                3
            } else if total < AMPL_K - 120 {
                2
            } else if total < AMPL_K - 60 {
                1
            } else {
                0
            };
            cw = cw.with_volume(volume_magnitude(total)).with_divider(divider);
            self.vol = (i32::from(cw.volume()) << 4) >> vol_div_shift(cw.divider());
            self.flags.remove(ChannelFlags::UPDATE_VOLUME);
        }
        if pan {
            let mut real_pan = self.pan + self.ext_pan;
            if let Some((ModType::Pan, param)) = modulation {
                real_pan += param;
            }
            let real_pan = (real_pan + 64).clamp(0, 127);
            cw = cw.with_pan(real_pan as u8);
            self.flags.remove(ChannelFlags::UPDATE_PAN);
        }
        self.pending.control = cw;
        self.reg.set_control(cw);
    }
    /// Output sample at the current position (before volume and pan)
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "Position is non-negative here"
    )]
    pub fn generate_sample(&mut self) -> i32 {
        let pos = self.reg.sample_position;
        if pos < 0.0 {
            return 0;
        }
        let idx = pos as u32;
        if self.reg.format != SampleFormat::Psg {
            if self.interpolation == Interpolation::None {
                return i32::from(self.reg.sample_at(idx));
            }
            return interpolate(
                self.interpolation,
                &self.ring,
                pos.fract(),
                self.reg.sample_increase,
            );
        }
        if DUTY_CHANNELS.contains(&self.id) {
            let duty = usize::from(self.reg.wave_duty & 7);
            return i32::from(WAVE_DUTY_TABLE[duty][(idx & 7) as usize]);
        }
        if NOISE_CHANNELS.contains(&self.id) {
            return i32::from(self.advance_noise(idx));
        }
        0
    }
    /// Step the noise generator up to position `to`
    fn advance_noise(&mut self, to: u32) -> i16 {
        for _ in self.reg.psg_last_count..to {
            if self.reg.psg_x & 1 != 0 {
                self.reg.psg_x = (self.reg.psg_x >> 1) ^ 0x6000;
                self.reg.psg_last = -0x7FFF;
            } else {
                self.reg.psg_x >>= 1;
                self.reg.psg_last = 0x7FFF;
            }
        }
        self.reg.psg_last_count = to;
        self.reg.psg_last
    }
    /// Advance the read position by one output sample, feeding the history ring
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "Positions are non-negative where truncated"
    )]
    pub fn increment_sample(&mut self) {
        let old_pos = self.reg.sample_position;
        let new_pos = old_pos + self.reg.sample_increase;
        let pcm = self.reg.format != SampleFormat::Psg;
        if pcm {
            if old_pos < 0.0 && new_pos >= 0.0 {
                self.prime_history();
            }
            if old_pos >= 0.0 {
                self.feed_history(old_pos as u32, new_pos as u32);
            }
        }
        self.reg.sample_position = new_pos;
        if pcm && new_pos >= f64::from(self.reg.total_length) {
            if self.reg.is_looping() {
                let len = f64::from(self.reg.length);
                while self.reg.sample_position >= f64::from(self.reg.total_length) {
                    self.reg.sample_position -= len;
                }
            } else {
                self.kill();
            }
        }
    }
    /// Fill the history for playback starting at position 0
    fn prime_history(&mut self) {
        let data = self.reg.source.as_ref().map_or(&[][..], SampleSource::data);
        let ahead = HISTORY_AHEAD as usize;
        let total = data.len().min(self.reg.total_length as usize);
        self.ring.clear();
        for _ in 0..ahead {
            self.ring.push(data.first().copied().unwrap_or(0));
        }
        if total >= ahead {
            self.ring.push_slice(&data[..ahead]);
            return;
        }
        self.ring.push_slice(&data[..total]);
        if !self.reg.is_looping() {
            return;
        }
        let loop_data = &data[(self.reg.loop_start as usize).min(total)..total];
        let mut left = ahead - total;
        while left != 0 && !loop_data.is_empty() {
            let n = left.min(loop_data.len());
            self.ring.push_slice(&loop_data[..n]);
            left -= n;
        }
    }
    /// Push the samples that come into view when moving from `old` to `new`
    fn feed_history(&mut self, old: u32, new: u32) {
        let looping = self.reg.is_looping();
        let total = self.reg.total_length;
        let length = self.reg.length;
        let wrap = |mut loc: u32| {
            if looping {
                while loc >= total {
                    loc -= length;
                }
            }
            loc
        };
        let mut loc = wrap(old + HISTORY_AHEAD);
        let new = wrap(new + HISTORY_AHEAD);
        while loc != new {
            if loc < total {
                self.ring.push(self.reg.sample_at(loc));
            } else {
                self.ring.push(self.reg.sample_at(total.saturating_sub(1)));
            }
            loc += 1;
            if looping && loc >= total {
                loc -= length;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{register::RepeatMode, tables::PITCH_PER_OCTAVE},
    };

    /// Output rate at which a timer of [`UNIT_TIMER`] advances exactly one sample per output sample
    const UNIT_RATE: SampleRate = 53_881;
    const UNIT_TIMER: u16 = 311;

    fn looping_source() -> SampleSource {
        SampleSource::new(vec![100i16, 200, -100, -200], 0, 4).unwrap()
    }

    fn pcm_pending(source: SampleSource, repeat: RepeatMode) -> PendingRegister {
        PendingRegister::pcm(source, SampleFormat::Pcm16, repeat, UNIT_TIMER)
    }

    fn instant_note() -> NoteParams {
        NoteParams {
            attack: 0,
            decay: 0xFFFF,
            sustain: 0x7F,
            release: 0xFFFF,
            ..NoteParams::default()
        }
    }

    /// Slowest attack and decay
    fn slow_note() -> NoteParams {
        NoteParams {
            attack: 0xFF,
            decay: 1,
            sustain: 0x7F,
            release: 0xFFFF,
            ..NoteParams::default()
        }
    }

    fn started(id: u8, pending: PendingRegister, note: NoteParams) -> Channel {
        let mut ch = Channel::new(id, UNIT_RATE, Interpolation::None);
        ch.trigger_start(pending, Some(0), 64, note);
        ch.update();
        ch
    }

    #[test]
    fn idle_update_is_noop() {
        let mut ch = Channel::new(0, UNIT_RATE, Interpolation::Linear);
        ch.update();
        assert_eq!(ch.state(), ChannelState::None);
        assert_eq!(ch.volume(), 0);
        assert_eq!(ch.generate_sample(), 0);
    }

    #[test]
    fn start_runs_attack_in_the_same_tick() {
        let ch = started(0, pcm_pending(looping_source(), RepeatMode::Loop), instant_note());
        // Attack coefficient 0 reaches full amplitude in one step
        assert_eq!(ch.state(), ChannelState::Decay);
        assert_eq!(ch.amplitude(), 0);
        assert!(ch.register().enable);
        assert_eq!(ch.register().volume_mul, 127);
        assert_eq!(ch.register().volume_div, 0);
        assert_eq!(ch.register().panning, 64);
        assert_eq!(ch.volume(), 127 << 4);
        assert_eq!(ch.register().timer, UNIT_TIMER.wrapping_neg());
        assert!((ch.register().sample_increase - 1.0).abs() < 1e-12);
    }

    #[test]
    fn envelope_walks_through_all_states() {
        let note = NoteParams {
            attack: 0xFE,
            decay: 0x1000,
            sustain: 64,
            release: 0x2000,
            ..NoteParams::default()
        };
        let mut ch = started(0, pcm_pending(looping_source(), RepeatMode::Loop), note);
        assert_eq!(ch.state(), ChannelState::Attack);
        let mut prev = ch.amplitude();
        let mut ticks = 0;
        while ch.state() == ChannelState::Attack {
            ch.update();
            assert!(ch.amplitude() > prev);
            prev = ch.amplitude();
            ticks += 1;
            assert!(ticks < 10_000);
        }
        assert_eq!(ch.state(), ChannelState::Decay);
        while ch.state() == ChannelState::Decay {
            ch.update();
        }
        assert_eq!(ch.state(), ChannelState::Sustain);
        assert_eq!(ch.amplitude(), sust_to_cb(64) << 7);
        ch.update();
        assert_eq!(ch.amplitude(), sust_to_cb(64) << 7);
        ch.release();
        assert_eq!(ch.priority(), 1);
        assert_eq!(ch.note_length(), -1);
        while ch.state() == ChannelState::Release {
            ch.update();
        }
        assert_eq!(ch.state(), ChannelState::None);
        assert_eq!(ch.track_id(), None);
        assert_eq!(ch.priority(), 0);
        assert_eq!(ch.volume(), 0);
        assert!(!ch.register().enable);
    }

    #[test]
    fn amplitude_stays_in_range() {
        let note = NoteParams::from_adsr(100, 100, 90, 100);
        let mut ch = started(0, pcm_pending(looping_source(), RepeatMode::Loop), note);
        for tick in 0..2000 {
            if tick == 500 {
                ch.release();
            }
            ch.update();
            if ch.is_idle() {
                return;
            }
            assert!((AMPL_THRESHOLD..=0).contains(&ch.amplitude()));
        }
        panic!("note never ended");
    }

    #[test]
    fn amplitude_never_rises_after_attack() {
        let note = NoteParams {
            attack: 0xFE,
            decay: 0x300,
            sustain: 40,
            release: 0x200,
            ..NoteParams::default()
        };
        let mut ch = started(0, pcm_pending(looping_source(), RepeatMode::Loop), note);
        let mut prev = ch.amplitude();
        for tick in 0..5000 {
            if tick == 2000 {
                assert_eq!(ch.state(), ChannelState::Sustain);
                ch.release();
            }
            let was = ch.state();
            ch.update();
            if ch.is_idle() {
                assert!(tick > 2000);
                return;
            }
            if was >= ChannelState::Decay {
                assert!(ch.amplitude() <= prev, "{was:?} rose at tick {tick}");
            }
            prev = ch.amplitude();
        }
        panic!("note never ended");
    }

    #[test]
    fn out_of_range_release_rate_still_ends() {
        let note = NoteParams::from_adsr(0, 0, 0x7F, 0x80);
        assert_eq!(note.attack, 0xFF);
        assert_eq!(note.release, 1);
        let mut ch = started(0, pcm_pending(looping_source(), RepeatMode::Loop), note);
        ch.release();
        for _ in 0..100_000 {
            ch.update();
            if ch.is_idle() {
                return;
            }
        }
        panic!("released note never ended");
    }

    #[test]
    fn disabled_register_kills() {
        let mut ch = started(0, pcm_pending(looping_source(), RepeatMode::Loop), instant_note());
        ch.register_mut().enable = false;
        ch.update();
        assert!(ch.is_idle());
    }

    #[test]
    fn note_length_releases_after_counted_ticks() {
        let note = NoteParams {
            note_length: 3,
            ..instant_note()
        };
        let mut ch = Channel::new(0, UNIT_RATE, Interpolation::None);
        let track = TrackParams {
            update_flags: TrackUpdateFlags::LENGTH,
            ..TrackParams::default()
        };
        ch.trigger_start(pcm_pending(looping_source(), RepeatMode::Loop), Some(0), 64, note);
        // Length ticks don't count while the channel is starting
        ch.update_track(&track);
        ch.update();
        assert_eq!(ch.note_length(), 3);
        for _ in 0..2 {
            ch.update_track(&track);
            ch.update();
            assert_ne!(ch.state(), ChannelState::Release);
        }
        ch.update_track(&track);
        assert_eq!(ch.state(), ChannelState::Release);
        // Release 0xFFFF from full amplitude takes two ticks to go silent
        ch.update();
        assert_eq!(ch.state(), ChannelState::Release);
        ch.update();
        assert!(ch.is_idle());
    }

    #[test]
    fn slow_note_plays_loop_and_releases_on_time() {
        let source = [100, 200, -100, -200];
        let mut ch = started(0, pcm_pending(looping_source(), RepeatMode::Loop), slow_note());
        assert_eq!(ch.state(), ChannelState::Attack);
        for i in 0..400 {
            let expected = if i < 3 { 0 } else { source[(i - 3) % 4] };
            assert_eq!(ch.generate_sample(), expected, "sample {i}");
            ch.increment_sample();
            if i % 100 == 99 {
                ch.update();
            }
        }
        assert!(!ch.is_idle());

        let mut ch = Channel::new(0, UNIT_RATE, Interpolation::None);
        let track = TrackParams {
            update_flags: TrackUpdateFlags::LENGTH,
            ..TrackParams::default()
        };
        let note = NoteParams {
            note_length: 3,
            ..slow_note()
        };
        ch.trigger_start(pcm_pending(looping_source(), RepeatMode::Loop), Some(0), 64, note);
        ch.update_track(&track);
        ch.update();
        for _ in 0..2 {
            ch.update_track(&track);
            ch.update();
            assert_eq!(ch.state(), ChannelState::Attack);
        }
        ch.update_track(&track);
        assert_eq!(ch.state(), ChannelState::Release);
        // Still near the bottom of the attack, one release step reaches silence
        assert!(ch.amplitude() - 0xFFFF <= AMPL_THRESHOLD);
        ch.update();
        assert!(ch.is_idle());
    }

    #[test]
    fn track_volume_and_pan_flow_into_register() {
        let mut ch = started(0, pcm_pending(looping_source(), RepeatMode::Loop), instant_note());
        ch.update();
        assert_eq!(ch.state(), ChannelState::Sustain);
        let mut track = TrackParams {
            update_flags: TrackUpdateFlags::VOLUME | TrackUpdateFlags::PAN,
            volume: 64,
            pan: -64,
            ..TrackParams::default()
        };
        ch.update_track(&track);
        ch.update();
        assert_eq!(ch.register().panning, 0);
        // -119 cB lands in the divide-by-2 range
        assert_eq!(ch.register().volume_div, 1);
        assert_eq!(ch.register().volume_mul, volume_magnitude(AMPL_K - 119));
        track.volume = 0;
        track.pan = 63;
        ch.update_track(&track);
        ch.update();
        assert_eq!(ch.register().panning, 127);
        assert_eq!(ch.register().volume_mul, 0);
        assert_eq!(ch.volume(), 0);
        // Flags were consumed
        let vol_before = ch.register().volume_mul;
        ch.update();
        assert_eq!(ch.register().volume_mul, vol_before);
    }

    #[test]
    fn tune_changes_increment() {
        let mut ch = started(0, pcm_pending(looping_source(), RepeatMode::Loop), instant_note());
        let track = TrackParams {
            update_flags: TrackUpdateFlags::TIMER,
            ..TrackParams::default()
        };
        ch.key = 72;
        ch.update_track(&track);
        ch.update();
        assert_eq!(ch.register().timer, timer_adjust(UNIT_TIMER, PITCH_PER_OCTAVE).wrapping_neg());
        assert!((ch.register().sample_increase - 2.0).abs() < 0.01);
    }

    #[test]
    fn modulation_waits_for_delay_then_wobbles_pitch() {
        let mut track = TrackParams::default();
        track.modulation = Modulation {
            kind: ModType::Pitch,
            speed: 64,
            depth: 127,
            range: 4,
            delay: 2,
        };
        let mut ch = Channel::new(0, UNIT_RATE, Interpolation::None);
        ch.note_on(
            pcm_pending(looping_source(), RepeatMode::Loop),
            0,
            64,
            instant_note(),
            &track,
        );
        ch.update();
        ch.update();
        assert_eq!(ch.mod_counter, 0);
        ch.update();
        // First modulated tick reads phase 0 (sine 0) and then advances
        assert_eq!(ch.mod_counter, 64 << 6);
        assert_eq!(ch.register().timer, UNIT_TIMER.wrapping_neg());
        ch.update();
        assert_ne!(ch.register().timer, UNIT_TIMER.wrapping_neg());
        for _ in 0..100 {
            ch.update();
            assert!(ch.mod_counter < MOD_PERIOD);
        }
    }

    #[test]
    fn mod_type_change_marks_both_targets() {
        let mut ch = started(0, pcm_pending(looping_source(), RepeatMode::Loop), instant_note());
        let track = TrackParams {
            update_flags: TrackUpdateFlags::MODULATION,
            modulation: Modulation {
                kind: ModType::Pan,
                ..Modulation::default()
            },
            ..TrackParams::default()
        };
        ch.update_track(&track);
        assert_eq!(
            ch.flags,
            ChannelFlags::UPDATE_TIMER | ChannelFlags::UPDATE_PAN
        );
    }

    #[test]
    fn volume_modulation_follows_the_lfo() {
        let mut track = TrackParams::default();
        // One LFO period is 32 ticks, swinging up to 30 cB down
        track.modulation = Modulation {
            kind: ModType::Volume,
            speed: 16,
            depth: 64,
            range: 1,
            delay: 0,
        };
        let mut ch = Channel::new(0, UNIT_RATE, Interpolation::None);
        ch.note_on(
            pcm_pending(looping_source(), RepeatMode::Loop),
            0,
            64,
            instant_note(),
            &track,
        );
        let mut volumes = Vec::new();
        for _ in 0..64 {
            ch.update();
            volumes.push(ch.register().volume_mul);
        }
        // The upper half of the sine clamps at full volume, the lower half attenuates
        assert_eq!(volumes.iter().max(), Some(&127));
        let quietest = volumes.iter().min().copied().unwrap();
        assert_eq!(quietest, volume_magnitude(AMPL_K - 30));
        assert_eq!(volumes[..32], volumes[32..]);
        assert_eq!(ch.register().volume_div, 0);
    }

    #[test]
    fn portamento_sweeps_towards_the_key() {
        let track = TrackParams {
            portamento: true,
            porta_key: 48,
            porta_time: 4,
            ..TrackParams::default()
        };
        let mut ch = Channel::new(0, UNIT_RATE, Interpolation::None);
        ch.note_on(
            pcm_pending(looping_source(), RepeatMode::Loop),
            0,
            64,
            instant_note(),
            &track,
        );
        // One octave below, in 1/64 semitones
        assert_eq!(ch.sweep_pitch, -12 * 64);
        assert_eq!(ch.sweep_len, (768 * 16) >> 11);
        assert!(!ch.manual_sweep);
        ch.update();
        // Starts a full octave down
        assert_eq!(
            ch.register().timer,
            timer_adjust(UNIT_TIMER, -PITCH_PER_OCTAVE).wrapping_neg()
        );
        let mut prev = ch.register().timer.wrapping_neg();
        for _ in 0..ch.sweep_len {
            ch.update();
            let tmr = ch.register().timer.wrapping_neg();
            assert!(tmr <= prev);
            prev = tmr;
        }
        ch.update();
        assert_eq!(ch.register().timer, UNIT_TIMER.wrapping_neg());
    }

    #[test]
    fn manual_portamento_follows_note_length() {
        let track = TrackParams {
            portamento: true,
            porta_key: 61,
            porta_time: 0,
            update_flags: TrackUpdateFlags::LENGTH,
            ..TrackParams::default()
        };
        let note = NoteParams {
            note_length: 20,
            ..instant_note()
        };
        let mut ch = Channel::new(0, UNIT_RATE, Interpolation::None);
        ch.note_on(pcm_pending(looping_source(), RepeatMode::Loop), 0, 64, note, &track);
        assert!(ch.manual_sweep);
        assert_eq!(ch.sweep_len, 20);
        ch.update();
        ch.update_track(&track);
        assert_eq!(ch.sweep_cnt, 1);
    }

    #[test]
    fn pre_roll_then_looping_playback() {
        let mut ch = started(0, pcm_pending(looping_source(), RepeatMode::Loop), instant_note());
        let mut out = Vec::new();
        for _ in 0..11 {
            out.push(ch.generate_sample());
            ch.increment_sample();
        }
        assert_eq!(out, [0, 0, 0, 100, 200, -100, -200, 100, 200, -100, -200]);
        assert!(!ch.is_idle());
    }

    #[test]
    fn interpolated_playback_matches_samples_at_whole_positions() {
        for kind in [Interpolation::Linear, Interpolation::Lagrange4] {
            let mut ch = started(0, pcm_pending(looping_source(), RepeatMode::Loop), instant_note());
            ch.set_interpolation(kind);
            let mut out = Vec::new();
            for _ in 0..11 {
                out.push(ch.generate_sample());
                ch.increment_sample();
            }
            assert_eq!(out[..7], [0, 0, 0, 100, 200, -100, -200], "{kind}");
        }
    }

    #[test]
    fn one_shot_ends_at_total_length() {
        let source = SampleSource::new(vec![1i16; 20], 0, 20).unwrap();
        let mut ch = started(0, pcm_pending(source, RepeatMode::OneShot), instant_note());
        // 3 samples of delay, then 20 samples of data
        for _ in 0..22 {
            ch.increment_sample();
            assert!(!ch.is_idle());
        }
        ch.increment_sample();
        assert!(ch.is_idle());
    }

    #[test]
    fn priming_repeats_short_loops() {
        let mut ch = started(0, pcm_pending(looping_source(), RepeatMode::Loop), instant_note());
        for _ in 0..3 {
            ch.increment_sample();
        }
        assert_eq!(
            ch.history().window(),
            [
                100, 100, 100, 100, 100, 100, 100, 100, 100, 200, -100, -200, 100, 200, -100,
                -200, 100
            ]
        );
        assert_eq!(ch.history().at(0), 100);
        assert_eq!(ch.history().at(1), 200);
    }

    #[test]
    fn history_advances_by_whole_position_delta() {
        for increment in [1.75, 0.3] {
            check_history_delta(increment);
        }
    }

    fn check_history_delta(increment: f64) {
        let source = SampleSource::new((0..100).collect::<Vec<i16>>(), 0, 100).unwrap();
        let mut ch = started(0, pcm_pending(source, RepeatMode::Loop), instant_note());
        ch.set_interpolation(Interpolation::Sinc);
        ch.register_mut().sample_increase = increment;
        while ch.register().sample_position < 0.0 {
            ch.increment_sample();
        }
        for _ in 0..400 {
            let before_pos = ch.register().sample_position;
            let before_pushed = ch.history().pushed();
            ch.increment_sample();
            let after_pos = ch.register().sample_position;
            let mut delta = after_pos.floor() - before_pos.floor();
            if delta < 0.0 {
                delta += 100.0;
            }
            #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let delta = delta as u64;
            assert_eq!(ch.history().pushed() - before_pushed, delta);
            // Offset 0 is the sample at the read position
            #[expect(clippy::cast_possible_truncation)]
            let expected = after_pos as i16;
            assert_eq!(ch.history().at(0), expected);
        }
    }

    #[test]
    fn square_wave_on_duty_channels_only() {
        let note = instant_note();
        let mut duty = started(8, PendingRegister::psg(3, UNIT_TIMER), note);
        let mut pcm_only = started(2, PendingRegister::psg(3, UNIT_TIMER), note);
        for _ in 0..3 {
            duty.increment_sample();
            pcm_only.increment_sample();
        }
        let mut out = Vec::new();
        for _ in 0..8 {
            out.push(duty.generate_sample());
            assert_eq!(pcm_only.generate_sample(), 0);
            duty.increment_sample();
            pcm_only.increment_sample();
        }
        let (lo, hi) = (-0x7FFF, 0x7FFF);
        assert_eq!(out, [lo, lo, lo, lo, hi, hi, hi, hi]);
        // PSG notes never end by themselves
        assert!(!duty.is_idle());
    }

    #[test]
    fn noise_follows_lfsr() {
        let mut ch = started(14, PendingRegister::psg(0, UNIT_TIMER), instant_note());
        for _ in 0..3 {
            ch.increment_sample();
        }
        let mut x: u16 = 0x7FFF;
        let mut expected = Vec::new();
        let mut last = 0;
        for i in 0..64 {
            // Position i has consumed i steps of the LFSR
            expected.push(last);
            if i < 63 {
                if x & 1 != 0 {
                    x = (x >> 1) ^ 0x6000;
                    last = -0x7FFF;
                } else {
                    x >>= 1;
                    last = 0x7FFF;
                }
            }
        }
        let mut out = Vec::new();
        for _ in 0..64 {
            out.push(ch.generate_sample());
            ch.increment_sample();
        }
        assert_eq!(out, expected);
        assert!(out.iter().all(|&s| s == 0 || s.abs() == 0x7FFF));
    }

    #[test]
    fn velocity_attenuates() {
        let note = NoteParams {
            velocity: 0,
            ..instant_note()
        };
        let ch = started(0, pcm_pending(looping_source(), RepeatMode::Loop), note);
        assert_eq!(ch.register().volume_mul, 0);
        assert_eq!(ch.register().volume_div, 3);
        assert_eq!(ch.volume(), 0);
    }
}
