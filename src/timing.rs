//! Timing related definitions and utilities

/// Output sample rate in Hz
pub type SampleRate = u32;

/// Sequencer ticks elapsed since playback started
pub type Tick = u64;

/// Clock of the ARM7 CPU that drives the sound hardware, in Hz
pub const ARM7_CLOCK: u32 = 33_513_982;

/// ARM7 cycles between two sequencer ticks
pub const CYCLES_PER_TICK: u32 = 64 * 2728;

/// Duration of one sequencer tick (about 5.2 ms)
pub const SECONDS_PER_TICK: f64 = 174_592.0 / 33_513_982.0;

/// Rate (in Hz) at which a channel timer of 0 would fire
const TIMER_BASE_RATE: u32 = ARM7_CLOCK / 2;

/// Calculates the hardware timer value that plays a sample recorded at `rate` Hz at its
/// original pitch.
#[must_use]
pub fn timer_for_rate(rate: u32) -> u16 {
    u16::try_from(TIMER_BASE_RATE / rate.max(1)).unwrap_or(u16::MAX)
}

/// Calculates how many output samples make up a tick.
#[must_use]
pub fn samples_per_tick(out_sample_rate: SampleRate) -> f64 {
    f64::from(out_sample_rate) * SECONDS_PER_TICK
}

/// Decides at which output samples a sequencer tick happens
#[derive(Clone, Copy, Debug)]
pub struct TickClock {
    seconds_per_sample: f64,
    elapsed: f64,
    next_tick: f64,
    ticks: Tick,
}

impl TickClock {
    /// Create a clock for the given output rate. The first tick is due after [`SECONDS_PER_TICK`].
    #[must_use]
    pub fn new(out_sample_rate: SampleRate) -> Self {
        Self {
            seconds_per_sample: 1.0 / f64::from(out_sample_rate.max(1)),
            elapsed: 0.0,
            next_tick: SECONDS_PER_TICK,
            ticks: 0,
        }
    }
    /// Advance the clock by one output sample.
    ///
    /// Returns whether a tick should run once this sample has been produced.
    pub fn advance(&mut self) -> bool {
        self.elapsed += self.seconds_per_sample;
        if self.elapsed > self.next_tick {
            self.next_tick += SECONDS_PER_TICK;
            self.ticks += 1;
            true
        } else {
            false
        }
    }
    /// Number of ticks [`advance`](Self::advance) reported so far
    #[must_use]
    pub const fn ticks(&self) -> Tick {
        self.ticks
    }
    /// Seconds of output produced so far
    #[must_use]
    pub const fn elapsed(&self) -> f64 {
        self.elapsed
    }
}

#[test]
fn test_tick_clock_rate() {
    let rate = 44_100;
    let mut clock = TickClock::new(rate);
    let mut ticks = 0;
    for _ in 0..rate {
        if clock.advance() {
            ticks += 1;
        }
    }
    // One second of output holds about 192 ticks
    assert_eq!(ticks, clock.ticks());
    assert!((191..=192).contains(&ticks), "{ticks}");
    assert!((samples_per_tick(rate) - 229.7).abs() < 0.1);
}

#[test]
fn test_timer_for_rate() {
    assert_eq!(timer_for_rate(32_728), 512);
    assert_eq!(timer_for_rate(0), u16::MAX);
    assert_eq!(timer_for_rate(16_756_991), 1);
}
