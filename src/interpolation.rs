//! Resampling kernels that reconstruct a sample between two source samples

use {
    crate::{
        ring_buffer::RingBuffer,
        result::{ConfigError, ConfigResult},
    },
    arrayvec::ArrayVec,
    std::{f64::consts::PI, fmt, str::FromStr, sync::OnceLock},
};

/// Number of source samples on each side of the read position the sinc kernel looks at
pub const SINC_WIDTH: usize = 8;
/// Table entries per source sample in the sinc and window tables
pub const SINC_RESOLUTION: usize = 8192;
/// Number of sinc table intervals (the tables hold one more entry)
pub const SINC_SAMPLES: usize = SINC_RESOLUTION * SINC_WIDTH;

/// How channels reconstruct samples between source sample positions
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub enum Interpolation {
    /// Nearest (previous) sample, like the hardware
    None,
    /// Straight line between two neighbouring samples
    #[default]
    Linear,
    /// 4 point Lagrange polynomial
    Lagrange4,
    /// 6 point Lagrange polynomial
    Lagrange6,
    /// Windowed sinc over `2 * SINC_WIDTH` samples
    Sinc,
}

impl Interpolation {
    /// Every mode, in index order
    pub const ALL: [Self; 5] = [
        Self::None,
        Self::Linear,
        Self::Lagrange4,
        Self::Lagrange6,
        Self::Sinc,
    ];
    /// Mode for a numeric index (0 is `None`, 4 is `Sinc`)
    pub fn from_index(idx: u8) -> ConfigResult<Self> {
        Self::ALL
            .get(usize::from(idx))
            .copied()
            .ok_or(ConfigError::InterpolationIndex(idx))
    }
    /// Short lowercase name, as accepted by [`FromStr`]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Linear => "linear",
            Self::Lagrange4 => "lagrange4",
            Self::Lagrange6 => "lagrange6",
            Self::Sinc => "sinc",
        }
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Interpolation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(idx) = s.parse::<u8>() {
            return Self::from_index(idx);
        }
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "none" | "nearest" => Ok(Self::None),
            "linear" => Ok(Self::Linear),
            "lagrange4" | "4point" => Ok(Self::Lagrange4),
            "lagrange6" | "6point" => Ok(Self::Lagrange6),
            "sinc" => Ok(Self::Sinc),
            _ => Err(ConfigError::UnknownInterpolation(s.to_owned())),
        }
    }
}

/// Precomputed sinc function and window used by the sinc kernel
pub struct SincTables {
    sinc: Box<[f64]>,
    window: Box<[f64]>,
}

impl SincTables {
    #[expect(
        clippy::suboptimal_flops,
        clippy::cast_precision_loss,
        reason = "Rounding must match separate multiply and add"
    )]
    fn generate() -> Self {
        let len = SINC_SAMPLES + 1;
        let width = SINC_WIDTH as f64;
        let dx = width / SINC_SAMPLES as f64;
        let mut sinc = Vec::with_capacity(len);
        let mut window = Vec::with_capacity(len);
        let mut x: f64 = 0.0;
        for _ in 0..len {
            let y = x / width;
            window.push(0.408_97 + 0.5 * (PI * y).cos() + 0.091_03 * (2.0 * PI * y).cos());
            sinc.push(if x.abs() >= width {
                0.0
            } else if x.abs() < f64::EPSILON {
                1.0
            } else {
                (x * PI).sin() / (x * PI)
            });
            x += dx;
        }
        Self {
            sinc: sinc.into_boxed_slice(),
            window: window.into_boxed_slice(),
        }
    }
    /// The sinc and window tables, in that order
    #[cfg(feature = "testing")]
    #[must_use]
    pub fn inner(&self) -> (&[f64], &[f64]) {
        (&self.sinc, &self.window)
    }
}

static SINC_TABLES: OnceLock<SincTables> = OnceLock::new();

/// Build the sinc kernel tables if they haven't been built yet, and return them.
///
/// Safe to call from any thread, the tables are only ever built once.
pub fn ensure_tables_initialized() -> &'static SincTables {
    SINC_TABLES.get_or_init(SincTables::generate)
}

/// Reconstruct the sample at fraction `ratio` (`0.0..1.0`) between offsets 0 and 1 of `history`.
///
/// `increment` is the source samples advanced per output sample, which the sinc kernel uses
/// to lower its cutoff when down-sampling. [`Interpolation::None`] is treated as linear, the
/// channel reads nearest samples straight from the source.
#[must_use]
pub fn interpolate(kind: Interpolation, history: &RingBuffer, ratio: f64, increment: f64) -> i32 {
    match kind {
        Interpolation::None | Interpolation::Linear => linear(history, ratio),
        Interpolation::Lagrange4 => lagrange4(history, ratio),
        Interpolation::Lagrange6 => lagrange6(history, ratio),
        Interpolation::Sinc => sinc(history, ratio, increment),
    }
}

fn tap(history: &RingBuffer, offset: isize) -> f64 {
    f64::from(history.at(offset))
}

/// Difference of two samples, computed exactly before widening to float
fn diff(history: &RingBuffer, a: isize, b: isize) -> f64 {
    f64::from(i32::from(history.at(a)) - i32::from(history.at(b)))
}

fn sum(history: &RingBuffer, a: isize, b: isize) -> f64 {
    f64::from(i32::from(history.at(a)) + i32::from(history.at(b)))
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::suboptimal_flops,
    reason = "Rounding must match separate multiply and add"
)]
fn linear(history: &RingBuffer, ratio: f64) -> i32 {
    (tap(history, 0) + ratio * diff(history, 1, 0)) as i32
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::suboptimal_flops,
    reason = "Rounding must match separate multiply and add"
)]
fn lagrange4(history: &RingBuffer, ratio: f64) -> i32 {
    let c0 = tap(history, 0);
    let c1 = tap(history, 1) - 1.0 / 3.0 * tap(history, -1) - 0.5 * tap(history, 0)
        - 1.0 / 6.0 * tap(history, 2);
    let c2 = 0.5 * sum(history, -1, 1) - tap(history, 0);
    let c3 = 1.0 / 6.0 * diff(history, 2, -1) + 0.5 * diff(history, 0, 1);
    (((c3 * ratio + c2) * ratio + c1) * ratio + c0) as i32
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::suboptimal_flops,
    reason = "Rounding must match separate multiply and add"
)]
fn lagrange6(history: &RingBuffer, ratio: f64) -> i32 {
    // The polynomial is centred between the two middle taps
    let ratio = ratio - 0.5;
    let even1 = sum(history, -2, 3);
    let odd1 = diff(history, -2, 3);
    let even2 = sum(history, -1, 2);
    let odd2 = diff(history, -1, 2);
    let even3 = sum(history, 0, 1);
    let odd3 = diff(history, 0, 1);
    let c0 = 0.011_718_75 * even1 - 0.097_656_25 * even2 + 0.585_937_5 * even3;
    let c1 = 25.0 / 384.0 * odd2 - 1.171_875 * odd3 - 0.004_687_5 * odd1;
    let c2 = 0.406_25 * even2 - 17.0 / 48.0 * even3 - 5.0 / 96.0 * even1;
    let c3 = 1.0 / 48.0 * odd1 - 13.0 / 48.0 * odd2 + 17.0 / 24.0 * odd3;
    let c4 = 1.0 / 48.0 * even1 - 0.0625 * even2 + 1.0 / 24.0 * even3;
    let c5 = 1.0 / 24.0 * odd2 - 1.0 / 12.0 * odd3 - 1.0 / 120.0 * odd1;
    (((((c5 * ratio + c4) * ratio + c3) * ratio + c2) * ratio + c1) * ratio + c0) as i32
}

/// Weights of the sinc kernel for taps `-(SINC_WIDTH - 1)..=SINC_WIDTH`
fn sinc_weights(ratio: f64, increment: f64) -> ArrayVec<f64, { SINC_WIDTH * 2 }> {
    let (res, width) = (SINC_RESOLUTION.cast_signed(), SINC_WIDTH.cast_signed());
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        reason = "ratio is below 1"
    )]
    let shift = (ratio * SINC_RESOLUTION as f64).floor() as isize;
    let step = if increment > 1.0 {
        #[expect(
            clippy::cast_possible_truncation,
            clippy::cast_precision_loss,
            reason = "Quotient is below SINC_RESOLUTION"
        )]
        let step = (SINC_RESOLUTION as f64 / increment) as isize;
        step
    } else {
        res
    };
    let shift_adj = shift * step / res;
    let tables = ensure_tables_initialized();
    (1 - width..=width)
        .map(|tap| {
            tables.sinc[(shift_adj - tap * step).unsigned_abs()]
                * tables.window[(shift - tap * res).unsigned_abs()]
        })
        .collect()
}

#[expect(clippy::cast_possible_truncation, reason = "Saturating float to int cast")]
fn sinc(history: &RingBuffer, ratio: f64, increment: f64) -> i32 {
    let weights = sinc_weights(ratio, increment);
    // Summed from the newest tap down
    let weight_sum: f64 = weights.iter().rev().sum();
    let mut total = 0.0;
    let first = 1 - SINC_WIDTH.cast_signed();
    for (offset, weight) in (first..).zip(&weights) {
        total += tap(history, offset) * weight;
    }
    (total / weight_sum) as i32
}
