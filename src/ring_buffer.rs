use crate::interpolation::SINC_WIDTH;

/// Number of samples of history kept around the read position
pub const HISTORY_LEN: usize = 2 * SINC_WIDTH + 1;

/// Sliding window over the source samples around a channel's read position
///
/// Offsets are relative to the integer read position: offset 0 is the sample at the read
/// position, `SINC_WIDTH` is the newest sample pushed, and `-SINC_WIDTH` the oldest one kept.
#[derive(Clone, Debug)]
pub struct RingBuffer {
    /// Each sample is written twice, `HISTORY_LEN` apart, so the window is always contiguous
    buf: [i16; HISTORY_LEN * 2],
    /// Next slot to write, which is also where the oldest sample lives
    head: usize,
    pushed: u64,
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self {
            buf: [0; HISTORY_LEN * 2],
            head: 0,
            pushed: 0,
        }
    }
}

impl RingBuffer {
    /// Fill the window with silence
    pub fn clear(&mut self) {
        *self = Self::default();
    }
    /// Push a new sample, dropping the oldest one
    pub const fn push(&mut self, sample: i16) {
        self.buf[self.head] = sample;
        self.buf[self.head + HISTORY_LEN] = sample;
        self.head += 1;
        if self.head == HISTORY_LEN {
            self.head = 0;
        }
        self.pushed += 1;
    }
    /// Push samples in order
    pub fn push_slice(&mut self, samples: &[i16]) {
        for &sample in samples {
            self.push(sample);
        }
    }
    /// The whole window, oldest sample first
    #[must_use]
    pub fn window(&self) -> &[i16] {
        &self.buf[self.head..self.head + HISTORY_LEN]
    }
    /// Sample at `offset` (`-SINC_WIDTH..=SINC_WIDTH`) relative to the read position
    ///
    /// # Panics
    ///
    /// Panics if `offset` is outside of the window.
    #[must_use]
    pub fn at(&self, offset: isize) -> i16 {
        let width = SINC_WIDTH.cast_signed();
        assert!((-width..=width).contains(&offset), "offset {offset} outside window");
        self.window()[(offset + width).cast_unsigned()]
    }
    /// Number of samples pushed since the last [`clear`](Self::clear)
    #[must_use]
    pub const fn pushed(&self) -> u64 {
        self.pushed
    }
}

#[test]
fn test_offsets() {
    let mut ring = RingBuffer::default();
    let samples: Vec<i16> = (1..=20).collect();
    ring.push_slice(&samples);
    assert_eq!(ring.pushed(), 20);
    assert_eq!(ring.at(8), 20);
    assert_eq!(ring.at(0), 12);
    assert_eq!(ring.at(-8), 4);
    assert_eq!(ring.window(), &samples[3..]);
    ring.push(21);
    assert_eq!(ring.at(8), 21);
    assert_eq!(ring.at(-8), 5);
    ring.clear();
    assert_eq!(ring.pushed(), 0);
    assert!(ring.window().iter().all(|&s| s == 0));
}
