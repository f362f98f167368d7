use {
    crate::result::{SourceError, SourceResult},
    std::sync::Arc,
};

/// Decoded sample data a channel plays from, with its loop region
///
/// Cloning is cheap, the sample data is shared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleSource {
    data: Arc<[i16]>,
    loop_start: u32,
    loop_len: u32,
}

impl SampleSource {
    /// Create a source from 16 bit samples.
    ///
    /// The loop region is `loop_start..loop_start + loop_len`, and must lie within `data`.
    pub fn new(data: impl Into<Arc<[i16]>>, loop_start: u32, loop_len: u32) -> SourceResult<Self> {
        let data = data.into();
        if data.is_empty() {
            return Err(SourceError::Empty);
        }
        let total = data.len();
        if u32::try_from(total).is_err() {
            return Err(SourceError::TooLong(total));
        }
        let fits = loop_start
            .checked_add(loop_len)
            .is_some_and(|end| end as usize <= total);
        if !fits {
            return Err(SourceError::LoopOutOfBounds {
                start: loop_start,
                len: loop_len,
                total,
            });
        }
        Ok(Self {
            data,
            loop_start,
            loop_len,
        })
    }
    /// Create a source from signed 8 bit PCM, scaled up to 16 bits
    pub fn from_pcm8(bytes: &[u8], loop_start: u32, loop_len: u32) -> SourceResult<Self> {
        let samples: &[i8] = bytemuck::cast_slice(bytes);
        let data: Arc<[i16]> = samples.iter().map(|&s| i16::from(s) << 8).collect();
        Self::new(data, loop_start, loop_len)
    }
    /// Create a source from signed little endian 16 bit PCM
    pub fn from_pcm16_le(bytes: &[u8], loop_start: u32, loop_len: u32) -> SourceResult<Self> {
        if bytes.len() % 2 != 0 {
            return Err(SourceError::OddPcm16Length(bytes.len()));
        }
        let samples: Vec<i16> = bytemuck::pod_collect_to_vec(bytes);
        Self::new(samples, loop_start, loop_len)
    }
    /// The decoded samples
    #[must_use]
    pub fn data(&self) -> &[i16] {
        &self.data
    }
    /// First sample of the loop region
    #[must_use]
    pub const fn loop_start(&self) -> u32 {
        self.loop_start
    }
    /// Number of samples in the loop region
    #[must_use]
    pub const fn loop_len(&self) -> u32 {
        self.loop_len
    }
    /// Number of samples the hardware plays before wrapping or stopping
    #[must_use]
    pub const fn total_len(&self) -> u32 {
        self.loop_start + self.loop_len
    }
    /// Sample at `idx`, or silence past the end of the data
    #[must_use]
    pub fn get(&self, idx: u32) -> i16 {
        self.data.get(idx as usize).copied().unwrap_or(0)
    }
}
