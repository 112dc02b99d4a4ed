use anyhow::ensure;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub type Data = SmallVec<[u8; 8]>;

/// One cycle's worth of payload on a streaming channel. `valid` is not a field: a channel carries
/// `Option<Beat>` and `Some` means valid.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Beat {
    pub data: Data,
    pub keep: u64,
    pub last: bool,
    pub id: u64,
    pub dest: u64,
    pub user: u64,
}

impl Beat {
    pub fn new(data: &[u8]) -> Self {
        Self {
            data: Data::from_slice(data),
            keep: byte_mask(data.len()),
            ..Self::default()
        }
    }

    /// Little-endian word of `bytes` bytes.
    pub fn from_word(word: u64, bytes: usize) -> Self {
        let data = (0..bytes)
            .map(|i| if i < 8 { (word >> (8 * i)) as u8 } else { 0 })
            .collect::<Data>();
        Self {
            data,
            keep: byte_mask(bytes),
            ..Self::default()
        }
    }

    /// Lowest eight data bytes as a little-endian word.
    pub fn word(&self) -> u64 {
        self.data
            .iter()
            .take(8)
            .enumerate()
            .fold(0u64, |acc, (i, b)| acc | ((*b as u64) << (8 * i)))
    }

    pub fn with_last(mut self, last: bool) -> Self {
        self.last = last;
        self
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    pub fn with_dest(mut self, dest: u64) -> Self {
        self.dest = dest;
        self
    }

    pub fn with_user(mut self, user: u64) -> Self {
        self.user = user;
        self
    }

    pub fn with_keep(mut self, keep: u64) -> Self {
        self.keep = keep;
        self
    }
}

pub fn byte_mask(bytes: usize) -> u64 {
    if bytes >= 64 {
        u64::MAX
    } else {
        (1u64 << bytes) - 1
    }
}

pub fn field_mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Field widths and enables of a channel. A tag width of 0 disables that field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatFormat {
    pub data_width: usize,
    pub keep_enable: bool,
    pub last_enable: bool,
    pub id_width: u32,
    pub dest_width: u32,
    pub user_width: u32,
}

impl Default for BeatFormat {
    fn default() -> Self {
        Self {
            data_width: 32,
            keep_enable: true,
            last_enable: true,
            id_width: 0,
            dest_width: 0,
            user_width: 0,
        }
    }
}

impl BeatFormat {
    pub fn with_data_width(mut self, data_width: usize) -> Self {
        self.data_width = data_width;
        self.keep_enable = data_width > 8;
        self
    }

    pub fn with_id_width(mut self, width: u32) -> Self {
        self.id_width = width;
        self
    }

    pub fn with_dest_width(mut self, width: u32) -> Self {
        self.dest_width = width;
        self
    }

    pub fn with_user_width(mut self, width: u32) -> Self {
        self.user_width = width;
        self
    }

    pub fn with_last_enable(mut self, enable: bool) -> Self {
        self.last_enable = enable;
        self
    }

    pub fn data_bytes(&self) -> usize {
        self.data_width / 8
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.data_width > 0 && self.data_width % 8 == 0 && self.data_width <= 512,
            "data width must be a multiple of 8 between 8 and 512, got {}",
            self.data_width
        );
        for (name, width) in [
            ("id", self.id_width),
            ("dest", self.dest_width),
            ("user", self.user_width),
        ] {
            ensure!(width <= 64, "{} width must be at most 64, got {}", name, width);
        }
        Ok(())
    }

    /// Apply the width/enable rules every component output obeys.
    pub fn conform(&self, beat: &Beat) -> Beat {
        let bytes = self.data_bytes();
        let mut data = beat.data.clone();
        data.resize(bytes, 0);
        Beat {
            data,
            keep: if self.keep_enable {
                beat.keep & byte_mask(bytes)
            } else {
                byte_mask(bytes)
            },
            last: !self.last_enable || beat.last,
            id: beat.id & field_mask(self.id_width),
            dest: beat.dest & field_mask(self.dest_width),
            user: beat.user & field_mask(self.user_width),
        }
    }
}

/// Sideband marker identifying a bad frame from its final beat's `user` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BadFrameMarker {
    pub value: u64,
    pub mask: u64,
}

impl Default for BadFrameMarker {
    fn default() -> Self {
        Self { value: 1, mask: 1 }
    }
}

impl BadFrameMarker {
    pub fn is_bad(&self, beat: &Beat) -> bool {
        (beat.user & self.mask) == (self.value & self.mask)
    }
}
