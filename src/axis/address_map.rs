use anyhow::ensure;
use serde::{Deserialize, Serialize};

use crate::base::beat::field_mask;

/// Inclusive `dest` range owned by one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRange {
    pub base: u64,
    pub top: u64,
}

impl AddressRange {
    pub fn new(base: u64, top: u64) -> Self {
        Self { base, top }
    }

    pub fn contains(&self, dest: u64) -> bool {
        self.base <= dest && dest <= self.top
    }

    pub fn overlaps(&self, other: &AddressRange) -> bool {
        self.base <= other.top && other.base <= self.top
    }
}

/// Maps a `dest` value to an output index. Ranges may overlap; the first match wins, so the lowest
/// output index takes any shared addresses.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AddressMap {
    pub ranges: Vec<AddressRange>,
}

impl AddressMap {
    pub fn new(ranges: Vec<AddressRange>) -> Self {
        Self { ranges }
    }

    /// Build from parallel `m_base`/`m_top` vectors.
    pub fn from_bounds(m_base: &[u64], m_top: &[u64]) -> anyhow::Result<Self> {
        ensure!(
            m_base.len() == m_top.len(),
            "m_base has {} entries but m_top has {}",
            m_base.len(),
            m_top.len()
        );
        Ok(Self::new(
            m_base
                .iter()
                .zip(m_top)
                .map(|(&base, &top)| AddressRange::new(base, top))
                .collect(),
        ))
    }

    /// Split the `dest` space evenly across `m_count` outputs.
    pub fn partitioned(m_count: usize, dest_width: u32) -> Self {
        let space = field_mask(dest_width) as u128 + 1;
        let span = (space / m_count.max(1) as u128).max(1);
        let ranges = (0..m_count as u128)
            .map(|i| {
                let base = (i * span).min(space - 1);
                let top = if i + 1 == m_count as u128 {
                    space - 1
                } else {
                    ((i + 1) * span - 1).min(space - 1)
                };
                AddressRange::new(base as u64, top as u64)
            })
            .collect();
        Self::new(ranges)
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn route(&self, dest: u64) -> Option<usize> {
        self.ranges.iter().position(|r| r.contains(dest))
    }

    /// Pairs of outputs whose ranges share addresses.
    pub fn overlaps(&self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for (i, a) in self.ranges.iter().enumerate() {
            for (j, b) in self.ranges.iter().enumerate().skip(i + 1) {
                if a.overlaps(b) {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }

    pub fn validate(&self, m_count: usize, dest_width: u32) -> anyhow::Result<()> {
        ensure!(
            self.ranges.len() == m_count,
            "address map has {} ranges for {} outputs",
            self.ranges.len(),
            m_count
        );
        let limit = field_mask(dest_width);
        for (i, r) in self.ranges.iter().enumerate() {
            ensure!(r.base <= r.top, "output {}: m_base {} > m_top {}", i, r.base, r.top);
            ensure!(
                r.top <= limit,
                "output {}: m_top {} exceeds dest width {}",
                i,
                r.top,
                dest_width
            );
        }
        Ok(())
    }
}
