//! Index algebra for the bitonic network over a square grid.
//!
//! A buffer of `side * side` values is addressed linearly; the 2D coordinate
//! only exists to match the dispatch shape of the compute surface.

use serde::Serialize;

use crate::error::SortError;

/// Grid dimensions derived from a size exponent `k`: `side = 2^k`,
/// `side^2` elements, `size_n = 2k` network levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridSize {
    exponent: u32,
}

impl GridSize {
    /// Validates `exponent` against the backend's largest addressable grid.
    pub fn from_exponent(exponent: i64, max_exponent: u32) -> Result<Self, SortError> {
        if exponent < 0 {
            return Err(SortError::Configuration(format!(
                "size exponent must be non-negative, got {exponent}"
            )));
        }
        if exponent > i64::from(max_exponent) {
            return Err(SortError::Configuration(format!(
                "size exponent {exponent} exceeds backend maximum {max_exponent}"
            )));
        }
        Ok(Self {
            exponent: exponent as u32,
        })
    }

    pub fn exponent(self) -> u32 {
        self.exponent
    }

    /// Side length of the square grid.
    pub fn side(self) -> u32 {
        1 << self.exponent
    }

    pub fn element_count(self) -> usize {
        1usize << (2 * self.exponent)
    }

    /// Number of merge levels, `log2(element_count)`.
    pub fn size_n(self) -> u32 {
        2 * self.exponent
    }

    pub fn total_passes(self) -> u64 {
        let n = u64::from(self.size_n());
        n * (n + 1) / 2
    }

    pub fn to_coord(self, index: u32) -> (u32, u32) {
        let side = self.side();
        (index % side, index / side)
    }

    pub fn to_index(self, (x, y): (u32, u32)) -> u32 {
        x + y * self.side()
    }

    pub fn first_pass(self) -> Option<PassDescriptor> {
        (self.size_n() > 0).then_some(PassDescriptor {
            block_step: 0,
            sub_block_step: 0,
        })
    }

    /// The full network in execution order. Reordering breaks the sort.
    pub fn passes(self) -> Passes {
        Passes {
            size_n: self.size_n(),
            next: self.first_pass(),
        }
    }
}

/// One pass of the network: `block_step` picks the merge level,
/// `sub_block_step` the comparison distance within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PassDescriptor {
    block_step: u32,
    sub_block_step: u32,
}

/// The comparison an element performs in one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pairing {
    pub partner: u32,
    /// Whether the lower index of the pair should end up holding the minimum,
    /// seen from this element (flipped for the upper element of the pair).
    pub ascending: bool,
}

impl PassDescriptor {
    /// Returns `None` unless `sub_block_step <= block_step`.
    pub fn new(block_step: u32, sub_block_step: u32) -> Option<Self> {
        (sub_block_step <= block_step).then_some(Self {
            block_step,
            sub_block_step,
        })
    }

    pub fn block_step(self) -> u32 {
        self.block_step
    }

    pub fn sub_block_step(self) -> u32 {
        self.sub_block_step
    }

    /// Distance between the two elements of every compared pair.
    pub fn distance(self) -> u32 {
        1 << (self.block_step - self.sub_block_step)
    }

    pub fn pairing(self, index: u32) -> Pairing {
        let d = self.distance();
        let ascending = ((index >> self.block_step) & 2) == 0;
        if index & d == 0 {
            Pairing {
                partner: index | d,
                ascending,
            }
        } else {
            Pairing {
                partner: index & !d,
                ascending: !ascending,
            }
        }
    }

    /// The pass that follows this one, or `None` after the last level.
    pub fn next(self, size_n: u32) -> Option<Self> {
        if self.sub_block_step < self.block_step {
            Some(Self {
                block_step: self.block_step,
                sub_block_step: self.sub_block_step + 1,
            })
        } else if self.block_step + 1 < size_n {
            Some(Self {
                block_step: self.block_step + 1,
                sub_block_step: 0,
            })
        } else {
            None
        }
    }
}

/// Iterator over the network's passes, see [`GridSize::passes`].
#[derive(Debug, Clone)]
pub struct Passes {
    size_n: u32,
    next: Option<PassDescriptor>,
}

impl Iterator for Passes {
    type Item = PassDescriptor;

    fn next(&mut self) -> Option<PassDescriptor> {
        let current = self.next?;
        self.next = current.next(self.size_n);
        Some(current)
    }
}
