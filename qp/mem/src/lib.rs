#![no_std]
#![forbid(unsafe_code)]

//! # QP Memory Management
//!
//! Fixed-block pools with constant-time get/put. Pools double as event
//! stores: [`QMPool`] implements [`qp_core::QEvtStore`], so the framework can
//! hand out reference-counted event handles backed by its blocks.

pub mod pools;

pub use pools::*;

/// Memory pool statistics for debugging and capacity planning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QPoolStats {
    /// Total number of blocks in the pool
    pub total_blocks: u16,
    /// Number of free blocks currently available
    pub free_blocks: u16,
    /// Number of blocks currently in use
    pub used_blocks: u16,
    /// Minimum number of free blocks ever reached
    pub min_free_blocks: u16,
}

impl QPoolStats {
    /// Create new pool statistics
    pub const fn new(total_blocks: u16) -> Self {
        Self {
            total_blocks,
            free_blocks: total_blocks,
            used_blocks: 0,
            min_free_blocks: total_blocks,
        }
    }

    /// Update statistics after allocation
    pub fn on_alloc(&mut self) {
        self.used_blocks += 1;
        self.free_blocks -= 1;
        if self.free_blocks < self.min_free_blocks {
            self.min_free_blocks = self.free_blocks;
        }
    }

    /// Update statistics after deallocation
    pub fn on_dealloc(&mut self) {
        if self.used_blocks > 0 {
            self.used_blocks -= 1;
            self.free_blocks += 1;
        }
    }

    /// Check if every block is in use
    pub const fn is_exhausted(&self) -> bool {
        self.free_blocks == 0
    }

    /// Check if every block is free
    pub const fn is_idle(&self) -> bool {
        self.used_blocks == 0
    }

    /// Get utilization as a percentage (0-100)
    pub fn utilization(&self) -> u8 {
        if self.total_blocks == 0 {
            0
        } else {
            ((self.used_blocks as u32 * 100) / self.total_blocks as u32) as u8
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for QPoolStats {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "QPoolStats{{ total: {}, free: {}, used: {}, min_free: {} }}",
            self.total_blocks,
            self.free_blocks,
            self.used_blocks,
            self.min_free_blocks
        );
    }
}
