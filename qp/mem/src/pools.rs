//! Fixed-block pool
//!
//! `QMPool<B, N>` owns `N` blocks of `B` payload bytes. Free blocks are
//! threaded into a singly linked list through an index table, so `get` and
//! `put` only touch the list head.

use core::cell::RefCell;

use critical_section::Mutex;
use qp_core::{on_fatal_error, QEvtStore, QSignal};

use crate::QPoolStats;

/// End-of-list marker in the free-list links
const NIL: u16 = u16::MAX;

#[derive(Clone, Copy)]
struct BlockHdr {
    sig: QSignal,
    ref_ctr: u8,
    len: u16,
}

impl BlockHdr {
    const FREE: Self = Self {
        sig: QSignal(0),
        ref_ctr: 0,
        len: 0,
    };
}

struct PoolInner<const B: usize, const N: usize> {
    blocks: [[u8; B]; N],
    hdrs: [BlockHdr; N],
    next: [u16; N],
    free_head: u16,
    stats: QPoolStats,
}

enum Take {
    Block(u16),
    Rejected,
    Exhausted,
}

impl<const B: usize, const N: usize> PoolInner<B, N> {
    const fn new() -> Self {
        assert!(N > 0 && N < NIL as usize, "pool size must fit the free-list index");
        let mut next = [NIL; N];
        let mut i = 0;
        while i + 1 < N {
            next[i] = (i + 1) as u16;
            i += 1;
        }
        Self {
            blocks: [[0; B]; N],
            hdrs: [BlockHdr::FREE; N],
            next,
            free_head: 0,
            stats: QPoolStats::new(N as u16),
        }
    }

    fn take(&mut self, margin: Option<u16>) -> Take {
        let available = match margin {
            Some(margin) => self.stats.free_blocks > margin,
            None => self.stats.free_blocks > 0,
        };
        if !available {
            return match margin {
                Some(_) => Take::Rejected,
                None => Take::Exhausted,
            };
        }
        let block = self.free_head;
        self.free_head = self.next[block as usize];
        self.next[block as usize] = NIL;
        self.blocks[block as usize] = [0; B];
        self.stats.on_alloc();
        Take::Block(block)
    }

    /// Thread `block` back onto the list head. False when the block is out of
    /// range or the pool is already full.
    fn give(&mut self, block: u16) -> bool {
        if block as usize >= N || self.stats.free_blocks as usize >= N {
            return false;
        }
        self.hdrs[block as usize] = BlockHdr::FREE;
        self.next[block as usize] = self.free_head;
        self.free_head = block;
        self.stats.on_dealloc();
        true
    }
}

/// Pool of `N` fixed-size blocks of `B` bytes each
pub struct QMPool<const B: usize, const N: usize> {
    inner: Mutex<RefCell<PoolInner<B, N>>>,
}

impl<const B: usize, const N: usize> QMPool<B, N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(PoolInner::new())),
        }
    }

    /// Take a zeroed block.
    ///
    /// With `Some(margin)` the call returns `None` instead of leaving fewer
    /// than `margin` free blocks. Without a margin an empty pool is fatal.
    pub fn get(&self, margin: Option<u16>) -> Option<u16> {
        let taken = critical_section::with(|cs| self.inner.borrow_ref_mut(cs).take(margin));
        match taken {
            Take::Block(block) => Some(block),
            Take::Rejected => {
                log::warn!("pool of {}B blocks below margin {:?}", B, margin);
                None
            }
            Take::Exhausted => on_fatal_error(module_path!(), 200),
        }
    }

    /// Return `block` to the free list
    pub fn put(&self, block: u16) {
        let ok = critical_section::with(|cs| self.inner.borrow_ref_mut(cs).give(block));
        if !ok {
            on_fatal_error(module_path!(), 210);
        }
    }

    /// Run `f` over the bytes of a block in use
    pub fn with_block<R>(&self, block: u16, f: impl FnOnce(&mut [u8; B]) -> R) -> R {
        if block as usize >= N {
            on_fatal_error(module_path!(), 220);
        }
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs).blocks[block as usize]))
    }

    pub fn stats(&self) -> QPoolStats {
        critical_section::with(|cs| self.inner.borrow_ref(cs).stats)
    }

    pub const fn block_size(&self) -> usize {
        B
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const B: usize, const N: usize> Default for QMPool<B, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const B: usize, const N: usize> QEvtStore for QMPool<B, N> {
    fn block_size(&self) -> usize {
        B
    }

    fn alloc(&self, sig: QSignal, payload: &[u8], margin: Option<u16>) -> Option<u16> {
        if payload.len() > B {
            on_fatal_error(module_path!(), 230);
        }
        let taken = critical_section::with(|cs| {
            let mut pool = self.inner.borrow_ref_mut(cs);
            let taken = pool.take(margin);
            if let Take::Block(block) = taken {
                let i = block as usize;
                pool.blocks[i][..payload.len()].copy_from_slice(payload);
                pool.hdrs[i] = BlockHdr {
                    sig,
                    ref_ctr: 1,
                    len: payload.len() as u16,
                };
            }
            taken
        });
        match taken {
            Take::Block(block) => Some(block),
            Take::Rejected => {
                log::warn!("event pool of {}B blocks below margin {:?}", B, margin);
                None
            }
            Take::Exhausted => on_fatal_error(module_path!(), 240),
        }
    }

    fn retain(&self, block: u16) -> u8 {
        let count = critical_section::with(|cs| {
            let mut pool = self.inner.borrow_ref_mut(cs);
            let hdr = pool.hdrs.get_mut(block as usize)?;
            if hdr.ref_ctr == 0 || hdr.ref_ctr == u8::MAX {
                return None;
            }
            hdr.ref_ctr += 1;
            Some(hdr.ref_ctr)
        });
        match count {
            Some(count) => count,
            None => on_fatal_error(module_path!(), 250),
        }
    }

    fn release(&self, block: u16) -> u8 {
        let count = critical_section::with(|cs| {
            let mut pool = self.inner.borrow_ref_mut(cs);
            let hdr = pool.hdrs.get_mut(block as usize)?;
            if hdr.ref_ctr == 0 {
                return None;
            }
            hdr.ref_ctr -= 1;
            let count = hdr.ref_ctr;
            if count == 0 && !pool.give(block) {
                return None;
            }
            Some(count)
        });
        match count {
            Some(count) => count,
            None => on_fatal_error(module_path!(), 260),
        }
    }

    fn ref_ctr(&self, block: u16) -> u8 {
        critical_section::with(|cs| {
            self.inner
                .borrow_ref(cs)
                .hdrs
                .get(block as usize)
                .map_or(0, |hdr| hdr.ref_ctr)
        })
    }

    fn read(&self, block: u16, f: &mut dyn FnMut(&[u8])) {
        critical_section::with(|cs| {
            let pool = self.inner.borrow_ref(cs);
            if let Some(hdr) = pool.hdrs.get(block as usize) {
                f(&pool.blocks[block as usize][..hdr.len as usize]);
            }
        })
    }

    fn n_free(&self) -> u16 {
        self.stats().free_blocks
    }

    fn n_min(&self) -> u16 {
        self.stats().min_free_blocks
    }

    fn n_tot(&self) -> u16 {
        N as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_put_restores_free_count() {
        let pool: QMPool<8, 4> = QMPool::new();
        let a = pool.get(None).unwrap();
        let b = pool.get(None).unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.stats().free_blocks, 2);

        pool.put(a);
        pool.put(b);
        assert_eq!(pool.stats().free_blocks, 4);
        assert_eq!(pool.stats().min_free_blocks, 2);
    }

    #[test]
    fn test_freelist_is_lifo() {
        let pool: QMPool<8, 4> = QMPool::new();
        let a = pool.get(None).unwrap();
        pool.put(a);
        assert_eq!(pool.get(None), Some(a));
    }

    #[test]
    fn test_margin_rejects() {
        let pool: QMPool<8, 3> = QMPool::new();
        assert!(pool.get(Some(1)).is_some());
        assert!(pool.get(Some(1)).is_some());
        // one block left, margin 1 must keep it
        assert!(pool.get(Some(1)).is_none());
        assert!(pool.get(Some(0)).is_some());
    }

    #[test]
    fn test_blocks_are_zeroed() {
        let pool: QMPool<4, 1> = QMPool::new();
        let block = pool.get(None).unwrap();
        pool.with_block(block, |bytes| bytes.copy_from_slice(&[9; 4]));
        pool.put(block);
        let block = pool.get(None).unwrap();
        assert_eq!(pool.with_block(block, |bytes| *bytes), [0; 4]);
    }

    #[test]
    #[should_panic(expected = "fatal error")]
    fn test_exhaustion_without_margin_is_fatal() {
        let pool: QMPool<8, 1> = QMPool::new();
        let _ = pool.get(None);
        let _ = pool.get(None);
    }

    #[test]
    #[should_panic(expected = "fatal error")]
    fn test_put_into_full_pool_is_fatal() {
        let pool: QMPool<8, 2> = QMPool::new();
        pool.put(0);
    }
}
