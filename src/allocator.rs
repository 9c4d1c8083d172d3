//! The `Allocator`: bin-segregated free lists over a single contiguous
//! range, tying together the size classifier ([`crate::bins`]), the bin
//! index, and the node pool ([`crate::node`]).

use crate::bins::{float_round_down, float_round_up, BinIndex};
use crate::node::{NodePool, NODE_UNUSED};

/// Sentinel returned in both fields of an [`Allocation`] on failure: either
/// the node pool is exhausted, or no free region satisfies the request
/// after rounding. Both failure modes are indistinguishable from the
/// return value alone; compare the request against [`Allocator::free_storage`]
/// or [`Allocator::storage_report`] to tell them apart.
pub const NO_SPACE: u32 = u32::MAX;

/// A previously-granted region, or a failed request if [`Allocation::is_none`].
///
/// `metadata` is an opaque node id. Treat it as such — it must be handed
/// back to [`Allocator::free`] unmodified and is meaningless on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub offset: u32,
    pub metadata: u32,
}

impl Allocation {
    /// The sentinel value returned by a failed `allocate`.
    pub const NONE: Allocation = Allocation { offset: NO_SPACE, metadata: NO_SPACE };

    #[inline]
    pub fn is_none(&self) -> bool {
        self.offset == NO_SPACE
    }

    #[inline]
    pub fn is_some(&self) -> bool {
        !self.is_none()
    }
}

/// Aggregate, read-only statistics over the allocator's free storage.
///
/// This is a summary, not a dump: it reports totals, not the node graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageReport {
    /// Sum of the sizes of every currently free region.
    pub total_free_space: u32,
    /// A lower-bound estimate of the largest contiguous free region: the
    /// concrete size represented by the highest occupied bin. Because bins
    /// are entered by [`float_round_down`], the true largest free region is
    /// at least this large, possibly more.
    pub largest_free_region_estimate: u32,
}

/// A sub-allocator over `[0, size)` indivisible units.
///
/// See the crate documentation for the overall model. `Allocator` owns no
/// backing memory of its own — it only returns offsets for the caller to
/// index into whatever resource they're sub-allocating.
#[derive(Debug)]
pub struct Allocator {
    size: u32,
    max_allocs: u32,
    free_storage: u32,
    bins: BinIndex,
    pool: NodePool,
}

impl Allocator {
    /// Construct an allocator managing `size` units with room for
    /// `max_allocs` simultaneously tracked free regions plus live
    /// allocations.
    ///
    /// # Panics
    /// Panics if `size` or `max_allocs` is zero — both are programmer
    /// errors, not recoverable runtime conditions, the same way the
    /// reference implementation treats a zero arena size.
    pub fn new(size: u32, max_allocs: u32) -> Self {
        assert!(size != 0, "size must be non-zero");
        assert!(max_allocs != 0, "max_allocs must be non-zero");

        let mut allocator = Self {
            size,
            max_allocs,
            free_storage: 0,
            bins: BinIndex::new(),
            pool: NodePool::new(max_allocs),
        };
        allocator.reset_state();
        allocator
    }

    /// Reinitialize to the single-root-region state, as if freshly
    /// constructed with the same `size`/`max_allocs`.
    pub fn reset(&mut self) {
        self.bins = BinIndex::new();
        self.pool = NodePool::new(self.max_allocs);
        self.reset_state();
    }

    fn reset_state(&mut self) {
        self.free_storage = 0;
        self.insert_node_into_bin(self.size, 0);
    }

    /// Total units currently held in free regions (not live allocations).
    #[inline]
    pub fn free_storage(&self) -> u32 {
        self.free_storage
    }

    /// The total managed range.
    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Summarize current free storage without mutating state.
    pub fn storage_report(&self) -> StorageReport {
        let largest_free_region_estimate = self
            .bins
            .highest_occupied_bin()
            .map(crate::bins::float_to_uint)
            .unwrap_or(0);

        StorageReport {
            total_free_space: self.free_storage,
            largest_free_region_estimate,
        }
    }

    /// Allocate a region of `size` units.
    ///
    /// Returns [`Allocation::NONE`] if the node pool is exhausted or no
    /// free region (after rounding) satisfies the request.
    ///
    /// `size` must be non-zero; this is a debug-time assertion, not part
    /// of the release contract (see the crate's error-handling design:
    /// preconditions are caller responsibilities, not recoverable errors).
    pub fn allocate(&mut self, size: u32) -> Allocation {
        debug_assert!(size != 0, "cannot allocate a zero-size region");

        // Reserve a slot up front for a potential split remainder: this
        // keeps the capacity check O(1) at the cost of occasionally
        // failing a request that would have exactly filled its bin with
        // no remainder. See the open question in DESIGN.md.
        if self.pool.is_exhausted() {
            return Allocation::NONE;
        }

        let min_bin = float_round_up(size);
        let bin = match self.bins.find_smallest_bin_ge(min_bin) {
            Some(bin) => bin,
            None => return Allocation::NONE,
        };

        let node_id = self.bins.head(bin as usize);
        let next = self.pool.get(node_id).bin_next;
        if next != NODE_UNUSED {
            self.pool.get_mut(next).bin_prev = NODE_UNUSED;
        }
        self.bins.set_head(bin as usize, next);

        let node = self.pool.get_mut(node_id);
        let total_size = node.size;
        node.used = true;
        node.size = size;
        node.bin_prev = NODE_UNUSED;
        node.bin_next = NODE_UNUSED;
        self.free_storage -= total_size;

        let remainder = total_size - size;
        if remainder > 0 {
            let offset = self.pool.get(node_id).offset;
            let neighbor_next = self.pool.get(node_id).neighbor_next;

            let remainder_id = self.insert_node_into_bin(remainder, offset + size);

            self.pool.get_mut(remainder_id).neighbor_prev = node_id;
            self.pool.get_mut(remainder_id).neighbor_next = neighbor_next;
            if neighbor_next != NODE_UNUSED {
                self.pool.get_mut(neighbor_next).neighbor_prev = remainder_id;
            }
            self.pool.get_mut(node_id).neighbor_next = remainder_id;
        }

        Allocation { offset: self.pool.get(node_id).offset, metadata: node_id }
    }

    /// Release a previously granted allocation, coalescing with any free
    /// physical neighbors.
    ///
    /// # Panics (debug only)
    /// Debug-asserts against `allocation.metadata == NO_SPACE` (freeing a
    /// failed allocation) and against double-free. Both are undefined
    /// behavior in release builds, as with the reference implementation —
    /// this is not part of the recoverable error surface.
    pub fn free(&mut self, allocation: Allocation) {
        debug_assert!(allocation.metadata != NO_SPACE, "freeing a failed allocation");

        let node_id = allocation.metadata;
        debug_assert!(self.pool.get(node_id).used, "double free");

        let mut offset = self.pool.get(node_id).offset;
        let mut size = self.pool.get(node_id).size;
        let mut neighbor_prev = self.pool.get(node_id).neighbor_prev;
        let mut neighbor_next = self.pool.get(node_id).neighbor_next;

        if neighbor_prev != NODE_UNUSED && !self.pool.get(neighbor_prev).used {
            let prev_id = neighbor_prev;
            offset = self.pool.get(prev_id).offset;
            size += self.pool.get(prev_id).size;
            self.remove_node_from_bin(prev_id);
            debug_assert_eq!(self.pool.get(prev_id).neighbor_next, node_id);
            neighbor_prev = self.pool.get(prev_id).neighbor_prev;
        }

        if neighbor_next != NODE_UNUSED && !self.pool.get(neighbor_next).used {
            let next_id = neighbor_next;
            size += self.pool.get(next_id).size;
            self.remove_node_from_bin(next_id);
            debug_assert_eq!(self.pool.get(next_id).neighbor_prev, node_id);
            neighbor_next = self.pool.get(next_id).neighbor_next;
        }

        self.pool.release(node_id);

        let combined_id = self.insert_node_into_bin(size, offset);

        if neighbor_next != NODE_UNUSED {
            self.pool.get_mut(combined_id).neighbor_next = neighbor_next;
            self.pool.get_mut(neighbor_next).neighbor_prev = combined_id;
        }
        if neighbor_prev != NODE_UNUSED {
            self.pool.get_mut(combined_id).neighbor_prev = neighbor_prev;
            self.pool.get_mut(neighbor_prev).neighbor_next = combined_id;
        }
    }

    /// Draw a node from the pool, populate it as a free region of `size`
    /// at `offset`, and splice it into the head of its bin's free list.
    ///
    /// Does not touch `neighbor_prev`/`neighbor_next`: callers (`allocate`'s
    /// split and `free`'s reinsert) stitch physical adjacency in afterward,
    /// since the correct links depend on context this function doesn't have.
    fn insert_node_into_bin(&mut self, size: u32, offset: u32) -> u32 {
        let bin = float_round_down(size) as usize;
        let old_head = self.bins.head(bin);

        let node_id = self.pool.take();
        *self.pool.get_mut(node_id) = crate::node::Node {
            offset,
            size,
            bin_prev: NODE_UNUSED,
            bin_next: old_head,
            neighbor_prev: NODE_UNUSED,
            neighbor_next: NODE_UNUSED,
            used: false,
        };

        if old_head != NODE_UNUSED {
            self.pool.get_mut(old_head).bin_prev = node_id;
        }
        self.bins.set_head(bin, node_id);
        self.free_storage += size;

        node_id
    }

    /// Detach `node_id` from whichever bin it currently occupies and
    /// return its slot to the pool.
    fn remove_node_from_bin(&mut self, node_id: u32) {
        let (bin_prev, bin_next, size) = {
            let node = self.pool.get(node_id);
            (node.bin_prev, node.bin_next, node.size)
        };

        if bin_prev != NODE_UNUSED {
            self.pool.get_mut(bin_prev).bin_next = bin_next;
            if bin_next != NODE_UNUSED {
                self.pool.get_mut(bin_next).bin_prev = bin_prev;
            }
        } else {
            let bin = float_round_down(size) as usize;
            if bin_next != NODE_UNUSED {
                self.pool.get_mut(bin_next).bin_prev = NODE_UNUSED;
            }
            self.bins.set_head(bin, bin_next);
        }

        self.pool.release(node_id);
        self.free_storage -= size;
    }

    /// Walk the whole node graph and re-derive every invariant from
    /// scratch, panicking on the first violation.
    ///
    /// Test-only: O(`max_allocs`) and uses private node fields directly,
    /// so it belongs beside the structure it's checking rather than behind
    /// the public API.
    #[cfg(test)]
    fn validate_invariants(&self) {
        // Invariant 7: free-slot stack disjoint from live ids, right size.
        let live_ids: alloc::vec::Vec<u32> =
            (0..self.pool.capacity()).filter(|&id| !self.pool.is_free_slot(id)).collect();
        assert_eq!(live_ids.len() as u32 + self.pool.free_slot_count() as u32, self.pool.capacity());

        // Invariant 2 + 3: every live free node sits in exactly the bin
        // `float_round_down(size)` names, and nowhere else.
        for &id in &live_ids {
            let node = self.pool.get(id);
            if !node.used {
                let bin = float_round_down(node.size) as usize;
                let mut cursor = self.bins.head(bin);
                let mut found = false;
                while cursor != NODE_UNUSED {
                    if cursor == id {
                        found = true;
                        break;
                    }
                    cursor = self.pool.get(cursor).bin_next;
                }
                assert!(found, "free node {id} (size {}) missing from bin {bin}", node.size);
            } else {
                assert_eq!(node.bin_prev, NODE_UNUSED, "live node {id} has a dangling bin_prev");
                assert_eq!(node.bin_next, NODE_UNUSED, "live node {id} has a dangling bin_next");
            }
        }

        // Invariant 1 + 5 + 6: the physical-adjacency chain is a total,
        // gap-free, overlap-free order over [0, size), no two adjacent
        // nodes are both free, and free_storage matches the free nodes
        // actually present in it.
        let start = live_ids
            .iter()
            .copied()
            .find(|&id| self.pool.get(id).neighbor_prev == NODE_UNUSED)
            .expect("no node starts the physical chain");

        let mut offset = 0u32;
        let mut visited = 0u32;
        let mut free_total = 0u32;
        let mut cursor = start;
        let mut prev_was_free = false;
        loop {
            let node = self.pool.get(cursor);
            assert_eq!(node.offset, offset, "gap or overlap before node {cursor}");
            assert!(!node.used || node.bin_prev == NODE_UNUSED);
            if !node.used {
                assert!(!prev_was_free, "two adjacent free nodes at offset {offset}");
                free_total += node.size;
            }
            prev_was_free = !node.used;
            offset += node.size;
            visited += 1;

            let next = node.neighbor_next;
            if next == NODE_UNUSED {
                break;
            }
            assert_eq!(self.pool.get(next).neighbor_prev, cursor, "broken back-link at {next}");
            cursor = next;
        }
        assert_eq!(offset, self.size, "chain does not cover the full range");
        assert_eq!(visited, live_ids.len() as u32, "chain skipped or duplicated a live node");
        assert_eq!(free_total, self.free_storage, "free_storage disagrees with the free nodes in the chain");

        // Invariant 4: occupancy bitmasks mirror bin-head occupancy exactly.
        for bin in 0..crate::bins::NUM_LEAF_BINS {
            let top = bin >> crate::bins::TOP_BINS_SHIFT as usize;
            let leaf = bin as u32 & crate::bins::LEAF_BINS_MASK;
            let head_occupied = self.bins.head(bin) != NODE_UNUSED;
            let leaf_bit = (self.used_bins_leaf_mask(top as u32) >> leaf) & 1 != 0;
            assert_eq!(head_occupied, leaf_bit, "leaf bit for bin {bin} disagrees with its head");
        }
    }

    #[cfg(test)]
    fn used_bins_leaf_mask(&self, top: u32) -> u32 {
        // Re-derive the leaf mask from the bin heads directly, independent
        // of whatever `BinIndex` itself tracks, so this check can't pass
        // by construction.
        let mut mask = 0u32;
        for leaf in 0..crate::bins::BINS_PER_LEAF {
            let bin = ((top << crate::bins::TOP_BINS_SHIFT) | leaf) as usize;
            if self.bins.head(bin) != NODE_UNUSED {
                mask |= 1 << leaf;
            }
        }
        mask
    }
}
