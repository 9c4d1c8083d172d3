#![cfg_attr(not(test), no_std)]

//! A bin-segregated offset allocator.
//!
//! `offset-alloc` is a sub-allocator over a single contiguous logical range
//! `[0, size)` of indivisible units. It never touches backing memory: it
//! only hands out non-overlapping `(offset, length)` pairs for callers to
//! index into a GPU buffer, a file region, a memory-mapped arena, or any
//! other externally managed resource for which `malloc`/`free` is the
//! wrong tool (wrong address space, wrong lifetime model, wrong
//! performance profile).
//!
//! The allocator classifies requested sizes into 256 bins using a
//! floating-point-style (exponent, mantissa) scheme, tracks bin occupancy
//! with a two-level bitmask for O(1) best-fit search, and coalesces
//! adjacent free regions on release via a physical-adjacency linked list.
//! See [`Allocator`] for the full API.
//!
//! This crate does not provide thread safety, range growth, alignment
//! beyond the unit size, defragmentation, or diagnostic memory dumps.
//! Callers needing shared access must synchronize externally.

extern crate alloc;

mod bins;
mod node;
mod allocator;

pub use allocator::{Allocation, Allocator, StorageReport};
pub use bins::{float_round_down, float_round_up, float_to_uint};
