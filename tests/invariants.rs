//! Property-based checks over `Allocator` as a black box: live allocations
//! never overlap, every returned offset stays inside the managed range, and
//! free-storage accounting always reconciles against what's actually live.

use offset_alloc::Allocator;
use proptest::collection::vec;
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Op {
    Alloc(u32),
    Free(usize),
}

fn op_strategy(max_size: u32) -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1..max_size).prop_map(Op::Alloc),
        1 => (0..64usize).prop_map(Op::Free),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn live_allocations_never_overlap(ops in vec(op_strategy(4096), 1..200)) {
        let range = 1 << 16;
        let mut a = Allocator::new(range, 512);
        let mut live: Vec<(u32, u32, offset_alloc::Allocation)> = Vec::new();

        for op in ops {
            match op {
                Op::Alloc(size) => {
                    let alloc = a.allocate(size);
                    if alloc.is_some() {
                        for (existing_offset, existing_size, _) in &live {
                            let a_end = alloc.offset + size;
                            let b_end = existing_offset + existing_size;
                            let disjoint = a_end <= *existing_offset || b_end <= alloc.offset;
                            prop_assert!(disjoint, "new region overlaps an existing live one");
                        }
                        prop_assert!(alloc.offset + size <= range);
                        live.push((alloc.offset, size, alloc));
                    }
                }
                Op::Free(idx) => {
                    if !live.is_empty() {
                        let (_, _, alloc) = live.remove(idx % live.len());
                        a.free(alloc);
                    }
                }
            }
        }

        let live_total: u32 = live.iter().map(|(_, size, _)| size).sum();
        prop_assert_eq!(a.free_storage(), range - live_total);
    }

    #[test]
    fn freeing_everything_restores_full_capacity(sizes in vec(1u32..2048, 1..64)) {
        let range = 1 << 17;
        let mut a = Allocator::new(range, 256);
        let mut allocations = Vec::new();

        for size in sizes {
            let alloc = a.allocate(size);
            if alloc.is_some() {
                allocations.push(alloc);
            }
        }

        for alloc in allocations.into_iter().rev() {
            a.free(alloc);
        }

        prop_assert_eq!(a.free_storage(), range);
        prop_assert_eq!(a.storage_report().total_free_space, range);
    }

    #[test]
    fn reset_always_returns_to_a_pristine_single_region(
        sizes in vec(1u32..2048, 0..64),
    ) {
        let range = 1 << 17;
        let mut a = Allocator::new(range, 256);
        for size in sizes {
            a.allocate(size);
        }

        a.reset();
        prop_assert_eq!(a.free_storage(), range);
        prop_assert_eq!(a.storage_report().total_free_space, range);

        let whole = a.allocate(range);
        prop_assert!(whole.is_some());
        prop_assert_eq!(whole.offset, 0);
    }
}

#[test]
fn range_of_one_is_exact() {
    // max_allocs=2, not 1: constructing the allocator already consumes one
    // node id for the root region, and `allocate` reserves a slot up front
    // for a potential split remainder regardless of whether one actually
    // occurs (see `Allocator::allocate`'s eager capacity check). A capacity
    // of exactly 1 would leave the pool exhausted before the first
    // `allocate` call ever runs.
    let mut a = Allocator::new(1, 2);
    let alloc = a.allocate(1);
    assert!(alloc.is_some());
    assert_eq!(alloc.offset, 0);
    assert!(a.allocate(1).is_none());
    a.free(alloc);
    assert_eq!(a.free_storage(), 1);
}
