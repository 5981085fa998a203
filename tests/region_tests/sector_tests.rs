//! Tests for SectorAllocator
//!
//! These tests verify:
//! - allocate/free against a plain `Vec<bool>` reference model
//! - Overlap detection on allocate
//! - First-fit placement
//! - reallocate: same size, shrink in place, grow by moving
//! - sector_space tracking

use proptest::prelude::*;
use regionstore::region::SectorAllocator;

// =============================================================================
// Helper Functions
// =============================================================================

const MODEL_SECTORS: usize = 1024;

/// Reference first-fit over a bool model
fn model_first_fit(model: &[bool], count: usize) -> usize {
    let mut offset = 0;
    loop {
        let end = offset + count;
        let fits = (offset..end).all(|s| !model.get(s).copied().unwrap_or(false));
        if fits {
            return offset;
        }
        offset += 1;
    }
}

fn model_sector_space(model: &[bool]) -> usize {
    model.iter().rposition(|&b| b).map_or(0, |i| i + 1)
}

fn assert_matches_model(alloc: &SectorAllocator, model: &[bool]) {
    for (sector, &occupied) in model.iter().enumerate() {
        assert_eq!(alloc.is_allocated(sector), occupied, "sector {}", sector);
    }
    assert_eq!(alloc.sector_space(), model_sector_space(model));
    assert_eq!(alloc.occupied(), model.iter().filter(|&&b| b).count());
}

#[derive(Debug, Clone)]
enum Op {
    Allocate(usize, usize),
    Free(usize, usize),
    FindAndAllocate(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..200, 0usize..20).prop_map(|(o, c)| Op::Allocate(o, c)),
        (0usize..200, 0usize..20).prop_map(|(o, c)| Op::Free(o, c)),
        (1usize..12).prop_map(Op::FindAndAllocate),
    ]
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #[test]
    fn prop_allocator_matches_reference_model(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let alloc = SectorAllocator::new();
        let mut model = vec![false; MODEL_SECTORS];

        for op in ops {
            match op {
                Op::Allocate(offset, count) => {
                    let was_free = model[offset..offset + count].iter().all(|&b| !b);
                    prop_assert_eq!(alloc.allocate(offset, count), was_free);
                    model[offset..offset + count].fill(true);
                }
                Op::Free(offset, count) => {
                    alloc.free(offset, count);
                    model[offset..offset + count].fill(false);
                }
                Op::FindAndAllocate(count) => {
                    let expected = model_first_fit(&model, count);
                    prop_assert_eq!(alloc.find_and_allocate(count), expected);
                    model[expected..expected + count].fill(true);
                }
            }
        }

        assert_matches_model(&alloc, &model);
    }

    #[test]
    fn prop_allocate_then_free_clears_everything(
        ranges in prop::collection::vec((0usize..300, 1usize..30), 1..20)
    ) {
        let alloc = SectorAllocator::new();
        for &(offset, count) in &ranges {
            alloc.allocate(offset, count);
        }
        for &(offset, count) in &ranges {
            alloc.free(offset, count);
        }

        prop_assert_eq!(alloc.occupied(), 0);
        prop_assert_eq!(alloc.sector_space(), 0);
    }
}

// =============================================================================
// Allocate / Free Tests
// =============================================================================

#[test]
fn test_header_reservation() {
    let alloc = SectorAllocator::new();
    assert!(alloc.allocate(0, 2));

    assert!(alloc.is_allocated(0));
    assert!(alloc.is_allocated(1));
    assert!(!alloc.is_allocated(2));
    assert_eq!(alloc.sector_space(), 2);
}

#[test]
fn test_overlapping_allocate_is_reported() {
    let alloc = SectorAllocator::new();
    assert!(alloc.allocate(10, 5));
    assert!(!alloc.allocate(14, 3));
    assert!(alloc.allocate(17, 1));
}

#[test]
fn test_free_partial_range() {
    let alloc = SectorAllocator::new();
    alloc.allocate(2, 6);
    alloc.free(4, 2);

    assert!(alloc.is_allocated(3));
    assert!(!alloc.is_allocated(4));
    assert!(!alloc.is_allocated(5));
    assert!(alloc.is_allocated(6));
    assert_eq!(alloc.occupied(), 4);
}

// =============================================================================
// First-Fit Tests
// =============================================================================

#[test]
fn test_find_and_allocate_appends_when_no_hole() {
    let alloc = SectorAllocator::new();
    alloc.allocate(0, 2);

    assert_eq!(alloc.find_and_allocate(3), 2);
    assert_eq!(alloc.find_and_allocate(1), 5);
    assert_eq!(alloc.sector_space(), 6);
}

#[test]
fn test_find_and_allocate_uses_first_hole_that_fits() {
    let alloc = SectorAllocator::new();
    alloc.allocate(0, 2);
    alloc.allocate(2, 10);
    alloc.free(3, 2); // hole [3, 5)
    alloc.free(7, 4); // hole [7, 11)

    assert_eq!(alloc.find_and_allocate(3), 7);
    assert_eq!(alloc.find_and_allocate(2), 3);
}

#[test]
fn test_find_and_allocate_crosses_word_boundary() {
    let alloc = SectorAllocator::new();
    alloc.allocate(0, 62);

    assert_eq!(alloc.find_and_allocate(4), 62);
    assert!(alloc.is_allocated(65));
    assert_eq!(alloc.sector_space(), 66);
}

// =============================================================================
// Reallocate Tests
// =============================================================================

#[test]
fn test_reallocate_same_size_is_noop() {
    let alloc = SectorAllocator::new();
    alloc.allocate(0, 2);
    let offset = alloc.find_and_allocate(3);

    assert_eq!(alloc.reallocate(offset, 3, 3), offset);
    assert_eq!(alloc.occupied(), 5);
}

#[test]
fn test_reallocate_shrink_keeps_offset() {
    let alloc = SectorAllocator::new();
    alloc.allocate(0, 2);
    let offset = alloc.find_and_allocate(4);

    assert_eq!(alloc.reallocate(offset, 4, 1), offset);
    assert!(alloc.is_allocated(offset));
    assert!(!alloc.is_allocated(offset + 1));
    assert_eq!(alloc.sector_space(), offset + 1);
}

#[test]
fn test_reallocate_grow_moves_past_neighbour() {
    let alloc = SectorAllocator::new();
    alloc.allocate(0, 2);
    let a = alloc.find_and_allocate(1); // 2
    let b = alloc.find_and_allocate(1); // 3

    let moved = alloc.reallocate(a, 1, 2);
    assert_eq!(moved, 4);
    assert!(!alloc.is_allocated(a));
    assert!(alloc.is_allocated(b));
}

#[test]
fn test_reallocate_grow_reuses_own_range_when_it_fits() {
    let alloc = SectorAllocator::new();
    alloc.allocate(0, 2);
    let a = alloc.find_and_allocate(1);

    // Nothing after `a`, so the freed run extends in place
    assert_eq!(alloc.reallocate(a, 1, 3), a);
    assert_eq!(alloc.sector_space(), a + 3);
}

#[test]
fn test_reallocate_from_empty_location() {
    let alloc = SectorAllocator::new();
    alloc.allocate(0, 2);

    // A new cell has location 0/0
    assert_eq!(alloc.reallocate(0, 0, 2), 2);
    assert!(alloc.is_allocated(0));
    assert!(alloc.is_allocated(1));
}
