//! Sector Allocator
//!
//! Bitmap free-space tracker over the 4 KiB sectors of a region file.
//! Pure bookkeeping, no I/O.

use parking_lot::Mutex;

/// Tracks which sectors of a region file are occupied
///
/// Represents state with bits:
/// - 0 = free sector
/// - 1 = occupied sector
///
/// ## Concurrency:
/// - One allocator-wide lock; every operation is atomic with respect to the
///   others.
/// - Not joined with the file I/O lock of the owning region file. Between a
///   reallocation and the header write that records it, the bitmap and the
///   on-disk header disagree. Callers rely on a single writer per cell.
#[derive(Debug, Default)]
pub struct SectorAllocator {
    /// Bitmap words (each word = 64 sectors), grows on demand
    bitmap: Mutex<Vec<u64>>,
}

impl SectorAllocator {
    /// Create an allocator with every sector free
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `count` sectors starting at `offset` as occupied
    ///
    /// Returns `false` if any sector in the range was already occupied. The
    /// range is marked either way.
    pub fn allocate(&self, offset: usize, count: usize) -> bool {
        let mut bitmap = self.bitmap.lock();
        mark(&mut bitmap, offset, count)
    }

    /// Clear `count` sectors starting at `offset`
    pub fn free(&self, offset: usize, count: usize) {
        let mut bitmap = self.bitmap.lock();
        clear(&mut bitmap, offset, count);
    }

    /// First-fit: find the lowest run of `count` free sectors, occupy it and
    /// return its offset
    pub fn find_and_allocate(&self, count: usize) -> usize {
        let mut bitmap = self.bitmap.lock();
        let offset = first_fit(&bitmap, count);
        mark(&mut bitmap, offset, count);
        offset
    }

    /// Resize an existing run
    ///
    /// - same size: no-op, same offset
    /// - shrinking: tail is freed in place, same offset
    /// - growing: old run is freed and a fresh first-fit search is made; the
    ///   caller must rewrite the payload at the returned offset
    pub fn reallocate(&self, old_offset: usize, old_count: usize, new_count: usize) -> usize {
        if new_count == old_count {
            return old_offset;
        }

        let mut bitmap = self.bitmap.lock();
        clear(&mut bitmap, old_offset, old_count);

        if new_count < old_count {
            mark(&mut bitmap, old_offset, new_count);
            old_offset
        } else {
            let offset = first_fit(&bitmap, new_count);
            mark(&mut bitmap, offset, new_count);
            offset
        }
    }

    /// One past the highest occupied sector (0 when nothing is occupied)
    pub fn sector_space(&self) -> usize {
        let bitmap = self.bitmap.lock();
        for (word_idx, &word) in bitmap.iter().enumerate().rev() {
            if word != 0 {
                return word_idx * 64 + (64 - word.leading_zeros() as usize);
            }
        }
        0
    }

    /// Check if a specific sector is occupied
    pub fn is_allocated(&self, sector: usize) -> bool {
        let bitmap = self.bitmap.lock();
        is_set(&bitmap, sector)
    }

    /// Number of occupied sectors
    pub fn occupied(&self) -> usize {
        let bitmap = self.bitmap.lock();
        bitmap.iter().map(|w| w.count_ones() as usize).sum()
    }
}

// =============================================================================
// Bitmap Helpers (called with the lock held)
// =============================================================================

fn is_set(bitmap: &[u64], sector: usize) -> bool {
    bitmap
        .get(sector / 64)
        .map_or(false, |word| word & (1u64 << (sector % 64)) != 0)
}

fn mark(bitmap: &mut Vec<u64>, offset: usize, count: usize) -> bool {
    if count == 0 {
        return true;
    }

    let end = offset + count;
    let needed_words = (end + 63) / 64;
    if bitmap.len() < needed_words {
        bitmap.resize(needed_words, 0);
    }

    let mut was_free = true;
    for sector in offset..end {
        let bit = 1u64 << (sector % 64);
        let word = &mut bitmap[sector / 64];
        if *word & bit != 0 {
            was_free = false;
        }
        *word |= bit;
    }
    was_free
}

fn clear(bitmap: &mut [u64], offset: usize, count: usize) {
    for sector in offset..offset + count {
        match bitmap.get_mut(sector / 64) {
            Some(word) => *word &= !(1u64 << (sector % 64)),
            None => break,
        }
    }
}

/// Lowest offset with `count` clear sectors. Past the end of the bitmap every
/// sector is free, so this always succeeds.
fn first_fit(bitmap: &[u64], count: usize) -> usize {
    let total = bitmap.len() * 64;
    let mut cursor = 0;

    loop {
        let from = next_clear(bitmap, cursor);
        match next_set(bitmap, from, total) {
            Some(to) if to - from < count => cursor = to,
            _ => return from,
        }
    }
}

fn next_clear(bitmap: &[u64], from: usize) -> usize {
    let mut sector = from;
    while is_set(bitmap, sector) {
        sector += 1;
    }
    sector
}

fn next_set(bitmap: &[u64], from: usize, total: usize) -> Option<usize> {
    (from..total).find(|&sector| is_set(bitmap, sector))
}
