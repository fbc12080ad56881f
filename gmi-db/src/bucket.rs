use crate::sketch::MM128;
use rustc_hash::FxHashMap;

/// Where the positions of one minimizer live in its bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketEntry {
    /// the minimizer occurs once; its position is stored inline
    Singleton(u64),
    /// `count` positions starting at `offset` in the bucket's position array
    Range { offset: u32, count: u32 },
}

/// One partition of the minimizer space.
///
/// Entries are staged with [`Bucket::push`] and turned into the lookup
/// table by [`Bucket::finalize`], after which the bucket is read only.
#[derive(Debug, Default)]
pub struct Bucket {
    staging: Vec<MM128>,
    table: FxHashMap<u64, BucketEntry>,
    positions: Vec<u64>,
}

/// Bucket selected by the bits right above the low byte of `x`.
#[inline(always)]
pub fn bucket_id(x: u64, bucket_bits: u32) -> usize {
    ((x >> 8) & ((1_u64 << bucket_bits) - 1)) as usize
}

/// The part of `x` a bucket groups and looks up on.
#[inline(always)]
pub fn identity(x: u64, bucket_bits: u32) -> u64 {
    x >> 8 >> bucket_bits
}

/// Append each minimizer, unchanged, to the bucket its `x` selects.
pub fn partition(buckets: &mut [Bucket], bucket_bits: u32, mins: &[MM128]) {
    debug_assert_eq!(buckets.len(), 1 << bucket_bits);
    mins.iter().for_each(|m| {
        buckets[bucket_id(m.x, bucket_bits)].push(*m);
    });
}

fn count_groups(sorted: &[MM128]) -> (usize, usize) {
    let mut n_keys = 0_usize;
    let mut n_multi = 0_usize;
    sorted.chunk_by(|a, b| a.hash() == b.hash()).for_each(|g| {
        n_keys += 1;
        if g.len() > 1 {
            n_multi += g.len();
        }
    });
    (n_keys, n_multi)
}

impl Bucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, m: MM128) {
        self.staging.push(m);
    }

    pub fn n_staged(&self) -> usize {
        self.staging.len()
    }

    /// Sort the staged minimizers, group them by identity and build the table.
    ///
    /// Positions of a minimizer seen more than once are packed together in
    /// the position array and sorted, so the result does not depend on how
    /// the unstable sort ordered tied keys. The staging vector is freed.
    ///
    /// Panics if an identity would be inserted twice, which only a broken
    /// sort or a bucket fed with foreign entries can cause.
    pub fn finalize(&mut self, bucket_bits: u32) {
        let mut staging = std::mem::take(&mut self.staging);
        if staging.is_empty() {
            return;
        }
        staging.sort_unstable_by_key(|m| m.x);

        let (n_keys, n_multi) = count_groups(&staging);
        assert!(
            n_multi <= u32::MAX as usize,
            "bucket holds more positions than a range can address"
        );
        let mut table =
            FxHashMap::<u64, BucketEntry>::with_capacity_and_hasher(n_keys, Default::default());
        let mut positions = Vec::<u64>::with_capacity(n_multi);

        staging
            .chunk_by(|a, b| a.hash() == b.hash())
            .for_each(|group| {
                let key = identity(group[0].x, bucket_bits);
                let entry = if group.len() == 1 {
                    BucketEntry::Singleton(group[0].y)
                } else {
                    let offset = positions.len();
                    positions.extend(group.iter().map(|m| m.y));
                    positions[offset..].sort_unstable();
                    BucketEntry::Range {
                        offset: offset as u32,
                        count: group.len() as u32,
                    }
                };
                let prev = table.insert(key, entry);
                assert!(prev.is_none(), "minimizer {:#x} grouped twice", key);
            });
        assert_eq!(positions.len(), n_multi);

        self.table = table;
        self.positions = positions;
    }

    pub fn get_entry(&self, key: u64) -> Option<&BucketEntry> {
        self.table.get(&key)
    }

    /// Positions recorded for `key`, ascending; empty if it was never seen.
    pub fn get(&self, key: u64) -> &[u64] {
        match self.table.get(&key) {
            None => &[],
            Some(BucketEntry::Singleton(y)) => std::slice::from_ref(y),
            Some(BucketEntry::Range { offset, count }) => {
                let bgn = *offset as usize;
                &self.positions[bgn..bgn + *count as usize]
            }
        }
    }

    pub fn n_keys(&self) -> usize {
        self.table.len()
    }

    /// positions stored out of line, i.e. of minimizers seen more than once
    pub fn n_multi_positions(&self) -> usize {
        self.positions.len()
    }

    /// `(identity, positions)` of every minimizer in the bucket, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[u64])> + '_ {
        self.table.keys().map(move |&key| (key, self.get(key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mm(hash: u64, y: u64) -> MM128 {
        MM128 { x: hash << 8 | 15, y }
    }

    #[test]
    fn routing_uses_selector_bits() {
        let b = 3;
        assert_eq!(bucket_id(0b101_0000_0000, b), 0b101);
        assert_eq!(bucket_id(0b1_101_0000_0000, b), 0b101);
        assert_eq!(identity(0b1_101_0000_0000, b), 1);
        // the low byte is neither routed nor grouped on
        assert_eq!(bucket_id(0xFF, b), 0);
        assert_eq!(identity(0xFF, b), 0);

        let mut buckets = (0..1 << b).map(|_| Bucket::new()).collect::<Vec<_>>();
        let mins = (0..64_u64).map(|h| mm(h, h)).collect::<Vec<_>>();
        partition(&mut buckets, b, &mins);
        assert!(buckets.iter().all(|bk| bk.n_staged() == 8));
        assert!(buckets[5].staging.iter().all(|m| m.hash() & 0b111 == 5));
    }

    #[test]
    fn singleton_and_range() {
        let b = 2;
        let mut bucket = Bucket::new();
        // identities 1 and 2, all in bucket 3
        for m in [mm(0b111, 40), mm(0b1011, 7), mm(0b111, 12), mm(0b111, 33)] {
            bucket.push(m);
        }
        bucket.finalize(b);
        assert_eq!(bucket.n_staged(), 0);
        assert_eq!(bucket.staging.capacity(), 0);
        assert_eq!(bucket.n_keys(), 2);
        assert_eq!(bucket.n_multi_positions(), 3);
        assert_eq!(bucket.get(1), &[12, 33, 40]);
        assert_eq!(bucket.get(2), &[7]);
        assert_eq!(bucket.get_entry(2), Some(&BucketEntry::Singleton(7)));
        assert_eq!(
            bucket.get_entry(1),
            Some(&BucketEntry::Range {
                offset: 0,
                count: 3
            })
        );
        assert!(bucket.get(3).is_empty());
    }

    #[test]
    fn low_byte_does_not_split_groups() {
        let mut bucket = Bucket::new();
        bucket.push(MM128 { x: 9 << 8 | 3, y: 5 });
        bucket.push(MM128 { x: 9 << 8 | 200, y: 1 });
        bucket.finalize(0);
        assert_eq!(bucket.n_keys(), 1);
        assert_eq!(bucket.get(9), &[1, 5]);
    }

    #[test]
    fn duplicated_positions_are_kept() {
        let mut bucket = Bucket::new();
        for y in [3, 3, 1] {
            bucket.push(mm(4, y));
        }
        bucket.finalize(1);
        assert_eq!(bucket.get(2), &[1, 3, 3]);
    }

    #[test]
    fn ranges_are_contiguous() {
        let mut bucket = Bucket::new();
        let mut expected = FxHashMap::<u64, Vec<u64>>::default();
        for i in 0..500_u64 {
            let h = (i * 7919) % 37;
            let y = (i * 104729) % 1000;
            bucket.push(mm(h, y));
            expected.entry(h).or_default().push(y);
        }
        bucket.finalize(0);
        assert_eq!(bucket.n_keys(), expected.len());
        let mut covered = vec![false; bucket.n_multi_positions()];
        for (h, mut ys) in expected.into_iter() {
            ys.sort_unstable();
            assert_eq!(bucket.get(h), &ys[..]);
            if let Some(BucketEntry::Range { offset, count }) = bucket.get_entry(h) {
                for c in covered[*offset as usize..(*offset + *count) as usize].iter_mut() {
                    assert!(!*c);
                    *c = true;
                }
            }
        }
        assert!(covered.into_iter().all(|c| c));
    }

    #[test]
    fn empty_bucket() {
        let mut bucket = Bucket::new();
        bucket.finalize(4);
        assert_eq!(bucket.n_keys(), 0);
        assert!(bucket.get(0).is_empty());
        assert_eq!(bucket.iter().count(), 0);
    }
}
