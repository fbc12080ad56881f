use crate::bucket::{bucket_id, identity, partition, Bucket};
use crate::errors::{BuildFailure, IndexError};
use crate::gfa::Graph;
use crate::sketch::{MinimizerSketcher, Sketcher};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

/// homopolymer-compressed k-mers
pub const I_HPC: u32 = 0x1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexSpec {
    pub w: u32,
    pub k: u32,
    /// the index has `1 << bucket_bits` buckets
    pub bucket_bits: u32,
    pub flag: u32,
}

pub const DEFAULT_INDEX_SPEC: IndexSpec = IndexSpec {
    w: 11,
    k: 17,
    bucket_bits: 14,
    flag: 0,
};

impl Default for IndexSpec {
    fn default() -> Self {
        DEFAULT_INDEX_SPEC
    }
}

impl IndexSpec {
    pub fn is_hpc(&self) -> bool {
        self.flag & I_HPC != 0
    }

    pub fn validate(&self) -> Result<(), IndexError> {
        if self.k == 0 || self.k > 28 {
            return Err(IndexError::InvalidSpec(format!(
                "k-mer size {} not in [1, 28]",
                self.k
            )));
        }
        if self.w == 0 || self.w > 255 {
            return Err(IndexError::InvalidSpec(format!(
                "window size {} not in [1, 255]",
                self.w
            )));
        }
        if self.bucket_bits > 24 {
            return Err(IndexError::InvalidSpec(format!(
                "bucket bits {} not in [0, 24]",
                self.bucket_bits
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    pub n_buckets: usize,
    pub n_keys: usize,
    pub n_singletons: usize,
    pub n_positions: usize,
    pub avg_occ: f64,
    pub avg_spacing: f64,
    pub total_len: usize,
}

/// Minimizer index over the segments of a graph.
///
/// Built once, then read only: [`GraphIndex::get`] takes `&self` and can be
/// called from any number of threads.
#[derive(Debug)]
pub struct GraphIndex {
    pub spec: IndexSpec,
    graph: Graph,
    buckets: Vec<Bucket>,
}

impl GraphIndex {
    pub fn build_from_graph(
        graph: Graph,
        spec: IndexSpec,
        n_threads: usize,
    ) -> Result<Self, BuildFailure> {
        Self::build_from_graph_with(graph, spec, n_threads, &MinimizerSketcher)
    }

    /// Index `graph` with minimizers from `sketcher`.
    ///
    /// Segment `i` is sketched with `rid = i`. Every segment is sketched and
    /// partitioned before any bucket is built; the buckets are then
    /// finalized on a pool of `n_threads` workers (0 for all CPUs).
    pub fn build_from_graph_with<S: Sketcher + ?Sized>(
        graph: Graph,
        spec: IndexSpec,
        n_threads: usize,
        sketcher: &S,
    ) -> Result<Self, BuildFailure> {
        if let Err(e) = spec.validate() {
            return Err(BuildFailure::new(e, graph));
        }
        let n_ovlp = graph.count_overlapping_links();
        if n_ovlp > 0 {
            log::warn!("{} link(s) with non-zero overlap, graph rejected", n_ovlp);
            return Err(BuildFailure::new(
                IndexError::OverlappingLinks(n_ovlp),
                graph,
            ));
        }
        let pool = match ThreadPoolBuilder::new().num_threads(n_threads).build() {
            Ok(pool) => pool,
            Err(e) => return Err(BuildFailure::new(IndexError::ThreadPool(e), graph)),
        };

        let mut buckets = (0..1_usize << spec.bucket_bits)
            .map(|_| Bucket::new())
            .collect::<Vec<_>>();

        // TODO: sketch segments in parallel with per-thread staging
        let mut n_entries = 0_usize;
        graph.segs.iter().enumerate().for_each(|(sid, seg)| {
            let mins = sketcher.sketch(&seg.seq, spec.w, spec.k, sid as u32, spec.is_hpc());
            n_entries += mins.len();
            partition(&mut buckets, spec.bucket_bits, &mins);
        });
        log::info!(
            "collected {} minimizers from {} segments",
            n_entries,
            graph.segs.len()
        );

        pool.install(|| {
            buckets
                .par_iter_mut()
                .for_each(|b| b.finalize(spec.bucket_bits));
        });
        let n_keys = buckets.iter().map(|b| b.n_keys()).sum::<usize>();
        let n_multi = buckets.iter().map(|b| b.n_multi_positions()).sum::<usize>();
        log::info!(
            "built {} buckets with {} threads: {} distinct minimizers, {} positions ({} stored out of line)",
            buckets.len(),
            pool.current_num_threads(),
            n_keys,
            n_entries,
            n_multi
        );

        Ok(GraphIndex {
            spec,
            graph,
            buckets,
        })
    }

    /// Load a GFA file and index it.
    pub fn build_from_file(
        filepath: &str,
        spec: IndexSpec,
        n_threads: usize,
    ) -> Result<Self, IndexError> {
        spec.validate()?;
        let graph = Graph::from_gfa_file(filepath)?;
        Self::build_from_graph(graph, spec, n_threads).map_err(IndexError::from)
    }

    /// All positions of minimizer `x` (in the `MM128::x` layout), sorted.
    pub fn get(&self, x: u64) -> &[u64] {
        let b = self.spec.bucket_bits;
        self.buckets[bucket_id(x, b)].get(identity(x, b))
    }

    /// Same as [`GraphIndex::get`] for a bare `x >> 8` value, as yielded by [`GraphIndex::iter`].
    pub fn get_by_hash(&self, hash: u64) -> &[u64] {
        self.get(hash << 8)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Drop the buckets and give the graph back.
    pub fn into_graph(self) -> Graph {
        self.graph
    }

    pub fn n_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// `(hash, positions)` for every minimizer, where `hash` is `x >> 8`;
    /// look it up again with [`GraphIndex::get_by_hash`].
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[u64])> + '_ {
        let b = self.spec.bucket_bits;
        self.buckets
            .iter()
            .enumerate()
            .flat_map(move |(bid, bucket)| {
                bucket
                    .iter()
                    .map(move |(key, ys)| (key << b | bid as u64, ys))
            })
    }

    pub fn stat(&self) -> IndexStats {
        let mut n_keys = 0_usize;
        let mut n_singletons = 0_usize;
        let mut n_positions = 0_usize;
        self.buckets.iter().for_each(|bucket| {
            let n = bucket.n_keys();
            let n_multi_keys = bucket.iter().filter(|(_, ys)| ys.len() > 1).count();
            n_keys += n;
            n_singletons += n - n_multi_keys;
            n_positions += bucket.n_multi_positions() + n - n_multi_keys;
        });
        let total_len = self.graph.total_len();
        let avg_occ = if n_keys > 0 {
            n_positions as f64 / n_keys as f64
        } else {
            0.0
        };
        let avg_spacing = if n_positions > 0 {
            total_len as f64 / n_positions as f64
        } else {
            0.0
        };
        let stats = IndexStats {
            n_buckets: self.buckets.len(),
            n_keys,
            n_singletons,
            n_positions,
            avg_occ,
            avg_spacing,
            total_len,
        };
        log::info!(
            "kmer size: {}; window size: {}; is_hpc: {}; #seq: {}",
            self.spec.k,
            self.spec.w,
            self.spec.is_hpc(),
            self.graph.segs.len()
        );
        log::info!(
            "distinct minimizers: {} ({:.2}% are singletons); average occurrences: {:.3}; average spacing: {:.3}; total length: {}",
            n_keys,
            if n_keys > 0 { 100.0 * n_singletons as f64 / n_keys as f64 } else { 0.0 },
            avg_occ,
            avg_spacing,
            total_len
        );
        stats
    }

    /// Occurrence cut-off leaving out the most frequent `frac` of minimizers.
    ///
    /// Returns one more than the occurrence count at the `1 - frac` quantile,
    /// or `u32::MAX` when `frac <= 0` or the index is empty.
    pub fn cal_max_occ(&self, frac: f64) -> u32 {
        if frac <= 0.0 {
            return u32::MAX;
        }
        let mut occ = self
            .buckets
            .par_iter()
            .flat_map_iter(|bucket| bucket.iter().map(|(_, ys)| ys.len() as u32))
            .collect::<Vec<u32>>();
        if occ.is_empty() {
            return u32::MAX;
        }
        let n = occ.len();
        let nth = (((1.0 - frac) * n as f64) as usize).min(n - 1);
        let (_, thres, _) = occ.select_nth_unstable(nth);
        *thres + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfa::{Link, Segment};
    use crate::sketch::MM128;

    /// emits one fixed entry per base so tests control the keys exactly
    struct ByteSketcher;

    impl Sketcher for ByteSketcher {
        fn sketch(&self, seq: &[u8], _w: u32, _k: u32, rid: u32, _hpc: bool) -> Vec<MM128> {
            seq.iter()
                .enumerate()
                .map(|(i, &c)| MM128 {
                    x: (c as u64) << 8 | 0x2A,
                    y: (rid as u64) << 32 | (i as u64) << 1,
                })
                .collect()
        }
    }

    fn spec(bucket_bits: u32) -> IndexSpec {
        IndexSpec {
            w: 5,
            k: 7,
            bucket_bits,
            flag: 0,
        }
    }

    fn two_segs() -> Graph {
        Graph::new(
            vec![Segment::new("a", b"AAC"), Segment::new("b", b"CAG")],
            vec![Link::new(0, false, 1, false)],
        )
    }

    #[test]
    fn spec_validation() {
        assert!(DEFAULT_INDEX_SPEC.validate().is_ok());
        assert!(!DEFAULT_INDEX_SPEC.is_hpc());
        for bad in [
            IndexSpec { k: 0, ..DEFAULT_INDEX_SPEC },
            IndexSpec { k: 29, ..DEFAULT_INDEX_SPEC },
            IndexSpec { w: 0, ..DEFAULT_INDEX_SPEC },
            IndexSpec { w: 256, ..DEFAULT_INDEX_SPEC },
            IndexSpec { bucket_bits: 25, ..DEFAULT_INDEX_SPEC },
        ] {
            assert!(matches!(bad.validate(), Err(IndexError::InvalidSpec(_))));
        }
        assert!(IndexSpec { flag: I_HPC, ..DEFAULT_INDEX_SPEC }.is_hpc());
        assert!(IndexSpec { bucket_bits: 0, ..DEFAULT_INDEX_SPEC }.validate().is_ok());
    }

    #[test]
    fn single_bucket_lookup() {
        let gi = GraphIndex::build_from_graph_with(two_segs(), spec(0), 1, &ByteSketcher).unwrap();
        assert_eq!(gi.n_buckets(), 1);
        assert_eq!(gi.get((b'A' as u64) << 8), &[0_u64, 2, 1 << 32 | 2]);
        assert_eq!(gi.get((b'C' as u64) << 8), &[4_u64, 1 << 32]);
        assert!(gi.get((b'T' as u64) << 8).is_empty());
        let mut hashes = gi.iter().map(|(h, _)| h).collect::<Vec<_>>();
        hashes.sort_unstable();
        assert_eq!(hashes, vec![b'A' as u64, b'C' as u64, b'G' as u64]);
    }

    #[test]
    fn custom_sketcher_lookup() {
        let gi = GraphIndex::build_from_graph_with(two_segs(), spec(2), 1, &ByteSketcher).unwrap();
        assert_eq!(gi.n_buckets(), 4);
        let a = (b'A' as u64) << 8;
        let c = (b'C' as u64) << 8;
        let g = (b'G' as u64) << 8;
        assert_eq!(gi.get(a), &[0_u64, 2, 1 << 32 | 2]);
        assert_eq!(gi.get(c), &[4_u64, 1 << 32]);
        assert_eq!(gi.get(g), &[1_u64 << 32 | 4]);
        // the low byte plays no part in the lookup
        assert_eq!(gi.get(g | 0x2A), gi.get(g));
        assert!(gi.get((b'T' as u64) << 8).is_empty());
    }

    #[test]
    fn iter_and_stat() {
        let gi = GraphIndex::build_from_graph_with(two_segs(), spec(3), 2, &ByteSketcher).unwrap();
        let mut all = gi
            .iter()
            .map(|(h, ys)| (h, ys.to_vec()))
            .collect::<Vec<_>>();
        all.sort();
        assert_eq!(
            all,
            vec![
                (b'A' as u64, vec![0_u64, 2, 1 << 32 | 2]),
                (b'C' as u64, vec![4_u64, 1 << 32]),
                (b'G' as u64, vec![1_u64 << 32 | 4]),
            ]
        );
        for (h, ys) in gi.iter() {
            assert_eq!(gi.get_by_hash(h), ys);
            assert_eq!(gi.get(h << 8 | 0x2A), ys);
        }
        let stats = gi.stat();
        assert_eq!(stats.n_buckets, 8);
        assert_eq!(stats.n_keys, 3);
        assert_eq!(stats.n_singletons, 1);
        assert_eq!(stats.n_positions, 6);
        assert_eq!(stats.total_len, 6);
        assert!((stats.avg_occ - 2.0).abs() < 1e-9);
    }

    #[test]
    fn max_occ_cutoff() {
        let gi = GraphIndex::build_from_graph_with(two_segs(), spec(2), 1, &ByteSketcher).unwrap();
        // occurrence counts are 1, 2 and 3
        assert_eq!(gi.cal_max_occ(0.0), u32::MAX);
        assert_eq!(gi.cal_max_occ(0.5), 3);
        assert_eq!(gi.cal_max_occ(0.01), 4);
        assert_eq!(gi.cal_max_occ(1.0), 2);
    }

    #[test]
    fn failed_build_returns_graph() {
        let mut g = two_segs();
        g.links[0].ov = 5;
        let failure = GraphIndex::build_from_graph(g, spec(2), 1).unwrap_err();
        assert!(matches!(failure.error, IndexError::OverlappingLinks(1)));
        let (_, g) = failure.into_parts();
        assert_eq!(g.segs.len(), 2);

        let failure = GraphIndex::build_from_graph(two_segs(), spec(0), 1).unwrap_err();
        assert!(matches!(failure.error, IndexError::InvalidSpec(_)));
        assert_eq!(failure.graph.links.len(), 1);
    }

    #[test]
    fn into_graph() {
        let gi = GraphIndex::build_from_graph(two_segs(), spec(2), 1).unwrap();
        assert_eq!(gi.graph().seg_name(1), Some("b"));
        let g = gi.into_graph();
        assert_eq!(g.segs[0].seq, b"AAC".to_vec());
    }
}
