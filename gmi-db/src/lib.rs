pub mod bucket;
pub mod errors;
pub mod gfa;
pub mod index;
pub mod sketch;

#[cfg(test)]
mod tests {
    use crate::errors::IndexError;
    use crate::gfa::Graph;
    use crate::index::{GraphIndex, IndexSpec, DEFAULT_INDEX_SPEC};
    use crate::sketch::sequence_to_minimizers;

    fn small_spec() -> IndexSpec {
        IndexSpec {
            w: 5,
            k: 11,
            bucket_bits: 4,
            flag: 0,
        }
    }

    #[test]
    fn gz_file_read_test() {
        let g0 = Graph::from_gfa_file("test/test_data/test_graph.gfa").unwrap();
        let g1 = Graph::from_gfa_file("test/test_data/test_graph.gfa.gz").unwrap();
        assert_eq!(g0.segs.len(), 4);
        assert_eq!(g0.links.len(), 4);
        assert_eq!(g0.segs.len(), g1.segs.len());
        g0.segs.iter().zip(g1.segs.iter()).for_each(|(s0, s1)| {
            assert_eq!(s0.name, s1.name);
            assert_eq!(s0.seq, s1.seq);
        });
    }

    #[test]
    fn build_from_file_test() {
        let gi = GraphIndex::build_from_file("test/test_data/test_graph.gfa", small_spec(), 2)
            .unwrap();
        let g = gi.graph();
        let mins = g
            .segs
            .iter()
            .enumerate()
            .flat_map(|(sid, seg)| sequence_to_minimizers(&seg.seq, 5, 11, sid as u32, false))
            .collect::<Vec<_>>();
        assert!(!mins.is_empty());
        for m in mins.iter() {
            let n_ingested = mins.iter().filter(|m1| m1.hash() == m.hash() && m1.y == m.y).count();
            let hits = gi.get(m.x);
            assert_eq!(hits.iter().filter(|&&y| y == m.y).count(), n_ingested);
            assert!(hits.windows(2).all(|p| p[0] <= p[1]));
        }
        let stats = gi.stat();
        assert!(stats.n_keys > 0);
        assert_eq!(stats.total_len, g.total_len());
    }

    #[test]
    fn overlap_file_rejected() {
        let r = GraphIndex::build_from_file("test/test_data/test_overlap.gfa", small_spec(), 1);
        assert!(matches!(r, Err(IndexError::OverlappingLinks(1))));
    }

    #[test]
    fn missing_file_rejected() {
        let r = GraphIndex::build_from_file("test/test_data/missing.gfa", DEFAULT_INDEX_SPEC, 1);
        assert!(matches!(r, Err(IndexError::Graph(_))));
    }
}
