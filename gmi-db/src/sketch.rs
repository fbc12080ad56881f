use std::collections::VecDeque;
use std::fmt;

/// A (minimizer, position) pair.
///
/// `x` is `hash << 8 | span` and `y` is `rid << 32 | end_pos << 1 | strand`,
/// where `end_pos` is the offset of the last base of the k-mer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MM128 {
    pub x: u64,
    pub y: u64,
}

impl fmt::Display for MM128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}, {})",
            self.hash(),
            self.span(),
            self.rid(),
            self.pos(),
            self.strand()
        )
    }
}

impl MM128 {
    #[inline(always)]
    pub fn hash(&self) -> u64 {
        self.x >> 8
    }

    #[inline(always)]
    pub fn span(&self) -> u8 {
        (self.x & 0xFF) as u8
    }

    #[inline(always)]
    pub fn rid(&self) -> u32 {
        (self.y >> 32) as u32
    }

    #[inline(always)]
    pub fn pos(&self) -> u32 {
        ((self.y & 0xFFFFFFFF) >> 1) as u32
    }

    #[inline(always)]
    pub fn strand(&self) -> u8 {
        (self.y & 0x1) as u8
    }
}

const EMPTY_MM128: MM128 = MM128 {
    x: u64::MAX,
    y: u64::MAX,
};

const fn nt4_table() -> [u8; 256] {
    let mut t = [4_u8; 256];
    t[b'A' as usize] = 0;
    t[b'a' as usize] = 0;
    t[b'C' as usize] = 1;
    t[b'c' as usize] = 1;
    t[b'G' as usize] = 2;
    t[b'g' as usize] = 2;
    t[b'T' as usize] = 3;
    t[b't' as usize] = 3;
    t
}

/// A/C/G/T to 0..=3, everything else to 4
pub const SEQ_NT4_TABLE: [u8; 256] = nt4_table();

/// Invertible integer hash restricted to the low bits selected by `mask`.
#[inline(always)]
pub fn hash64(key: u64, mask: u64) -> u64 {
    let key = (!key).wrapping_add(key << 21) & mask; // key = (key << 21) - key - 1;
    let key = key ^ key >> 24;
    let key = (key.wrapping_add(key << 3)).wrapping_add(key << 8) & mask; // key * 265
    let key = key ^ key >> 14;
    let key = (key.wrapping_add(key << 2)).wrapping_add(key << 4) & mask; // key * 21
    let key = key ^ key >> 28;
    key.wrapping_add(key << 31) & mask
}

/// Producer of (minimizer, position) pairs for one segment.
///
/// The index only routes and groups on `x` and stores `y` verbatim, so any
/// producer honouring the `x` layout of [`MM128`] can be plugged in.
pub trait Sketcher {
    fn sketch(&self, seq: &[u8], w: u32, k: u32, rid: u32, hpc: bool) -> Vec<MM128>;
}

/// Window minimizers of canonical k-mers, see [`sequence_to_minimizers`].
#[derive(Clone, Copy, Debug, Default)]
pub struct MinimizerSketcher;

impl Sketcher for MinimizerSketcher {
    fn sketch(&self, seq: &[u8], w: u32, k: u32, rid: u32, hpc: bool) -> Vec<MM128> {
        sequence_to_minimizers(seq, w, k, rid, hpc)
    }
}

/// Collect the (w, k)-minimizers of `seq`.
///
/// Every k-mer tied with the window minimum is reported. Symmetric k-mers
/// (equal to their reverse complement) carry no strand and are skipped, and
/// any non-ACGT byte restarts the k-mer. With `hpc` set, runs of the same
/// base are collapsed before hashing and the span recorded in the low byte of
/// `x` covers the uncompressed run; k-mers spanning 256 bases or more are
/// dropped.
pub fn sequence_to_minimizers(seq: &[u8], w: u32, k: u32, rid: u32, hpc: bool) -> Vec<MM128> {
    assert!(k > 0 && k <= 28);
    assert!(w > 0 && w < 256);
    let (w, k) = (w as usize, k as usize);
    let shift1 = 2 * (k - 1);
    let mask = (1_u64 << (2 * k)) - 1;
    let mut kmer = [0_u64; 2];
    let mut mins = Vec::<MM128>::with_capacity(seq.len() / w + 1);
    let mut buf = vec![EMPTY_MM128; w];
    let mut min = EMPTY_MM128;
    let mut run_lens = VecDeque::<usize>::with_capacity(k + 1);
    let mut l = 0_usize;
    let mut buf_pos = 0_usize;
    let mut min_pos = 0_usize;
    let mut kmer_span = 0_usize;

    let mut i = 0_usize;
    while i < seq.len() {
        let c = SEQ_NT4_TABLE[seq[i] as usize];
        let mut info = EMPTY_MM128;
        if c < 4 {
            if hpc {
                let mut skip_len = 1;
                if i + 1 < seq.len() && SEQ_NT4_TABLE[seq[i + 1] as usize] == c {
                    skip_len = 2;
                    while i + skip_len < seq.len() && SEQ_NT4_TABLE[seq[i + skip_len] as usize] == c
                    {
                        skip_len += 1;
                    }
                    // i points at the last base of the run
                    i += skip_len - 1;
                }
                run_lens.push_back(skip_len);
                kmer_span += skip_len;
                if run_lens.len() > k {
                    kmer_span -= run_lens.pop_front().unwrap_or(0);
                }
            } else {
                kmer_span = if l + 1 < k { l + 1 } else { k };
            }
            let c = c as u64;
            kmer[0] = (kmer[0] << 2 | c) & mask;
            kmer[1] = (kmer[1] >> 2) | (3 ^ c) << shift1;
            if kmer[0] == kmer[1] {
                i += 1;
                continue;
            }
            let z = if kmer[0] < kmer[1] { 0 } else { 1 };
            l += 1;
            if l >= k && kmer_span < 256 {
                info.x = hash64(kmer[z], mask) << 8 | kmer_span as u64;
                info.y = (rid as u64) << 32 | (i as u32 as u64) << 1 | z as u64;
            }
        } else {
            l = 0;
            run_lens.clear();
            kmer_span = 0;
        }
        buf[buf_pos] = info;

        // the first full window: ties with the minimum have not been written yet
        if l == w + k - 1 && min.x != u64::MAX {
            for j in (buf_pos + 1..w).chain(0..buf_pos) {
                if min.x == buf[j].x && buf[j].y != min.y {
                    mins.push(buf[j]);
                }
            }
        }
        if info.x <= min.x {
            if l >= w + k && min.x != u64::MAX {
                mins.push(min);
            }
            min = info;
            min_pos = buf_pos;
        } else if buf_pos == min_pos {
            // the old minimum left the window
            if l >= w + k - 1 && min.x != u64::MAX {
                mins.push(min);
            }
            min.x = u64::MAX;
            // scan oldest to newest, `>=` keeps the closest of tied k-mers
            for j in (buf_pos + 1..w).chain(0..=buf_pos) {
                if min.x >= buf[j].x {
                    min = buf[j];
                    min_pos = j;
                }
            }
            if l >= w + k - 1 && min.x != u64::MAX {
                for j in (buf_pos + 1..w).chain(0..=buf_pos) {
                    if min.x == buf[j].x && min.y != buf[j].y {
                        mins.push(buf[j]);
                    }
                }
            }
        }
        buf_pos += 1;
        if buf_pos == w {
            buf_pos = 0;
        }
        i += 1;
    }
    if min.x != u64::MAX {
        mins.push(min);
    }
    mins
}

/// 2-bit forward encoding of a k-mer, A=0 C=1 G=2 T=3.
pub fn encode_kmer(kmer: &[u8]) -> Option<u64> {
    kmer.iter().try_fold(0_u64, |acc, &b| {
        let c = SEQ_NT4_TABLE[b as usize];
        if c < 4 {
            Some(acc << 2 | c as u64)
        } else {
            None
        }
    })
}

/// The `x >> 8` value the sketcher assigns to `kmer`, whichever strand it is read from.
pub fn kmer_to_minimizer_hash(kmer: &[u8]) -> Option<u64> {
    let k = kmer.len();
    if k == 0 || k > 28 {
        return None;
    }
    let mask = (1_u64 << (2 * k)) - 1;
    let fwd = encode_kmer(kmer)?;
    let rev = kmer.iter().try_fold(0_u64, |acc, &b| {
        let c = SEQ_NT4_TABLE[b as usize];
        if c < 4 {
            Some(acc >> 2 | (3 ^ c as u64) << (2 * (k - 1)))
        } else {
            None
        }
    })?;
    Some(hash64(fwd.min(rev), mask))
}
