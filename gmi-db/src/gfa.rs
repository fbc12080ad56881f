//! Segment graphs read from GFA 1.
//!
//! Only `S` and `L` records are used. A link keeps the overlap it declares so
//! the index builder can refuse graphs whose segments overlap.

use crate::errors::GraphError;
use flate2::bufread::MultiGzDecoder;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};

#[derive(Debug, Clone)]
pub struct Segment {
    pub name: String,
    pub seq: Vec<u8>,
    /// from `LN:i:` when the sequence is given as `*`
    pub len: usize,
}

impl Segment {
    pub fn new(name: &str, seq: &[u8]) -> Self {
        Segment {
            name: name.to_string(),
            seq: seq.to_vec(),
            len: seq.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub from: u32,
    pub from_rev: bool,
    pub to: u32,
    pub to_rev: bool,
    /// overlap length on `from`
    pub ov: u32,
    /// overlap length on `to`
    pub ow: u32,
}

impl Link {
    pub fn new(from: u32, from_rev: bool, to: u32, to_rev: bool) -> Self {
        Link {
            from,
            from_rev,
            to,
            to_rev,
            ov: 0,
            ow: 0,
        }
    }

    pub fn has_overlap(&self) -> bool {
        self.ov != 0 || self.ow != 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub segs: Vec<Segment>,
    pub links: Vec<Link>,
    seg_ids: FxHashMap<String, u32>,
}

impl Graph {
    pub fn new(segs: Vec<Segment>, links: Vec<Link>) -> Self {
        let mut seg_ids = FxHashMap::<String, u32>::default();
        segs.iter().enumerate().for_each(|(sid, s)| {
            seg_ids.entry(s.name.clone()).or_insert(sid as u32);
        });
        Graph {
            segs,
            links,
            seg_ids,
        }
    }

    /// Read a GFA file, gzip-compressed or not.
    pub fn from_gfa_file(filepath: &str) -> Result<Self, GraphError> {
        let open = |filepath: &str| -> Result<BufReader<File>, GraphError> {
            File::open(filepath)
                .map(BufReader::new)
                .map_err(|source| GraphError::Open {
                    path: filepath.to_string(),
                    source,
                })
        };
        let mut reader = open(filepath)?;
        let mut is_gzfile = false;
        {
            let r = reader.by_ref();
            let mut buf = Vec::<u8>::new();
            let _ = r.take(2).read_to_end(&mut buf);
            if buf == [0x1F_u8, 0x8B_u8] {
                log::info!("input file: {} detected as gz-compressed file", filepath);
                is_gzfile = true;
            }
        }
        drop(reader);

        let reader = open(filepath)?;
        let graph = if is_gzfile {
            Self::from_gfa_reader(BufReader::new(MultiGzDecoder::new(reader)))?
        } else {
            Self::from_gfa_reader(reader)?
        };
        log::info!(
            "graph {}: {} segments, {} links",
            filepath,
            graph.segs.len(),
            graph.links.len()
        );
        Ok(graph)
    }

    pub fn from_gfa_reader<R: BufRead>(reader: R) -> Result<Self, GraphError> {
        let mut segs = Vec::<Segment>::new();
        let mut seg_ids = FxHashMap::<String, u32>::default();
        // links may come before the segments they name
        let mut raw_links = Vec::<(usize, String, bool, String, bool, u32, u32)>::new();

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let lineno = i + 1;
            let parse_err = |msg: &str| GraphError::Parse {
                line: lineno,
                msg: msg.to_string(),
            };
            let fields = line.trim_end().split('\t').collect::<Vec<&str>>();
            match fields[0] {
                "S" => {
                    if fields.len() < 3 {
                        return Err(parse_err("S line needs a name and a sequence"));
                    }
                    let name = fields[1].to_string();
                    if seg_ids.contains_key(&name) {
                        return Err(parse_err(&format!("duplicated segment {}", name)));
                    }
                    let seq = if fields[2] == "*" {
                        vec![]
                    } else {
                        fields[2].as_bytes().to_vec()
                    };
                    let mut len = seq.len();
                    if let Some(ln) = fields[3..].iter().find_map(|t| t.strip_prefix("LN:i:")) {
                        let ln = ln
                            .parse::<usize>()
                            .map_err(|_| parse_err(&format!("bad LN tag {}", ln)))?;
                        if !seq.is_empty() && ln != seq.len() {
                            log::warn!(
                                "segment {}: LN:i:{} but the sequence has {} bases",
                                name,
                                ln,
                                seq.len()
                            );
                        } else {
                            len = ln;
                        }
                    }
                    seg_ids.insert(name.clone(), segs.len() as u32);
                    segs.push(Segment { name, seq, len });
                }
                "L" => {
                    if fields.len() < 6 {
                        return Err(parse_err("L line needs 5 fields"));
                    }
                    let orientation = |o: &str| match o {
                        "+" => Ok(false),
                        "-" => Ok(true),
                        _ => Err(parse_err(&format!("bad orientation {}", o))),
                    };
                    let from_rev = orientation(fields[2])?;
                    let to_rev = orientation(fields[4])?;
                    let (ov, ow) = cigar_to_overlap(fields[5])
                        .ok_or_else(|| parse_err(&format!("bad overlap {}", fields[5])))?;
                    raw_links.push((
                        lineno,
                        fields[1].to_string(),
                        from_rev,
                        fields[3].to_string(),
                        to_rev,
                        ov,
                        ow,
                    ));
                }
                _ => {}
            }
        }

        let mut links = Vec::<Link>::with_capacity(raw_links.len());
        for (lineno, from, from_rev, to, to_rev, ov, ow) in raw_links.into_iter() {
            let seg_id = |name: &str| {
                seg_ids.get(name).copied().ok_or_else(|| GraphError::Parse {
                    line: lineno,
                    msg: format!("link to unknown segment {}", name),
                })
            };
            links.push(Link {
                from: seg_id(&from)?,
                from_rev,
                to: seg_id(&to)?,
                to_rev,
                ov,
                ow,
            });
        }

        Ok(Graph {
            segs,
            links,
            seg_ids,
        })
    }

    pub fn seg_id(&self, name: &str) -> Option<u32> {
        self.seg_ids.get(name).copied()
    }

    pub fn seg_name(&self, sid: u32) -> Option<&str> {
        self.segs.get(sid as usize).map(|s| s.name.as_str())
    }

    pub fn total_len(&self) -> usize {
        self.segs.iter().map(|s| s.len).sum()
    }

    pub fn count_overlapping_links(&self) -> usize {
        self.links.iter().filter(|l| l.has_overlap()).count()
    }

    pub fn has_overlap(&self) -> bool {
        self.links.iter().any(|l| l.has_overlap())
    }
}

/// Overlap lengths on the two ends of a link, `*` counting as no overlap.
pub fn cigar_to_overlap(cigar: &str) -> Option<(u32, u32)> {
    if cigar == "*" {
        return Some((0, 0));
    }
    let mut ov = 0_u32;
    let mut ow = 0_u32;
    let mut n = 0_u32;
    let mut has_len = false;
    for c in cigar.chars() {
        if let Some(d) = c.to_digit(10) {
            n = n.checked_mul(10)?.checked_add(d)?;
            has_len = true;
            continue;
        }
        if !has_len {
            return None;
        }
        match c {
            'M' | '=' | 'X' => {
                ov += n;
                ow += n;
            }
            'D' | 'N' => ov += n,
            'I' | 'S' => ow += n,
            _ => return None,
        }
        n = 0;
        has_len = false;
    }
    if has_len {
        return None;
    }
    Some((ov, ow))
}
