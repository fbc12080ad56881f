const VERSION_STRING: &str = env!("VERSION_STRING");
use clap::{self, CommandFactory, Parser};
use gmi_db::gfa::Graph;
use gmi_db::index::{GraphIndex, IndexSpec, I_HPC};
use gmi_db::sketch::sequence_to_minimizers;
use simple_logger::SimpleLogger;
use std::io::{self, BufWriter, Write};

/// Build the minimizer index of a GFA graph and report on it
#[derive(Parser, Debug)]
#[clap(name = "gmi-index")]
#[clap(author, version)]
#[clap(about, long_about = None)]
struct CmdOptions {
    /// the path to the input GFA file (plain or gzip-compressed)
    gfa_path: String,
    /// minimizer window size
    #[clap(short, default_value_t = 11)]
    w: u32,
    /// minimizer k-mer size
    #[clap(short, default_value_t = 17)]
    k: u32,
    /// use 2^b buckets
    #[clap(short, long, default_value_t = 14)]
    bucket_bits: u32,
    /// use homopolymer-compressed k-mers
    #[clap(long)]
    hpc: bool,
    /// number of threads used in parallel, default to "0" using all CPUs available or the number set by RAYON_NUM_THREADS
    #[clap(long, default_value_t = 0)]
    number_of_thread: usize,
    /// report the occurrence cut-off that leaves out this fraction of the most repetitive minimizers
    #[clap(long, default_value_t = 2e-4)]
    max_occ_frac: f64,
    /// write every minimizer and its positions to stdout
    #[clap(long)]
    dump: bool,
    /// a sequence to look up in the index
    #[clap(long, short)]
    query: Option<String>,
    /// log progress and statistics
    #[clap(long, short)]
    verbose: bool,
}

fn format_position(graph: &Graph, y: u64) -> String {
    let sid = (y >> 32) as u32;
    let pos = (y & 0xFFFFFFFF) >> 1;
    let strand = if y & 1 == 0 { '+' } else { '-' };
    let name = graph.seg_name(sid).unwrap_or("*");
    format!("{}:{}:{}", name, pos, strand)
}

fn dump_index(gi: &GraphIndex, out: &mut dyn Write) -> Result<(), std::io::Error> {
    let mut entries = gi.iter().collect::<Vec<_>>();
    entries.sort_unstable_by_key(|(hash, _)| *hash);
    entries.into_iter().try_for_each(|(hash, ys)| {
        let positions = ys
            .iter()
            .map(|&y| format_position(gi.graph(), y))
            .collect::<Vec<_>>()
            .join(",");
        writeln!(out, "M\t{:016x}\t{}\t{}", hash, ys.len(), positions)
    })
}

fn query_index(
    gi: &GraphIndex,
    seq: &[u8],
    max_occ: u32,
    out: &mut dyn Write,
) -> Result<(), std::io::Error> {
    let spec = gi.spec;
    sequence_to_minimizers(seq, spec.w, spec.k, 0, spec.is_hpc())
        .iter()
        .try_for_each(|m| {
            let hits = gi.get(m.x);
            let skipped = hits.len() as u32 >= max_occ;
            writeln!(
                out,
                "Q\t{}\t{}\t{:016x}\t{}{}",
                m.pos(),
                if m.strand() == 0 { '+' } else { '-' },
                m.hash(),
                hits.len(),
                if skipped { "\tskipped" } else { "" }
            )?;
            if !skipped {
                hits.iter().try_for_each(|&y| {
                    writeln!(out, "H\t{}\t{}", m.pos(), format_position(gi.graph(), y))
                })?;
            }
            Ok(())
        })
}

fn main() -> Result<(), std::io::Error> {
    CmdOptions::command().version(VERSION_STRING).get_matches();
    let args = CmdOptions::parse();

    SimpleLogger::new()
        .with_level(if args.verbose {
            log::LevelFilter::Info
        } else {
            log::LevelFilter::Warn
        })
        .init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    let spec = IndexSpec {
        w: args.w,
        k: args.k,
        bucket_bits: args.bucket_bits,
        flag: if args.hpc { I_HPC } else { 0 },
    };

    let gi = GraphIndex::build_from_file(&args.gfa_path, spec, args.number_of_thread)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    let stats = gi.stat();
    let max_occ = gi.cal_max_occ(args.max_occ_frac);
    log::info!("max occurrences: {}", max_occ);

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    writeln!(
        out,
        "#\tsegments:{}\tdistinct:{}\tsingletons:{}\tpositions:{}\tmax_occ:{}",
        gi.graph().segs.len(),
        stats.n_keys,
        stats.n_singletons,
        stats.n_positions,
        max_occ
    )?;
    if args.dump {
        dump_index(&gi, &mut out)?;
    }
    if let Some(query) = args.query {
        query_index(&gi, query.as_bytes(), max_occ, &mut out)?;
    }
    out.flush()?;
    Ok(())
}
