use crate::gfa::Graph;
use std::fmt;
use std::io;
use thiserror::Error;

/// Failure to obtain a graph from GFA input
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("can't open graph file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("error reading graph: {0}")]
    Read(#[from] io::Error),
    #[error("malformed GFA at line {line}: {msg}")]
    Parse { line: usize, msg: String },
}

#[derive(Error, Debug)]
pub enum IndexError {
    /// Links that declare an overlap; the index assumes segments abut exactly.
    #[error("{0} link(s) with non-zero overlap, overlapping segments can't be indexed")]
    OverlappingLinks(usize),
    #[error("invalid index parameters: {0}")]
    InvalidSpec(String),
    #[error("failed to start the worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// A rejected build. The graph that was passed in is handed back untouched.
#[derive(Error)]
#[error("{error}")]
pub struct BuildFailure {
    #[source]
    pub error: IndexError,
    pub graph: Graph,
}

impl BuildFailure {
    pub fn new(error: IndexError, graph: Graph) -> Self {
        BuildFailure { error, graph }
    }

    pub fn into_parts(self) -> (IndexError, Graph) {
        (self.error, self.graph)
    }
}

impl fmt::Debug for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildFailure")
            .field("error", &self.error)
            .field("n_segs", &self.graph.segs.len())
            .field("n_links", &self.graph.links.len())
            .finish()
    }
}

impl From<BuildFailure> for IndexError {
    fn from(failure: BuildFailure) -> Self {
        failure.error
    }
}
