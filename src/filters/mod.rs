//! Content filters: reduce cleaned HTML to the parts worth keeping.
//!
//! Both variants share one contract: `filter(html) -> reduced html`. BM25
//! ranks text chunks against a query derived from the page (or supplied by
//! the caller); density pruning walks the DOM and drops low-signal subtrees.

mod bm25;
mod pruning;

pub use bm25::Bm25Filter;
pub use pruning::{PruningFilter, PruningThreshold};

use anyhow::Result;

/// A content filter, dispatched by variant.
#[derive(Debug, Clone)]
pub enum ContentFilter {
    Bm25(Bm25Filter),
    Pruning(PruningFilter),
}

impl ContentFilter {
    /// Reduce `html` to its relevant portion.
    pub fn filter(&self, html: &str) -> Result<String> {
        match self {
            Self::Bm25(f) => f.filter(html),
            Self::Pruning(f) => f.filter(html),
        }
    }
}

impl From<Bm25Filter> for ContentFilter {
    fn from(filter: Bm25Filter) -> Self {
        Self::Bm25(filter)
    }
}

impl From<PruningFilter> for ContentFilter {
    fn from(filter: PruningFilter) -> Self {
        Self::Pruning(filter)
    }
}
