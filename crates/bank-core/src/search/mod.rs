//! Search primitives shared by `recall`: vector index, FTS5 query
//! sanitization, and reciprocal rank fusion across retrievers.

mod fts;
mod fusion;
mod vector;

pub use fts::sanitize_fts5_query;
pub use fusion::{reciprocal_rank_fusion, RRF_K};
pub use vector::{VectorIndex, VectorSearchError};
