//! Qdrant-backed implementation of the C3 vector index seam defined in
//! `memsys_core::traits::VectorIndex`.

pub mod error;
pub mod index;

pub use error::{Result, VectorError};
pub use index::{QdrantVectorIndex, DEFAULT_COLLECTION};
