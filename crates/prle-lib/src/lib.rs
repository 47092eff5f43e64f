//! Parallel run-length encoding.
//!
//! A file is split into one contiguous chunk per rank. Each rank encodes its
//! chunk independently, then neighbouring ranks reconcile the runs that cross
//! their shared boundary, so the gathered output is byte-identical to
//! encoding the whole file in one pass.

pub mod cli;
pub mod comm;
pub mod compression;
pub mod io;

pub use compression::{compress, decompress, RunReport};
