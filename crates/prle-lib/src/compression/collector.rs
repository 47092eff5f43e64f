//! Gathers every rank's output buffer at the root, in rank order.

use anyhow::Result;
use std::path::Path;
use tracing::{error, info};

use crate::comm::{Communicator, Message, ROOT_RANK};
use crate::io;

/// Exclusive prefix sum of `lengths`: where each rank's bytes start.
pub fn displacements(lengths: &[usize]) -> Vec<usize> {
    lengths
        .iter()
        .scan(0usize, |offset, &len| {
            let start = *offset;
            *offset += len;
            Some(start)
        })
        .collect()
}

/// Send `local` to the root. The root returns the concatenation of all
/// buffers in rank order; every other rank returns `None`.
pub fn gather(comm: &Communicator, local: Vec<u8>) -> Result<Option<Vec<u8>>> {
    if !comm.is_root() {
        comm.send(ROOT_RANK, Message::BufferLength(local.len() as u64))?;
        comm.send(ROOT_RANK, Message::Buffer(local))?;
        return Ok(None);
    }

    let mut lengths = Vec::with_capacity(comm.size());
    lengths.push(local.len());
    for source in 1..comm.size() {
        lengths.push(comm.recv_buffer_length(source)? as usize);
    }

    let displs = displacements(&lengths);
    let total: usize = lengths.iter().sum();
    let mut global = vec![0u8; total];
    global[..local.len()].copy_from_slice(&local);

    for source in 1..comm.size() {
        let buf = comm.recv_buffer(source)?;
        if buf.len() != lengths[source] {
            anyhow::bail!(
                "rank {} announced {} bytes but sent {}",
                source,
                lengths[source],
                buf.len()
            );
        }
        let start = displs[source];
        global[start..start + buf.len()].copy_from_slice(&buf);
    }

    Ok(Some(global))
}

/// Gather at the root and write the result to `output`.
///
/// Only the root touches the output file. Returns the number of bytes
/// written, which is zero on every other rank.
pub fn gather_and_write(comm: &Communicator, local: Vec<u8>, output: &Path) -> Result<usize> {
    let Some(global) = gather(comm, local)? else {
        return Ok(0);
    };

    if let Err(e) = io::write_file(output, &global) {
        error!("Could not write {:?}: {:#}", output, e);
        return Err(e);
    }
    info!("Wrote {} bytes to {:?}", global.len(), output);
    Ok(global.len())
}
