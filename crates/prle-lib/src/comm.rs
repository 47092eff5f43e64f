//! In-process rank runtime.
//!
//! A job is `size` ranks, each running on its own scoped thread with its own
//! [`Communicator`]. Ranks share no mutable state: everything they exchange
//! goes through one FIFO channel per ordered pair of ranks. Sends are buffered
//! and never block, so ranks may post their neighbour messages in any order.
//!
//! When a rank returns (or fails) its channel ends are dropped. A peer blocked
//! on a receive from it then gets [`CommError::Disconnected`], which is how a
//! fatal error on one rank brings down the whole job.

use anyhow::Result;
use std::sync::mpsc::{channel, Receiver, Sender};
use thiserror::Error;
use tracing::info_span;

/// Rank that collects results and performs output I/O.
pub const ROOT_RANK: usize = 0;

/// Everything ranks send to each other.
#[derive(Debug)]
pub enum Message {
    /// Last raw byte of the sender's chunk (`None` for an empty chunk).
    BoundaryByte(Option<u8>),
    /// Leading bytes of the sender's chunk that belong to the receiver's run.
    FusionLength(u64),
    /// Bytes at the start of the receiver's compressed range that belong to a
    /// token started by an earlier rank.
    EntryOffset(u64),
    /// Size of the buffer about to be sent to the root.
    BufferLength(u64),
    /// A rank's finished output buffer.
    Buffer(Vec<u8>),
}

impl Message {
    fn kind(&self) -> &'static str {
        match self {
            Message::BoundaryByte(_) => "boundary byte",
            Message::FusionLength(_) => "fusion length",
            Message::EntryOffset(_) => "entry offset",
            Message::BufferLength(_) => "buffer length",
            Message::Buffer(_) => "buffer",
        }
    }
}

#[derive(Debug, Error)]
pub enum CommError {
    #[error("rank {peer} disconnected")]
    Disconnected { peer: usize },
    #[error("expected {expected} from rank {peer}, got {found}")]
    UnexpectedMessage {
        peer: usize,
        expected: &'static str,
        found: &'static str,
    },
    #[error("rank {peer} is out of range for a job of {size} ranks")]
    InvalidRank { peer: usize, size: usize },
}

/// One rank's view of the job.
pub struct Communicator {
    rank: usize,
    size: usize,
    /// Indexed by destination rank.
    outboxes: Vec<Sender<Message>>,
    /// Indexed by source rank.
    inboxes: Vec<Receiver<Message>>,
}

impl Communicator {
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_root(&self) -> bool {
        self.rank == ROOT_RANK
    }

    /// Left neighbour.
    pub fn prev(&self) -> Option<usize> {
        self.rank.checked_sub(1)
    }

    /// Right neighbour.
    pub fn next(&self) -> Option<usize> {
        Some(self.rank + 1).filter(|&r| r < self.size)
    }

    /// Post `message` to `dest`. Never blocks.
    pub fn send(&self, dest: usize, message: Message) -> Result<()> {
        let outbox = self
            .outboxes
            .get(dest)
            .ok_or(CommError::InvalidRank { peer: dest, size: self.size })?;
        outbox
            .send(message)
            .map_err(|_| CommError::Disconnected { peer: dest })?;
        Ok(())
    }

    /// Block until the next message from `source` arrives.
    pub fn recv(&self, source: usize) -> Result<Message> {
        let inbox = self
            .inboxes
            .get(source)
            .ok_or(CommError::InvalidRank { peer: source, size: self.size })?;
        Ok(inbox.recv().map_err(|_| CommError::Disconnected { peer: source })?)
    }

    pub fn recv_boundary_byte(&self, source: usize) -> Result<Option<u8>> {
        match self.recv(source)? {
            Message::BoundaryByte(byte) => Ok(byte),
            other => Err(unexpected(source, "boundary byte", &other)),
        }
    }

    pub fn recv_fusion_length(&self, source: usize) -> Result<u64> {
        match self.recv(source)? {
            Message::FusionLength(len) => Ok(len),
            other => Err(unexpected(source, "fusion length", &other)),
        }
    }

    pub fn recv_entry_offset(&self, source: usize) -> Result<u64> {
        match self.recv(source)? {
            Message::EntryOffset(offset) => Ok(offset),
            other => Err(unexpected(source, "entry offset", &other)),
        }
    }

    pub fn recv_buffer_length(&self, source: usize) -> Result<u64> {
        match self.recv(source)? {
            Message::BufferLength(len) => Ok(len),
            other => Err(unexpected(source, "buffer length", &other)),
        }
    }

    pub fn recv_buffer(&self, source: usize) -> Result<Vec<u8>> {
        match self.recv(source)? {
            Message::Buffer(buf) => Ok(buf),
            other => Err(unexpected(source, "buffer", &other)),
        }
    }
}

fn unexpected(peer: usize, expected: &'static str, found: &Message) -> anyhow::Error {
    CommError::UnexpectedMessage { peer, expected, found: found.kind() }.into()
}

/// Run `rank_fn` on `size` ranks and return their results in rank order.
///
/// Each rank runs on a named scoped thread inside a `rank` tracing span. A
/// panicking rank is reported as an error for that rank.
pub fn launch<T, F>(size: usize, rank_fn: F) -> Vec<Result<T>>
where
    T: Send,
    F: Fn(Communicator) -> Result<T> + Sync,
{
    let mut outboxes: Vec<Vec<Sender<Message>>> = (0..size).map(|_| Vec::with_capacity(size)).collect();
    let mut inboxes: Vec<Vec<Receiver<Message>>> = (0..size).map(|_| Vec::with_capacity(size)).collect();
    for src in 0..size {
        for dst in 0..size {
            let (tx, rx) = channel();
            outboxes[src].push(tx);
            inboxes[dst].push(rx);
        }
    }

    let communicators: Vec<Communicator> = outboxes
        .into_iter()
        .zip(inboxes)
        .enumerate()
        .map(|(rank, (outboxes, inboxes))| Communicator { rank, size, outboxes, inboxes })
        .collect();

    std::thread::scope(|scope| {
        let rank_fn = &rank_fn;
        let handles: Vec<_> = communicators
            .into_iter()
            .map(|comm| {
                let rank = comm.rank;
                let handle = std::thread::Builder::new()
                    .name(format!("rank-{}", rank))
                    .spawn_scoped(scope, move || {
                        let _span = info_span!("rank", rank).entered();
                        rank_fn(comm)
                    });
                (rank, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(rank, handle)| match handle {
                Ok(handle) => handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("rank {} panicked", rank))),
                Err(e) => Err(anyhow::Error::new(e).context(format!("Failed to spawn rank {}", rank))),
            })
            .collect()
    })
}

/// Collapse per-rank results into one.
///
/// Disconnections are a consequence of another rank failing, so the first
/// error in rank order that is not a disconnection is reported.
pub fn first_failure<T>(results: Vec<Result<T>>) -> Result<Vec<T>> {
    let mut values = Vec::with_capacity(results.len());
    let mut disconnected = None;
    let mut root_cause = None;

    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(e) if is_disconnect(&e) => {
                disconnected.get_or_insert(e);
            }
            Err(e) => {
                root_cause.get_or_insert(e);
            }
        }
    }

    match root_cause.or(disconnected) {
        Some(e) => Err(e),
        None => Ok(values),
    }
}

fn is_disconnect(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<CommError>(), Some(CommError::Disconnected { .. }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_results_in_rank_order() {
        let results = launch(4, |comm| Ok(comm.rank() * 10));
        let values = first_failure(results).unwrap();
        assert_eq!(values, vec![0, 10, 20, 30]);
    }

    #[test]
    fn test_neighbours() {
        let results = launch(3, |comm| Ok((comm.prev(), comm.next())));
        let values = first_failure(results).unwrap();
        assert_eq!(values, vec![(None, Some(1)), (Some(0), Some(2)), (Some(1), None)]);
    }

    #[test]
    fn test_ring_exchange_does_not_deadlock() {
        // Every rank sends before receiving; buffered sends make this safe.
        let results = launch(8, |comm| {
            let right = (comm.rank() + 1) % comm.size();
            let left = (comm.rank() + comm.size() - 1) % comm.size();
            comm.send(right, Message::FusionLength(comm.rank() as u64))?;
            comm.recv_fusion_length(left)
        });
        let values = first_failure(results).unwrap();
        assert_eq!(values, vec![7, 0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_messages_are_fifo_per_pair() {
        let results = launch(2, |comm| {
            if comm.rank() == 1 {
                comm.send(0, Message::BufferLength(3))?;
                comm.send(0, Message::Buffer(vec![1, 2, 3]))?;
                Ok(Vec::new())
            } else {
                assert_eq!(comm.recv_buffer_length(1)?, 3);
                comm.recv_buffer(1)
            }
        });
        let values = first_failure(results).unwrap();
        assert_eq!(values[0], vec![1, 2, 3]);
    }

    #[test]
    fn test_unexpected_message_is_an_error() {
        let results = launch(2, |comm| {
            if comm.rank() == 0 {
                comm.send(1, Message::EntryOffset(1))?;
                Ok(())
            } else {
                comm.recv_fusion_length(0).map(|_| ())
            }
        });
        let err = first_failure(results).unwrap_err();
        assert!(err.to_string().contains("expected fusion length from rank 0, got entry offset"));
    }

    #[test]
    fn test_failure_propagates_as_root_cause() {
        let results = launch(3, |comm| {
            if comm.rank() == 2 {
                anyhow::bail!("cannot open input");
            }
            // Ranks 0 and 1 wait on rank 2, which never sends
            comm.recv_buffer(2).map(|_| ())
        });
        assert!(results[0].is_err() && results[1].is_err());
        let err = first_failure(results).unwrap_err();
        assert_eq!(err.to_string(), "cannot open input");
    }

    #[test]
    fn test_panicking_rank_is_reported() {
        let results = launch(2, |comm| {
            if comm.rank() == 1 {
                panic!("boom");
            }
            Ok(())
        });
        assert!(results[0].is_ok());
        assert!(results[1].as_ref().unwrap_err().to_string().contains("rank 1 panicked"));
    }

    #[test]
    fn test_invalid_rank() {
        let results = launch(1, |comm| comm.send(5, Message::FusionLength(0)));
        let err = first_failure(results).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }
}
