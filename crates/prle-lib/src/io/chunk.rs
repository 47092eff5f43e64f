use anyhow::{Context, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Byte range of a file owned by one rank.
///
/// The file is split into `size` contiguous ranges. Every rank gets
/// `file_size / size` bytes and the first `file_size % size` ranks get one
/// extra byte, so when the file is smaller than the rank count the empty
/// ranges are always the highest-indexed ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkLayout {
    pub rank: usize,
    pub size: usize,
    pub file_size: u64,
    pub offset_start: u64,
    pub chunk_size: u64,
}

impl ChunkLayout {
    /// Compute the range for `rank` out of `size` ranks.
    pub fn new(file_size: u64, rank: usize, size: usize) -> Self {
        debug_assert!(size > 0 && rank < size, "rank {rank} out of {size}");
        let ranks = size as u64;
        let r = rank as u64;
        let base = file_size / ranks;
        let remainder = file_size % ranks;
        let chunk_size = base + u64::from(r < remainder);
        let offset_start = r * base + r.min(remainder);
        Self { rank, size, file_size, offset_start, chunk_size }
    }

    /// One past the last owned byte.
    pub fn end(&self) -> u64 {
        self.offset_start + self.chunk_size
    }

    pub fn is_last(&self) -> bool {
        self.rank + 1 == self.size
    }

    /// Bytes that can be read past the owned range, for a lookahead of `width`.
    pub fn lookahead_len(&self, width: usize) -> u64 {
        if self.is_last() {
            0
        } else {
            (width as u64).min(self.file_size - self.end())
        }
    }
}

/// A rank's owned bytes followed by its lookahead bytes.
#[derive(Clone, Debug)]
pub struct RawChunk {
    layout: ChunkLayout,
    data: Vec<u8>,
}

impl RawChunk {
    /// Read this rank's range of `path`, plus up to `lookahead` bytes of the
    /// next range.
    pub fn read(path: &Path, rank: usize, size: usize, lookahead: usize) -> Result<Self> {
        let mut file = File::open(path)
            .with_context(|| format!("Failed to open input file: {:?}", path))?;
        let file_size = file
            .metadata()
            .with_context(|| format!("Failed to get size of input file: {:?}", path))?
            .len();

        let layout = ChunkLayout::new(file_size, rank, size);
        let read_len = layout.chunk_size + layout.lookahead_len(lookahead);
        let read_len = usize::try_from(read_len)
            .with_context(|| format!("Chunk of {} bytes does not fit in memory", read_len))?;

        let mut data = vec![0u8; read_len];
        file.seek(SeekFrom::Start(layout.offset_start))?;
        file.read_exact(&mut data).with_context(|| {
            format!(
                "Failed to read {} bytes at offset {} from {:?}",
                read_len, layout.offset_start, path
            )
        })?;

        Ok(Self { layout, data })
    }

    /// Build a chunk from bytes already in memory; `file` is the whole file.
    pub fn from_file_bytes(file: &[u8], rank: usize, size: usize, lookahead: usize) -> Self {
        let layout = ChunkLayout::new(file.len() as u64, rank, size);
        let start = layout.offset_start as usize;
        let end = (layout.end() + layout.lookahead_len(lookahead)) as usize;
        Self { layout, data: file[start..end].to_vec() }
    }

    pub fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    /// Owned bytes followed by the lookahead.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// The bytes this rank owns.
    pub fn owned(&self) -> &[u8] {
        &self.data[..self.layout.chunk_size as usize]
    }

    /// Bytes past the owned range; never emitted as this rank's data.
    pub fn lookahead(&self) -> &[u8] {
        &self.data[self.layout.chunk_size as usize..]
    }

    pub fn first_byte(&self) -> Option<u8> {
        self.owned().first().copied()
    }

    pub fn last_byte(&self) -> Option<u8> {
        self.owned().last().copied()
    }

    /// First byte of the next rank's range, if any.
    pub fn lookahead_byte(&self) -> Option<u8> {
        self.lookahead().first().copied()
    }
}
