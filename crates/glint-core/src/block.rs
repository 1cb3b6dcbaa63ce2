//! Block splitting — the first stage of the sender pipeline.

use bytes::Bytes;

/// Default block size in bytes. Small enough that one block plus record
/// overhead fits a single optical symbol at the default render size.
pub const DEFAULT_BLOCK_SIZE: usize = 100;

/// A fixed-size slice of the original file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub index: u32,
    pub data: Bytes,
}

/// Split `data` into blocks of `block_size` bytes.
///
/// The last block holds the remainder and is not padded. Empty input
/// produces no blocks, which callers treat as "nothing to send".
///
/// # Panics
///
/// Panics if `block_size` is zero.
pub fn split_blocks(data: &[u8], block_size: usize) -> Vec<Block> {
    assert!(block_size > 0, "block size must be non-zero");
    let data = Bytes::copy_from_slice(data);
    (0..data.len())
        .step_by(block_size)
        .enumerate()
        .map(|(index, start)| Block {
            index: index as u32,
            data: data.slice(start..(start + block_size).min(data.len())),
        })
        .collect()
}

/// Number of blocks `len` bytes split into at `block_size`.
pub fn block_count(len: usize, block_size: usize) -> usize {
    len.div_ceil(block_size)
}
