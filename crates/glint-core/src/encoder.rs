//! Symbol encoding — turns blocks into the sequence the sender renders.

use bytes::Bytes;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::wire::Symbol;

/// Default over-provision factor for the redundant policy.
pub const DEFAULT_OVERPROVISION: u32 = 2;

/// How blocks map onto symbols. Part of the wire contract: the receiver
/// interprets payloads according to the policy the sender chose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EncodingPolicy {
    /// One symbol per block, `symbol[i].payload == block[i]`.
    #[default]
    Direct,

    /// `overprovision * blockCount` symbols, each the XOR of a random
    /// multiset of blocks.
    ///
    /// The combination mask is not transmitted, so a receiver cannot
    /// invert it. This is a best-effort mode: output is only correct when
    /// enough symbols happen to line up with individual blocks.
    Redundant { overprovision: u32 },
}

pub struct SymbolEncoder {
    policy: EncodingPolicy,
}

impl SymbolEncoder {
    pub fn new(policy: EncodingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> EncodingPolicy {
        self.policy
    }

    /// Number of symbols this policy produces for `block_count` blocks.
    pub fn symbol_count(&self, block_count: usize) -> usize {
        match self.policy {
            EncodingPolicy::Direct => block_count,
            EncodingPolicy::Redundant { overprovision } => block_count * overprovision as usize,
        }
    }

    /// Encode `blocks` into the full symbol sequence, tagging every symbol
    /// with `file_tag`. Zero blocks produce an empty sequence.
    pub fn encode(&self, blocks: &[Block], file_tag: &str) -> Vec<Symbol> {
        self.encode_with_rng(blocks, file_tag, &mut rand::thread_rng())
    }

    pub fn encode_with_rng<R: Rng>(
        &self,
        blocks: &[Block],
        file_tag: &str,
        rng: &mut R,
    ) -> Vec<Symbol> {
        let total = self.symbol_count(blocks.len()) as u32;
        match self.policy {
            EncodingPolicy::Direct => blocks
                .iter()
                .map(|block| Symbol {
                    index: block.index,
                    total,
                    file_tag: file_tag.to_string(),
                    payload: block.data.clone(),
                })
                .collect(),
            EncodingPolicy::Redundant { .. } => (0..total)
                .map(|index| Symbol {
                    index,
                    total,
                    file_tag: file_tag.to_string(),
                    payload: combine(blocks, rng),
                })
                .collect(),
        }
    }
}

/// XOR a random multiset of blocks: size uniform in `[1, n]`, members drawn
/// with replacement.
fn combine<R: Rng>(blocks: &[Block], rng: &mut R) -> Bytes {
    let count = rng.gen_range(1..=blocks.len());
    let selected: Vec<&Block> = (0..count)
        .map(|_| &blocks[rng.gen_range(0..blocks.len())])
        .collect();
    xor_blocks(&selected)
}

/// Byte-wise XOR; shorter blocks are treated as zero-padded to the longest.
pub fn xor_blocks(blocks: &[&Block]) -> Bytes {
    let len = blocks.iter().map(|b| b.data.len()).max().unwrap_or(0);
    let mut out = vec![0u8; len];
    for block in blocks {
        for (acc, byte) in out.iter_mut().zip(block.data.iter()) {
            *acc ^= byte;
        }
    }
    Bytes::from(out)
}
