//! glint-core — shared types, wire records, and the sender-side encoding
//! pipeline. All other Glint crates depend on this one.

pub mod block;
pub mod config;
pub mod encoder;
pub mod recovery;
pub mod wire;

pub use block::{split_blocks, Block};
pub use encoder::{EncodingPolicy, SymbolEncoder};
pub use wire::{Symbol, WireError, WireFormat};
