//! Recovery — operator-driven retransmission of missing symbols.
//!
//! There is no back channel from receiver to sender. The receiver shows
//! its missing indices, the operator types them into the sender, and the
//! sender restarts its scheduler on just those indices.

use serde::{Deserialize, Serialize};

/// Maximum indices in one resend pass. Longer lists are split so that a
/// single pass stays short enough to watch on screen.
pub const MAX_RESEND_INDICES: usize = 512;

/// A list of symbol indices to send again, in the order given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResendRequest {
    pub indices: Vec<u32>,
}

impl ResendRequest {
    pub fn new(indices: Vec<u32>) -> Result<Self, ResendError> {
        if indices.is_empty() {
            return Err(ResendError::Empty);
        }
        Ok(Self { indices })
    }

    /// Parse an operator-typed list such as `"3, 7,12"`.
    ///
    /// Items that are not non-negative integers are skipped. A list with
    /// no usable items is an error.
    pub fn parse(input: &str) -> Result<Self, ResendError> {
        let indices = input
            .split(',')
            .filter_map(|item| item.trim().parse::<u32>().ok())
            .collect();
        Self::new(indices)
    }

    /// Split into passes of at most `MAX_RESEND_INDICES`.
    pub fn batches(&self) -> impl Iterator<Item = &[u32]> {
        self.indices.chunks(MAX_RESEND_INDICES)
    }

    /// Render back into the comma-separated form an operator would type.
    pub fn to_list_string(&self) -> String {
        self.indices
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResendError {
    #[error("no valid indices to resend")]
    Empty,
}
