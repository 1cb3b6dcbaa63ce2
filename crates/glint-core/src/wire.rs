//! Glint wire records — the text rendered into every optical symbol.
//!
//! A symbol travels as one JSON object. Two record layouts exist and a
//! receiver must accept both:
//!
//!   Legacy:  {"fileName": "report.pdf", "totalEncoded": 3, "index": 0, "chunk": [37, 80, ...]}
//!   Compact: {"ext": "pdf", "total": 3, "i": 0, "c": "JVBERi0xLjQK..."}
//!
//! Legacy carries the payload as an array of byte values, Compact as
//! standard base64 text. Field names ARE the protocol; renaming any of them
//! breaks interoperability with deployed senders.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

// ── Symbol ────────────────────────────────────────────────────────────────────

/// One transport unit, rendered and captured as a single visual code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Position in the symbol sequence. Under the redundant policy this is
    /// not a block index.
    pub index: u32,
    /// Declared cardinality of the whole symbol sequence.
    pub total: u32,
    /// File name (legacy) or extension (compact). Identifies the transfer.
    pub file_tag: String,
    pub payload: Bytes,
}

/// Record layout used on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    /// `fileName` / `totalEncoded` / `index` / `chunk` with a byte array payload.
    Legacy,
    /// `ext` / `total` / `i` / `c` with a base64 payload.
    #[default]
    Compact,
}

impl std::str::FromStr for WireFormat {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "legacy" => Ok(WireFormat::Legacy),
            "compact" => Ok(WireFormat::Compact),
            other => Err(WireError::UnknownFormat(other.to_string())),
        }
    }
}

// ── Records ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyRecord {
    pub file_name: String,
    pub total_encoded: u32,
    pub index: u32,
    /// The looping fountain sender emits this field as `data`.
    #[serde(alias = "data")]
    pub chunk: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactRecord {
    pub ext: String,
    pub total: u32,
    pub i: u32,
    pub c: String,
}

impl Symbol {
    /// Serialize this symbol as a record in the given layout.
    pub fn encode(&self, format: WireFormat) -> Result<String, WireError> {
        let text = match format {
            WireFormat::Legacy => serde_json::to_string(&LegacyRecord {
                file_name: self.file_tag.clone(),
                total_encoded: self.total,
                index: self.index,
                chunk: self.payload.to_vec(),
            }),
            WireFormat::Compact => serde_json::to_string(&CompactRecord {
                ext: self.file_tag.clone(),
                total: self.total,
                i: self.index,
                c: STANDARD.encode(&self.payload),
            }),
        };
        text.map_err(|e| WireError::Encode(e.to_string()))
    }

    /// Parse a captured record of either layout and validate it.
    pub fn decode(text: &str) -> Result<(Symbol, WireFormat), WireError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| WireError::Malformed(e.to_string()))?;
        if !value.is_object() {
            return Err(WireError::Malformed("record is not a JSON object".into()));
        }

        let compact = value.get("ext").is_some() || value.get("i").is_some();
        let (symbol, format) = if compact {
            let record: CompactRecord = serde_json::from_value(value)
                .map_err(|e| WireError::Malformed(e.to_string()))?;
            let payload = STANDARD
                .decode(record.c.as_bytes())
                .map_err(|e| WireError::InvalidBase64(e.to_string()))?;
            let symbol = Symbol {
                index: record.i,
                total: record.total,
                file_tag: record.ext,
                payload: Bytes::from(payload),
            };
            (symbol, WireFormat::Compact)
        } else {
            let record: LegacyRecord = serde_json::from_value(value)
                .map_err(|e| WireError::Malformed(e.to_string()))?;
            let symbol = Symbol {
                index: record.index,
                total: record.total_encoded,
                file_tag: record.file_name,
                payload: Bytes::from(record.chunk),
            };
            (symbol, WireFormat::Legacy)
        };

        symbol.validate()?;
        Ok((symbol, format))
    }

    fn validate(&self) -> Result<(), WireError> {
        if self.file_tag.is_empty() {
            return Err(WireError::MissingTag);
        }
        if self.total == 0 {
            return Err(WireError::ZeroTotal);
        }
        if self.index >= self.total {
            return Err(WireError::IndexOutOfRange {
                index: self.index,
                total: self.total,
            });
        }
        Ok(())
    }
}

// ── File tags ─────────────────────────────────────────────────────────────────

/// The tag a sender puts on every symbol for `file_name`.
///
/// Legacy records carry the whole name. Compact records carry only the
/// text after the last dot; the whole name when there is no dot or nothing
/// follows it, since an empty tag is never accepted.
pub fn file_tag(file_name: &str, format: WireFormat) -> String {
    match format {
        WireFormat::Legacy => file_name.to_string(),
        WireFormat::Compact => file_name
            .rsplit('.')
            .next()
            .filter(|ext| !ext.is_empty())
            .unwrap_or(file_name)
            .to_string(),
    }
}

/// Name a receiver should save a completed transfer under.
///
/// Tags come off a camera, so anything that looks like a path is reduced
/// to its final component.
pub fn suggested_file_name(tag: &str, format: WireFormat) -> String {
    let base = std::path::Path::new(tag)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("unknown");
    match format {
        WireFormat::Legacy => base.to_string(),
        WireFormat::Compact => format!("received_file.{base}"),
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting a captured record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),

    #[error("record has an empty file tag")]
    MissingTag,

    #[error("record declares zero total symbols")]
    ZeroTotal,

    #[error("index {index} out of range for {total} symbols")]
    IndexOutOfRange { index: u32, total: u32 },

    #[error("failed to encode record: {0}")]
    Encode(String),

    #[error("unknown wire format: {0}")]
    UnknownFormat(String),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
