//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Message identifier header codecs."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Identifier headers.
//!
//! Every encoded message starts with its type identifier so the receiver can find the
//! schema. The header codec is chosen per [`crate::MessageCodec`] and must match on both
//! ends of the link.
use std::fmt::Debug;
use std::sync::Arc;

use acomms_common::IdCodecConfig;

use crate::bitset::{BitCursor, Bitset};
use crate::error::{DcclError, Result};

/// Registry name of [`VarintIdCodec`].
pub const DEFAULT_ID_CODEC: &str = "default";

/// Encoder for the identifier header. Sizes are in bits.
pub trait IdCodec: Send + Sync + Debug {
    /// Reject identifiers this header cannot carry.
    fn validate_id(&self, id: u32) -> Result<()>;

    fn size(&self, id: u32) -> usize;

    fn min_size(&self) -> usize;

    fn max_size(&self) -> usize;

    fn encode(&self, id: u32, bits: &mut Bitset) -> Result<()>;

    fn decode(&self, cursor: &mut BitCursor<'_>) -> Result<u32>;
}

/// Build the header codec described by configuration.
pub fn id_codec_from_config(config: &IdCodecConfig) -> Arc<dyn IdCodec> {
    match *config {
        IdCodecConfig::Varint => Arc::new(VarintIdCodec),
        IdCodecConfig::Fixed { width } => Arc::new(FixedIdCodec::new(usize::from(width))),
        IdCodecConfig::Zero { id } => Arc::new(ZeroIdCodec::new(id)),
    }
}

fn id_out_of_range(id: u32, reason: String) -> DcclError {
    DcclError::OutOfRange {
        field: "id".to_owned(),
        reason: format!("{}: {}", id, reason),
    }
}

/// One byte for identifiers up to 127, two bytes up to 32767.
///
/// The first bit flags the long form; the remaining 7 or 15 bits carry the identifier.
#[derive(Debug, Default, Clone, Copy)]
pub struct VarintIdCodec;

impl VarintIdCodec {
    const SHORT_BITS: usize = 7;
    const LONG_BITS: usize = 15;
    const SHORT_MAX: u32 = (1 << Self::SHORT_BITS) - 1;
    const LONG_MAX: u32 = (1 << Self::LONG_BITS) - 1;
}

impl IdCodec for VarintIdCodec {
    fn validate_id(&self, id: u32) -> Result<()> {
        if id > Self::LONG_MAX {
            return Err(id_out_of_range(
                id,
                format!("varint header holds at most {}", Self::LONG_MAX),
            ));
        }
        Ok(())
    }

    fn size(&self, id: u32) -> usize {
        if id <= Self::SHORT_MAX {
            1 + Self::SHORT_BITS
        } else {
            1 + Self::LONG_BITS
        }
    }

    fn min_size(&self) -> usize {
        1 + Self::SHORT_BITS
    }

    fn max_size(&self) -> usize {
        1 + Self::LONG_BITS
    }

    fn encode(&self, id: u32, bits: &mut Bitset) -> Result<()> {
        self.validate_id(id)?;
        if id <= Self::SHORT_MAX {
            bits.push(false);
            bits.append_bits(u64::from(id), Self::SHORT_BITS)
        } else {
            bits.push(true);
            bits.append_bits(u64::from(id), Self::LONG_BITS)
        }
    }

    fn decode(&self, cursor: &mut BitCursor<'_>) -> Result<u32> {
        let width = if cursor.read_bool()? {
            Self::LONG_BITS
        } else {
            Self::SHORT_BITS
        };
        Ok(cursor.read_unsigned(width)? as u32)
    }
}

/// Identifier in a constant number of bits.
#[derive(Debug, Clone, Copy)]
pub struct FixedIdCodec {
    width: usize,
}

impl FixedIdCodec {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.min(32),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

impl IdCodec for FixedIdCodec {
    fn validate_id(&self, id: u32) -> Result<()> {
        if self.width < 32 && id >> self.width != 0 {
            return Err(id_out_of_range(
                id,
                format!("does not fit a {} bit header", self.width),
            ));
        }
        Ok(())
    }

    fn size(&self, _id: u32) -> usize {
        self.width
    }

    fn min_size(&self) -> usize {
        self.width
    }

    fn max_size(&self) -> usize {
        self.width
    }

    fn encode(&self, id: u32, bits: &mut Bitset) -> Result<()> {
        self.validate_id(id)?;
        bits.append_bits(u64::from(id), self.width)
    }

    fn decode(&self, cursor: &mut BitCursor<'_>) -> Result<u32> {
        Ok(cursor.read_unsigned(self.width)? as u32)
    }
}

/// No header: the link carries a single message type agreed out of band.
#[derive(Debug, Clone, Copy)]
pub struct ZeroIdCodec {
    id: u32,
}

impl ZeroIdCodec {
    pub fn new(id: u32) -> Self {
        Self { id }
    }
}

impl IdCodec for ZeroIdCodec {
    fn validate_id(&self, id: u32) -> Result<()> {
        if id != self.id {
            return Err(id_out_of_range(
                id,
                format!("headerless links only carry id {}", self.id),
            ));
        }
        Ok(())
    }

    fn size(&self, _id: u32) -> usize {
        0
    }

    fn min_size(&self) -> usize {
        0
    }

    fn max_size(&self) -> usize {
        0
    }

    fn encode(&self, id: u32, _bits: &mut Bitset) -> Result<()> {
        self.validate_id(id)
    }

    fn decode(&self, _cursor: &mut BitCursor<'_>) -> Result<u32> {
        Ok(self.id)
    }
}
