//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Bit-packed message codec for bandwidth-constrained links."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Bit-packed message encoding.
//!
//! Messages are described by a [`MessageSchema`] whose fields carry bounds, precision and
//! length limits. Each field is handled by a [`FieldCodec`] looked up in a
//! [`FieldCodecManager`]; the [`MessageCodec`] strings the fields together behind an
//! identifier header and pads the result to whole bytes.

mod bitset;
mod codec;
pub mod codecs;
mod error;
mod field_codec;
mod id_codec;
mod layout;
mod manager;
mod schema;
mod value;

pub use bitset::{bits_for, BitCursor, Bitset};
pub use codec::MessageCodec;
pub use error::{DcclError, Result};
pub use field_codec::FieldCodec;
pub use id_codec::{
    id_codec_from_config, FixedIdCodec, IdCodec, VarintIdCodec, ZeroIdCodec, DEFAULT_ID_CODEC,
};
pub use layout::{BoundField, BoundMessage};
pub use manager::{CodecKey, FieldCodecManager, MODEM_ID_CODEC, STATIC_CODEC, TIME_CODEC};
pub use schema::{FieldDescriptor, FieldOptions, FieldType, Label, MessageSchema, DEFAULT_CODEC};
pub use value::{FieldValue, Message};
