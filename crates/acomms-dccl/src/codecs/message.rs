//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Codec for embedded message fields."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use crate::bitset::{BitCursor, Bitset};
use crate::error::Result;
use crate::field_codec::FieldCodec;
use crate::layout::{BoundField, BoundMessage};
use crate::value::FieldValue;

/// Walks the embedded message's fields inline, without a header of its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMessageCodec;

impl DefaultMessageCodec {
    fn nested<'f>(&self, field: &'f BoundField) -> Result<&'f BoundMessage> {
        field
            .nested()
            .ok_or_else(|| field.schema_error("message field carries no embedded schema"))
    }
}

impl FieldCodec for DefaultMessageCodec {
    fn validate(&self, field: &BoundField) -> Result<()> {
        self.nested(field).map(|_| ())
    }

    fn size(&self, field: &BoundField, value: &FieldValue) -> Result<usize> {
        let message = value.as_message().ok_or_else(|| {
            field.invalid_value(format!("expected a message, got {}", value.kind()))
        })?;
        self.nested(field)?.size_bits(message)
    }

    fn min_size(&self, field: &BoundField) -> Result<usize> {
        self.nested(field)?.min_bits()
    }

    fn max_size(&self, field: &BoundField) -> Result<usize> {
        self.nested(field)?.max_bits()
    }

    fn encode(&self, field: &BoundField, value: &FieldValue, bits: &mut Bitset) -> Result<()> {
        let message = value.as_message().ok_or_else(|| {
            field.invalid_value(format!("expected a message, got {}", value.kind()))
        })?;
        self.nested(field)?.encode_body(message, bits)
    }

    fn decode(&self, field: &BoundField, cursor: &mut BitCursor<'_>) -> Result<FieldValue> {
        self.nested(field)?
            .decode_body(cursor)
            .map(FieldValue::Message)
    }
}
