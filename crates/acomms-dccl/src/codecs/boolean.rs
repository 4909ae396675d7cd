//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Single bit codec for boolean fields."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use crate::bitset::{BitCursor, Bitset};
use crate::error::Result;
use crate::field_codec::FieldCodec;
use crate::layout::BoundField;
use crate::value::FieldValue;

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBoolCodec;

impl FieldCodec for DefaultBoolCodec {
    fn validate(&self, _field: &BoundField) -> Result<()> {
        Ok(())
    }

    fn size(&self, _field: &BoundField, _value: &FieldValue) -> Result<usize> {
        Ok(1)
    }

    fn min_size(&self, _field: &BoundField) -> Result<usize> {
        Ok(1)
    }

    fn max_size(&self, _field: &BoundField) -> Result<usize> {
        Ok(1)
    }

    fn encode(&self, field: &BoundField, value: &FieldValue, bits: &mut Bitset) -> Result<()> {
        let flag = value.as_bool().ok_or_else(|| {
            field.invalid_value(format!("expected a bool, got {}", value.kind()))
        })?;
        bits.push(flag);
        Ok(())
    }

    fn decode(&self, _field: &BoundField, cursor: &mut BitCursor<'_>) -> Result<FieldValue> {
        Ok(FieldValue::Bool(cursor.read_bool()?))
    }
}
