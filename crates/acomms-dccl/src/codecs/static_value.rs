//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Zero-width codec for fields whose value is fixed by the schema."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use crate::bitset::{BitCursor, Bitset};
use crate::error::Result;
use crate::field_codec::FieldCodec;
use crate::layout::BoundField;
use crate::schema::{FieldType, Label};
use crate::value::FieldValue;

/// Takes no space on the wire; decoding always yields the schema's `static_value`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticCodec;

impl StaticCodec {
    fn value(&self, field: &BoundField) -> Result<FieldValue> {
        let text = field
            .options()
            .static_value
            .as_deref()
            .ok_or_else(|| field.schema_error("static fields require static_value"))?;
        let parse_error = || field.schema_error(format!("static_value '{}' does not parse", text));
        Ok(match field.field_type() {
            FieldType::Bool => FieldValue::Bool(text.parse().map_err(|_| parse_error())?),
            FieldType::Int32 | FieldType::Int64 => {
                FieldValue::Int(text.parse().map_err(|_| parse_error())?)
            }
            FieldType::UInt32 | FieldType::UInt64 => {
                FieldValue::UInt(text.parse().map_err(|_| parse_error())?)
            }
            FieldType::Float | FieldType::Double => {
                FieldValue::Float(text.parse().map_err(|_| parse_error())?)
            }
            FieldType::String => FieldValue::String(text.to_owned()),
            FieldType::Enum => FieldValue::Enum(text.to_owned()),
            other => {
                return Err(field.schema_error(format!("static codec cannot handle {}", other)))
            }
        })
    }
}

impl FieldCodec for StaticCodec {
    fn validate(&self, field: &BoundField) -> Result<()> {
        if field.label() == Label::Repeated {
            return Err(field.schema_error("static fields cannot be repeated"));
        }
        self.value(field).map(|_| ())
    }

    fn size(&self, _field: &BoundField, _value: &FieldValue) -> Result<usize> {
        Ok(0)
    }

    fn min_size(&self, _field: &BoundField) -> Result<usize> {
        Ok(0)
    }

    fn max_size(&self, _field: &BoundField) -> Result<usize> {
        Ok(0)
    }

    fn encode(&self, _field: &BoundField, _value: &FieldValue, _bits: &mut Bitset) -> Result<()> {
        Ok(())
    }

    fn decode(&self, field: &BoundField, _cursor: &mut BitCursor<'_>) -> Result<FieldValue> {
        self.value(field)
    }

    fn fixed_value(&self, field: &BoundField) -> Result<Option<FieldValue>> {
        self.value(field).map(Some)
    }
}
