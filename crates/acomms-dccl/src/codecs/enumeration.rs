//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Index codec for enumerated fields."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::HashSet;

use crate::bitset::{bits_for, BitCursor, Bitset};
use crate::error::Result;
use crate::field_codec::FieldCodec;
use crate::layout::BoundField;
use crate::value::FieldValue;

/// Sends the position of the enumerator within the declared `enum_values`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEnumCodec;

impl DefaultEnumCodec {
    fn width(&self, field: &BoundField) -> usize {
        bits_for(field.options().enum_values.len().saturating_sub(1) as u64)
    }
}

impl FieldCodec for DefaultEnumCodec {
    fn validate(&self, field: &BoundField) -> Result<()> {
        let values = &field.options().enum_values;
        if values.is_empty() {
            return Err(field.schema_error("enum fields require at least one enumerator"));
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = values.iter().find(|value| !seen.insert(value.as_str())) {
            return Err(field.schema_error(format!("duplicate enumerator '{}'", duplicate)));
        }
        Ok(())
    }

    fn size(&self, field: &BoundField, _value: &FieldValue) -> Result<usize> {
        Ok(self.width(field))
    }

    fn min_size(&self, field: &BoundField) -> Result<usize> {
        Ok(self.width(field))
    }

    fn max_size(&self, field: &BoundField) -> Result<usize> {
        Ok(self.width(field))
    }

    fn encode(&self, field: &BoundField, value: &FieldValue, bits: &mut Bitset) -> Result<()> {
        let name = value.as_str().ok_or_else(|| {
            field.invalid_value(format!("expected an enumerator, got {}", value.kind()))
        })?;
        let index = field
            .options()
            .enum_values
            .iter()
            .position(|candidate| candidate == name)
            .ok_or_else(|| field.invalid_value(format!("unknown enumerator '{}'", name)))?;
        bits.append_bits(index as u64, self.width(field))
    }

    fn decode(&self, field: &BoundField, cursor: &mut BitCursor<'_>) -> Result<FieldValue> {
        let index = cursor.read_unsigned(self.width(field))? as usize;
        field
            .options()
            .enum_values
            .get(index)
            .map(|name| FieldValue::Enum(name.clone()))
            .ok_or_else(|| field.out_of_range(format!("enumerator index {} undefined", index)))
    }
}
