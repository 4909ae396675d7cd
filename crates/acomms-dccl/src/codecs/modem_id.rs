//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Codec translating platform names to compact modem identifiers."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use indexmap::IndexMap;

use crate::bitset::{bits_for, BitCursor, Bitset};
use crate::error::Result;
use crate::field_codec::FieldCodec;
use crate::layout::BoundField;
use crate::schema::FieldType;
use crate::value::FieldValue;

/// String field holding a platform name, sent as its modem identifier.
///
/// Names match case-insensitively. Numeric strings pass through as identifiers, and
/// identifiers missing from the table decode to their decimal form. The width covers the
/// larger of the field's `max` option and the highest identifier in the table.
#[derive(Debug, Clone, Default)]
pub struct ModemIdCodec {
    names: IndexMap<u32, String>,
}

impl ModemIdCodec {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        Self {
            names: entries
                .into_iter()
                .map(|(id, name)| (id, name.into()))
                .collect(),
        }
    }

    pub fn id_for(&self, name: &str) -> Option<u32> {
        self.names
            .iter()
            .find(|(_, candidate)| candidate.eq_ignore_ascii_case(name))
            .map(|(id, _)| *id)
            .or_else(|| name.trim().parse().ok())
    }

    pub fn name_for(&self, id: u32) -> String {
        self.names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn max_id(&self, field: &BoundField) -> u64 {
        let table_max = self.names.keys().copied().max().unwrap_or(0);
        let option_max = field.options().max.unwrap_or(0.0).max(0.0) as u64;
        option_max.max(u64::from(table_max))
    }
}

impl FieldCodec for ModemIdCodec {
    fn validate(&self, field: &BoundField) -> Result<()> {
        if field.field_type() != FieldType::String {
            return Err(field.schema_error(format!(
                "modem id codec cannot handle {}",
                field.field_type()
            )));
        }
        if self.max_id(field) == 0 {
            return Err(field.schema_error("modem id codec needs a lookup table or a max option"));
        }
        Ok(())
    }

    fn size(&self, field: &BoundField, _value: &FieldValue) -> Result<usize> {
        Ok(bits_for(self.max_id(field)))
    }

    fn min_size(&self, field: &BoundField) -> Result<usize> {
        Ok(bits_for(self.max_id(field)))
    }

    fn max_size(&self, field: &BoundField) -> Result<usize> {
        Ok(bits_for(self.max_id(field)))
    }

    fn encode(&self, field: &BoundField, value: &FieldValue, bits: &mut Bitset) -> Result<()> {
        let name = value.as_str().ok_or_else(|| {
            field.invalid_value(format!("expected a platform name, got {}", value.kind()))
        })?;
        let id = self
            .id_for(name)
            .ok_or_else(|| field.invalid_value(format!("unknown platform '{}'", name)))?;
        if u64::from(id) > self.max_id(field) {
            return Err(field.out_of_range(format!(
                "modem id {} exceeds {}",
                id,
                self.max_id(field)
            )));
        }
        bits.append_bits(u64::from(id), bits_for(self.max_id(field)))
    }

    fn decode(&self, field: &BoundField, cursor: &mut BitCursor<'_>) -> Result<FieldValue> {
        let id = cursor.read_unsigned(bits_for(self.max_id(field)))? as u32;
        Ok(FieldValue::String(self.name_for(id)))
    }
}
