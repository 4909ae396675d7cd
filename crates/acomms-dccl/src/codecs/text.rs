//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Length-prefixed and fixed-length codecs for string and bytes fields."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! String and bytes codec.
//!
//! Variable length fields carry a `ceil(log2(max_length + 1))` bit length prefix followed by
//! the raw bytes. With `fixed_length` set exactly `max_length` bytes are always sent;
//! strings are zero padded and trailing NULs are dropped again on decode.
use crate::bitset::{bits_for, BitCursor, Bitset};
use crate::error::Result;
use crate::field_codec::FieldCodec;
use crate::layout::BoundField;
use crate::schema::FieldType;
use crate::value::FieldValue;

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTextCodec;

impl DefaultTextCodec {
    fn max_length(&self, field: &BoundField) -> Result<usize> {
        field
            .options()
            .max_length
            .ok_or_else(|| field.schema_error("string and bytes fields require max_length"))
    }

    fn prefix_width(&self, field: &BoundField) -> Result<usize> {
        if field.options().fixed_length {
            Ok(0)
        } else {
            Ok(bits_for(self.max_length(field)? as u64))
        }
    }

    fn payload<'v>(&self, field: &BoundField, value: &'v FieldValue) -> Result<&'v [u8]> {
        let bytes = match (field.field_type(), value) {
            (FieldType::String, FieldValue::String(text)) => text.as_bytes(),
            (FieldType::Bytes, FieldValue::Bytes(bytes)) => bytes.as_slice(),
            (_, other) => {
                return Err(field.invalid_value(format!(
                    "expected {}, got {}",
                    field.field_type(),
                    other.kind()
                )))
            }
        };
        let max_length = self.max_length(field)?;
        if bytes.len() > max_length {
            return Err(field.out_of_range(format!(
                "{} bytes exceed max_length {}",
                bytes.len(),
                max_length
            )));
        }
        if field.options().fixed_length
            && field.field_type() == FieldType::Bytes
            && bytes.len() != max_length
        {
            return Err(field.invalid_value(format!(
                "fixed length bytes must be exactly {} long, got {}",
                max_length,
                bytes.len()
            )));
        }
        Ok(bytes)
    }
}

impl FieldCodec for DefaultTextCodec {
    fn validate(&self, field: &BoundField) -> Result<()> {
        if !matches!(field.field_type(), FieldType::String | FieldType::Bytes) {
            return Err(field.schema_error(format!(
                "text codec cannot handle {}",
                field.field_type()
            )));
        }
        if self.max_length(field)? == 0 {
            return Err(field.schema_error("max_length must be at least 1"));
        }
        Ok(())
    }

    fn size(&self, field: &BoundField, value: &FieldValue) -> Result<usize> {
        let bytes = self.payload(field, value)?;
        if field.options().fixed_length {
            self.max_size(field)
        } else {
            Ok(self.prefix_width(field)? + bytes.len() * 8)
        }
    }

    fn min_size(&self, field: &BoundField) -> Result<usize> {
        if field.options().fixed_length {
            self.max_size(field)
        } else {
            self.prefix_width(field)
        }
    }

    fn max_size(&self, field: &BoundField) -> Result<usize> {
        Ok(self.prefix_width(field)? + self.max_length(field)? * 8)
    }

    fn encode(&self, field: &BoundField, value: &FieldValue, bits: &mut Bitset) -> Result<()> {
        let bytes = self.payload(field, value)?;
        let length = if field.options().fixed_length {
            self.max_length(field)?
        } else {
            bits.append_bits(bytes.len() as u64, self.prefix_width(field)?)?;
            bytes.len()
        };
        for index in 0..length {
            bits.append_bits(u64::from(bytes.get(index).copied().unwrap_or(0)), 8)?;
        }
        Ok(())
    }

    fn decode(&self, field: &BoundField, cursor: &mut BitCursor<'_>) -> Result<FieldValue> {
        let max_length = self.max_length(field)?;
        let length = if field.options().fixed_length {
            max_length
        } else {
            cursor.read_unsigned(self.prefix_width(field)?)? as usize
        };
        if length > max_length {
            return Err(field.out_of_range(format!(
                "decoded length {} exceeds max_length {}",
                length, max_length
            )));
        }
        let mut bytes = cursor.read_bytes(length)?;
        match field.field_type() {
            FieldType::String => {
                if field.options().fixed_length {
                    while bytes.last() == Some(&0) {
                        bytes.pop();
                    }
                }
                String::from_utf8(bytes)
                    .map(FieldValue::String)
                    .map_err(|err| field.invalid_value(format!("not valid utf-8: {}", err)))
            }
            _ => Ok(FieldValue::Bytes(bytes)),
        }
    }
}
