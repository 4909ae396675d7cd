//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Schemas bound to their resolved field codecs."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Validated field layouts.
//!
//! Binding resolves every field's codec once. Encoding and decoding then walk the cached
//! list in declaration order without touching the registry again.
use std::collections::HashSet;
use std::sync::Arc;

use crate::bitset::{bits_for, BitCursor, Bitset};
use crate::error::{DcclError, Result};
use crate::field_codec::FieldCodec;
use crate::manager::FieldCodecManager;
use crate::schema::{FieldDescriptor, FieldOptions, FieldType, Label, MessageSchema};
use crate::value::{FieldValue, Message};

/// A field descriptor together with the codec that handles it.
#[derive(Debug, Clone)]
pub struct BoundField {
    message: String,
    descriptor: FieldDescriptor,
    codec: Arc<dyn FieldCodec>,
    nested: Option<Arc<BoundMessage>>,
}

impl BoundField {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Name of the message type declaring this field.
    pub fn message_name(&self) -> &str {
        &self.message
    }

    pub fn descriptor(&self) -> &FieldDescriptor {
        &self.descriptor
    }

    pub fn options(&self) -> &FieldOptions {
        &self.descriptor.options
    }

    pub fn field_type(&self) -> FieldType {
        self.descriptor.field_type
    }

    pub fn label(&self) -> Label {
        self.descriptor.label
    }

    pub fn codec(&self) -> &Arc<dyn FieldCodec> {
        &self.codec
    }

    /// Layout of the embedded message for message-typed fields.
    pub fn nested(&self) -> Option<&BoundMessage> {
        self.nested.as_deref()
    }

    pub fn schema_error(&self, reason: impl Into<String>) -> DcclError {
        DcclError::schema(&self.message, &self.descriptor.name, reason)
    }

    pub fn out_of_range(&self, reason: impl Into<String>) -> DcclError {
        DcclError::OutOfRange {
            field: self.descriptor.name.clone(),
            reason: reason.into(),
        }
    }

    pub fn invalid_value(&self, reason: impl Into<String>) -> DcclError {
        DcclError::InvalidValue {
            field: self.descriptor.name.clone(),
            reason: reason.into(),
        }
    }

    fn max_repeat(&self) -> usize {
        self.descriptor.options.max_repeat.unwrap_or(0)
    }

    fn count_width(&self) -> usize {
        bits_for(self.max_repeat() as u64)
    }

    fn repeated_items<'v>(&self, value: Option<&'v FieldValue>) -> Result<&'v [FieldValue]> {
        let items = match value {
            None => &[][..],
            Some(FieldValue::Repeated(items)) => items.as_slice(),
            Some(other) => {
                return Err(self.invalid_value(format!(
                    "repeated field expects a list, got {}",
                    other.kind()
                )))
            }
        };
        if items.len() > self.max_repeat() {
            return Err(self.out_of_range(format!(
                "{} elements exceed max_repeat {}",
                items.len(),
                self.max_repeat()
            )));
        }
        Ok(items)
    }

    /// Write `value` including presence bit or count prefix as the label demands.
    pub fn encode_value(&self, value: Option<&FieldValue>, bits: &mut Bitset) -> Result<()> {
        if self.codec.fixed_value(self)?.is_some() {
            return Ok(());
        }
        match self.descriptor.label {
            Label::Required => {
                let value = value.ok_or_else(|| DcclError::MissingRequiredField {
                    message: self.message.clone(),
                    field: self.descriptor.name.clone(),
                })?;
                self.codec.encode(self, value, bits)
            }
            Label::Optional => match value {
                None => {
                    bits.push(false);
                    Ok(())
                }
                Some(value) => {
                    bits.push(true);
                    self.codec.encode(self, value, bits)
                }
            },
            Label::Repeated => {
                let items = self.repeated_items(value)?;
                bits.append_bits(items.len() as u64, self.count_width())?;
                for item in items {
                    self.codec.encode(self, item, bits)?;
                }
                Ok(())
            }
        }
    }

    /// Read one field; `None` for absent optional fields and empty repeated fields.
    pub fn decode_value(&self, cursor: &mut BitCursor<'_>) -> Result<Option<FieldValue>> {
        if let Some(value) = self.codec.fixed_value(self)? {
            return Ok(Some(value));
        }
        match self.descriptor.label {
            Label::Required => self.codec.decode(self, cursor).map(Some),
            Label::Optional => {
                if cursor.read_bool()? {
                    self.codec.decode(self, cursor).map(Some)
                } else {
                    Ok(None)
                }
            }
            Label::Repeated => {
                let count = cursor.read_unsigned(self.count_width())? as usize;
                if count > self.max_repeat() {
                    return Err(self.out_of_range(format!(
                        "decoded count {} exceeds max_repeat {}",
                        count,
                        self.max_repeat()
                    )));
                }
                if count == 0 {
                    return Ok(None);
                }
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.codec.decode(self, cursor)?);
                }
                Ok(Some(FieldValue::Repeated(items)))
            }
        }
    }

    pub fn size_of(&self, value: Option<&FieldValue>) -> Result<usize> {
        if self.codec.fixed_value(self)?.is_some() {
            return Ok(0);
        }
        match self.descriptor.label {
            Label::Required => {
                let value = value.ok_or_else(|| DcclError::MissingRequiredField {
                    message: self.message.clone(),
                    field: self.descriptor.name.clone(),
                })?;
                self.codec.size(self, value)
            }
            Label::Optional => match value {
                None => Ok(1),
                Some(value) => Ok(1 + self.codec.size(self, value)?),
            },
            Label::Repeated => {
                let mut total = self.count_width();
                for item in self.repeated_items(value)? {
                    total += self.codec.size(self, item)?;
                }
                Ok(total)
            }
        }
    }

    pub fn min_bits(&self) -> Result<usize> {
        if self.codec.fixed_value(self)?.is_some() {
            return Ok(0);
        }
        match self.descriptor.label {
            Label::Required => self.codec.min_size(self),
            Label::Optional => Ok(1),
            Label::Repeated => Ok(self.count_width()),
        }
    }

    pub fn max_bits(&self) -> Result<usize> {
        if self.codec.fixed_value(self)?.is_some() {
            return Ok(0);
        }
        let element = self.codec.max_size(self)?;
        match self.descriptor.label {
            Label::Required => Ok(element),
            Label::Optional => Ok(1 + element),
            Label::Repeated => Ok(self.count_width() + self.max_repeat() * element),
        }
    }
}

/// A validated schema: its descriptor plus one [`BoundField`] per field.
#[derive(Debug, Clone)]
pub struct BoundMessage {
    schema: MessageSchema,
    fields: Vec<BoundField>,
}

impl BoundMessage {
    /// Resolve codecs for every field of `schema` (recursively for embedded messages) and
    /// let each codec check its options.
    pub fn bind(schema: &MessageSchema, manager: &FieldCodecManager) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(schema.fields.len());
        for descriptor in &schema.fields {
            if !seen.insert(descriptor.name.as_str()) {
                return Err(DcclError::schema(
                    &schema.name,
                    &descriptor.name,
                    "duplicate field name",
                ));
            }
            if descriptor.label == Label::Repeated
                && descriptor.options.max_repeat.unwrap_or(0) == 0
            {
                return Err(DcclError::schema(
                    &schema.name,
                    &descriptor.name,
                    "repeated fields need max_repeat of at least 1",
                ));
            }
            let nested = match (descriptor.field_type, descriptor.message.as_deref()) {
                (FieldType::Message, Some(inner)) => {
                    Some(Arc::new(BoundMessage::bind(inner, manager)?))
                }
                (FieldType::Message, None) => {
                    return Err(DcclError::schema(
                        &schema.name,
                        &descriptor.name,
                        "message field carries no embedded schema",
                    ))
                }
                (_, Some(_)) => {
                    return Err(DcclError::schema(
                        &schema.name,
                        &descriptor.name,
                        "only message fields may embed a schema",
                    ))
                }
                (_, None) => None,
            };
            let codec = manager.find(
                descriptor.field_type,
                descriptor.codec_name(),
                descriptor.lookup_qualifier(),
            )?;
            let field = BoundField {
                message: schema.name.clone(),
                descriptor: descriptor.clone(),
                codec,
                nested,
            };
            field.codec.validate(&field)?;
            fields.push(field);
        }
        Ok(Self {
            schema: schema.clone(),
            fields,
        })
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &MessageSchema {
        &self.schema
    }

    pub fn fields(&self) -> &[BoundField] {
        &self.fields
    }

    fn reject_unknown_fields(&self, message: &Message) -> Result<()> {
        for (name, _) in message.iter() {
            if !self.fields.iter().any(|field| field.name() == name) {
                return Err(DcclError::InvalidValue {
                    field: name.to_owned(),
                    reason: format!("not a field of message '{}'", self.schema.name),
                });
            }
        }
        Ok(())
    }

    pub fn encode_body(&self, message: &Message, bits: &mut Bitset) -> Result<()> {
        self.reject_unknown_fields(message)?;
        for field in &self.fields {
            field.encode_value(message.get(field.name()), bits)?;
        }
        Ok(())
    }

    pub fn decode_body(&self, cursor: &mut BitCursor<'_>) -> Result<Message> {
        let mut message = Message::new(self.schema.name.clone());
        for field in &self.fields {
            if let Some(value) = field.decode_value(cursor)? {
                message.set(field.name(), value);
            }
        }
        Ok(message)
    }

    pub fn size_bits(&self, message: &Message) -> Result<usize> {
        self.reject_unknown_fields(message)?;
        let mut total = 0;
        for field in &self.fields {
            total += field.size_of(message.get(field.name()))?;
        }
        Ok(total)
    }

    pub fn min_bits(&self) -> Result<usize> {
        self.fields.iter().map(BoundField::min_bits).sum()
    }

    pub fn max_bits(&self) -> Result<usize> {
        self.fields.iter().map(BoundField::max_bits).sum()
    }
}
