//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Message-level encode/decode pipeline."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Message codec.
//!
//! Wire layout of one message: `[id header][field 1]...[field n]`, zero padded to a whole
//! byte. Schemas must be validated before use; validation resolves and caches every field
//! codec so encoding never consults the registry.
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::Arc;

use acomms_common::CodecConfig;
use tracing::{debug, trace, warn};

use crate::bitset::Bitset;
use crate::error::{DcclError, Result};
use crate::id_codec::{id_codec_from_config, IdCodec, VarintIdCodec};
use crate::layout::{BoundField, BoundMessage};
use crate::manager::FieldCodecManager;
use crate::schema::MessageSchema;
use crate::value::Message;

#[derive(Debug, Clone)]
struct Entry {
    id: u32,
    layout: Arc<BoundMessage>,
}

/// Encodes and decodes messages of every validated schema.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    manager: Arc<FieldCodecManager>,
    id_codec: Arc<dyn IdCodec>,
    by_id: BTreeMap<u32, Entry>,
    ids_by_name: HashMap<String, u32>,
}

impl MessageCodec {
    /// Codec using the varint identifier header.
    pub fn new(manager: Arc<FieldCodecManager>) -> Self {
        Self::with_id_codec(manager, Arc::new(VarintIdCodec))
    }

    pub fn with_id_codec(manager: Arc<FieldCodecManager>, id_codec: Arc<dyn IdCodec>) -> Self {
        Self {
            manager,
            id_codec,
            by_id: BTreeMap::new(),
            ids_by_name: HashMap::new(),
        }
    }

    pub fn from_config(manager: Arc<FieldCodecManager>, config: &CodecConfig) -> Self {
        Self::with_id_codec(manager, id_codec_from_config(&config.id_codec))
    }

    pub fn manager(&self) -> &Arc<FieldCodecManager> {
        &self.manager
    }

    /// Switch to the identifier codec registered under `name`, re-validating every schema.
    ///
    /// On failure the codec is left unchanged.
    pub fn set_id_codec(&mut self, name: &str) -> Result<()> {
        let id_codec = self.manager.find_id_codec(name)?;
        let mut rebuilt = Self::with_id_codec(self.manager.clone(), id_codec);
        for entry in self.by_id.values() {
            rebuilt.validate(entry.layout.schema())?;
        }
        *self = rebuilt;
        Ok(())
    }

    /// Check `schema` and make it available for encoding and decoding.
    ///
    /// Validating a schema again under the same name replaces the earlier copy.
    pub fn validate(&mut self, schema: &MessageSchema) -> Result<()> {
        let id = schema
            .id
            .ok_or_else(|| DcclError::schema(&schema.name, "", "message has no id"))?;
        self.id_codec
            .validate_id(id)
            .map_err(|err| DcclError::schema(&schema.name, "", err.to_string()))?;
        if let Some(existing) = self.by_id.get(&id) {
            if existing.layout.name() != schema.name {
                return Err(DcclError::schema(
                    &schema.name,
                    "",
                    format!("id {} is already used by '{}'", id, existing.layout.name()),
                ));
            }
        }

        let layout = BoundMessage::bind(schema, &self.manager)?;
        let head = self.id_codec.size(id);
        let min_bits = head + layout.min_bits()?;
        let max_bits = head + layout.max_bits()?;
        if let Some(max_bytes) = schema.max_bytes {
            if max_bits.div_ceil(8) > max_bytes {
                return Err(DcclError::schema(
                    &schema.name,
                    "",
                    format!(
                        "worst case size of {} bytes exceeds max_bytes {}",
                        max_bits.div_ceil(8),
                        max_bytes
                    ),
                ));
            }
        }

        if let Some(previous) = self.ids_by_name.insert(schema.name.clone(), id) {
            if previous != id {
                self.by_id.remove(&previous);
            }
        }
        self.by_id.insert(
            id,
            Entry {
                id,
                layout: Arc::new(layout),
            },
        );
        debug!(message = %schema.name, id, min_bits, max_bits, "schema validated");
        Ok(())
    }

    pub fn is_validated(&self, name: &str) -> bool {
        self.ids_by_name.contains_key(name)
    }

    /// Identifier of a validated message type.
    pub fn id(&self, name: &str) -> Result<u32> {
        self.ids_by_name
            .get(name)
            .copied()
            .ok_or_else(|| DcclError::UnknownMessage(name.to_owned()))
    }

    pub fn schema(&self, id: u32) -> Option<&MessageSchema> {
        self.by_id.get(&id).map(|entry| entry.layout.schema())
    }

    /// Identifiers of every validated schema, ascending.
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.by_id.keys().copied()
    }

    fn entry(&self, name: &str) -> Result<&Entry> {
        let id = self.id(name)?;
        self.by_id
            .get(&id)
            .ok_or_else(|| DcclError::UnknownMessage(name.to_owned()))
    }

    /// Encode to bits without byte padding.
    pub fn encode_bits(&self, message: &Message) -> Result<Bitset> {
        let entry = self.entry(message.name())?;
        let mut bits = Bitset::new();
        self.id_codec.encode(entry.id, &mut bits)?;
        entry.layout.encode_body(message, &mut bits)?;
        Ok(bits)
    }

    pub fn encode(&self, message: &Message) -> Result<Vec<u8>> {
        let bits = self.encode_bits(message)?;
        let bytes = bits.to_bytes();
        trace!(message = message.name(), bits = bits.len(), payload = %hex::encode(&bytes), "message encoded");
        Ok(bytes)
    }

    /// Encode several messages back to back, each padded to a whole byte.
    pub fn encode_repeated(&self, messages: &[Message]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for message in messages {
            out.extend(self.encode(message)?);
        }
        Ok(out)
    }

    /// Decode the message at the start of `bytes`, returning it with the number of whole
    /// bytes it occupied.
    pub fn decode_prefix(&self, bytes: &[u8]) -> Result<(Message, usize)> {
        let bits = Bitset::from_bytes(bytes);
        let mut cursor = bits.cursor();
        let id = self.id_codec.decode(&mut cursor)?;
        let entry = self
            .by_id
            .get(&id)
            .ok_or(DcclError::UnknownMessageId(id))?;
        let required = cursor.position() + entry.layout.min_bits()?;
        if bits.len() < required {
            return Err(DcclError::DecodeSizeMismatch {
                required,
                available: bits.len(),
            });
        }
        let message = entry.layout.decode_body(&mut cursor)?;
        Ok((message, cursor.position().div_ceil(8)))
    }

    /// Decode a single message. Trailing bytes after it are ignored.
    pub fn decode(&self, bytes: &[u8]) -> Result<Message> {
        let (message, used) = self.decode_prefix(bytes)?;
        trace!(message = message.name(), used, payload = %hex::encode(bytes), "message decoded");
        Ok(message)
    }

    /// Decode messages laid out by [`MessageCodec::encode_repeated`].
    ///
    /// A failure on the first message is returned. A failure on a later one ends decoding
    /// and the messages read so far are returned.
    pub fn decode_repeated(&self, bytes: &[u8]) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            match self.decode_prefix(&bytes[offset..]) {
                Ok((message, used)) => {
                    messages.push(message);
                    if used == 0 {
                        break;
                    }
                    offset += used;
                }
                Err(err) if messages.is_empty() => return Err(err),
                Err(err) => {
                    warn!(offset, error = %err, decoded = messages.len(), "stopped decoding concatenated messages");
                    break;
                }
            }
        }
        Ok(messages)
    }

    /// Identifier in the header of `bytes`, without decoding the body.
    pub fn id_from_encoded(&self, bytes: &[u8]) -> Result<u32> {
        let bits = Bitset::from_bytes(bytes);
        self.id_codec.decode(&mut bits.cursor())
    }

    pub fn size_bits(&self, message: &Message) -> Result<usize> {
        let entry = self.entry(message.name())?;
        Ok(self.id_codec.size(entry.id) + entry.layout.size_bits(message)?)
    }

    /// Encoded size in bytes.
    pub fn size(&self, message: &Message) -> Result<usize> {
        Ok(self.size_bits(message)?.div_ceil(8))
    }

    /// Smallest possible encoding of a message type, in bytes.
    pub fn min_size(&self, name: &str) -> Result<usize> {
        let entry = self.entry(name)?;
        Ok((self.id_codec.size(entry.id) + entry.layout.min_bits()?).div_ceil(8))
    }

    /// Largest possible encoding of a message type, in bytes.
    pub fn max_size(&self, name: &str) -> Result<usize> {
        let entry = self.entry(name)?;
        Ok((self.id_codec.size(entry.id) + entry.layout.max_bits()?).div_ceil(8))
    }

    /// Human readable layout of a validated message type.
    pub fn info(&self, name: &str) -> Result<String> {
        let entry = self.entry(name)?;
        let head = self.id_codec.size(entry.id);
        let body_min = entry.layout.min_bits()?;
        let body_max = entry.layout.max_bits()?;
        let mut out = String::new();
        let _ = writeln!(out, "== Begin {} ==", name);
        let _ = writeln!(out, "id: {} ({} bit header)", entry.id, head);
        let _ = writeln!(out, "body: {} to {} bits", body_min, body_max);
        let _ = writeln!(
            out,
            "encoded: {} to {} bytes",
            (head + body_min).div_ceil(8),
            (head + body_max).div_ceil(8)
        );
        if let Some(max_bytes) = entry.layout.schema().max_bytes {
            let _ = writeln!(out, "max_bytes: {}", max_bytes);
        }
        write_fields(&mut out, entry.layout.fields(), 1)?;
        let _ = writeln!(out, "== End {} ==", name);
        Ok(out)
    }

    /// [`MessageCodec::info`] for every validated type, in identifier order.
    pub fn info_all(&self) -> Result<String> {
        let mut out = String::new();
        for entry in self.by_id.values() {
            out.push_str(&self.info(entry.layout.name())?);
        }
        Ok(out)
    }
}

fn write_fields(out: &mut String, fields: &[BoundField], depth: usize) -> Result<()> {
    let indent = "  ".repeat(depth);
    for (index, field) in fields.iter().enumerate() {
        let (min, max) = (field.min_bits()?, field.max_bits()?);
        let size = if min == max {
            format!("{} bits", min)
        } else {
            format!("{}-{} bits", min, max)
        };
        let _ = writeln!(
            out,
            "{}{}. {} [{} {}, codec {}]: {}",
            indent,
            index + 1,
            field.name(),
            field.label(),
            field.field_type(),
            field.descriptor().codec_name(),
            size
        );
        if let Some(nested) = field.nested() {
            write_fields(out, nested.fields(), depth + 1)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id_codec::FixedIdCodec;
    use crate::schema::{FieldDescriptor, FieldType};
    use crate::value::FieldValue;

    fn codec() -> MessageCodec {
        MessageCodec::new(Arc::new(FieldCodecManager::with_defaults()))
    }

    fn simple_schema() -> MessageSchema {
        MessageSchema::new("Simple")
            .with_id(1)
            .field(FieldDescriptor::new("value", FieldType::UInt32).bounds(0.0, 127.0))
    }

    #[test]
    fn fixed_header_and_seven_bit_value_fit_two_bytes() {
        let mut codec =
            MessageCodec::with_id_codec(Arc::new(FieldCodecManager::with_defaults()), Arc::new(FixedIdCodec::new(8)));
        codec.validate(&simple_schema()).unwrap();
        let message = Message::new("Simple").with("value", 42u32);
        let bits = codec.encode_bits(&message).unwrap();
        assert_eq!(bits.len(), 15);
        let bytes = codec.encode(&message).unwrap();
        assert_eq!(bytes, vec![0x01, 42 << 1]);
        assert_eq!(codec.size(&message).unwrap(), 2);
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(codec.id_from_encoded(&bytes).unwrap(), 1);
        assert_eq!(decoded.get("value"), Some(&FieldValue::UInt(42)));
    }

    #[test]
    fn missing_id_and_duplicate_ids_are_schema_errors() {
        let mut codec = codec();
        let no_id = MessageSchema::new("NoId");
        assert!(matches!(
            codec.validate(&no_id),
            Err(DcclError::InvalidSchema { .. })
        ));
        codec.validate(&simple_schema()).unwrap();
        let clash = MessageSchema::new("Other").with_id(1);
        let err = codec.validate(&clash).unwrap_err();
        assert!(err.to_string().contains("already used"));
        codec.validate(&simple_schema()).unwrap();
    }

    #[test]
    fn max_bytes_is_enforced_at_validation() {
        let mut codec = codec();
        let schema = MessageSchema::new("Chatty")
            .with_id(3)
            .with_max_bytes(4)
            .field(FieldDescriptor::new("text", FieldType::String).max_length(8));
        let err = codec.validate(&schema).unwrap_err();
        assert!(matches!(err, DcclError::InvalidSchema { ref message, .. } if message == "Chatty"));
        assert!(codec.validate(&schema.with_max_bytes(10)).is_ok());
    }

    #[test]
    fn unvalidated_and_unknown_messages() {
        let mut codec = codec();
        assert_eq!(
            codec.encode(&Message::new("Simple")),
            Err(DcclError::UnknownMessage("Simple".into()))
        );
        codec.validate(&simple_schema()).unwrap();
        assert_eq!(codec.decode(&[0x05, 0x00]), Err(DcclError::UnknownMessageId(5)));
        assert!(matches!(
            codec.encode(&Message::new("Simple")),
            Err(DcclError::MissingRequiredField { ref field, .. }) if field == "value"
        ));
        assert!(matches!(
            codec.encode(&Message::new("Simple").with("value", 1u32).with("extra", true)),
            Err(DcclError::InvalidValue { ref field, .. }) if field == "extra"
        ));
    }

    #[test]
    fn truncated_payload_reports_size_mismatch() {
        let mut codec = codec();
        let schema = MessageSchema::new("Wide")
            .with_id(2)
            .field(FieldDescriptor::new("a", FieldType::UInt32).bounds(0.0, 65535.0));
        codec.validate(&schema).unwrap();
        let bytes = codec
            .encode(&Message::new("Wide").with("a", 1000u32))
            .unwrap();
        assert_eq!(bytes.len(), 3);
        assert_eq!(
            codec.decode(&bytes[..2]),
            Err(DcclError::DecodeSizeMismatch {
                required: 24,
                available: 16
            })
        );
    }

    #[test]
    fn repeated_messages_decode_until_failure() {
        let mut codec = codec();
        codec.validate(&simple_schema()).unwrap();
        let first = Message::new("Simple").with("value", 1u32);
        let second = Message::new("Simple").with("value", 2u32);
        let mut bytes = codec.encode_repeated(&[first.clone(), second.clone()]).unwrap();
        assert_eq!(bytes.len(), 4);
        assert_eq!(codec.decode_repeated(&bytes).unwrap().len(), 2);

        bytes.push(0x7f);
        let decoded = codec.decode_repeated(&bytes).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[1].get("value"), Some(&FieldValue::UInt(2)));

        assert!(codec.decode_repeated(&[0x7f, 0x00]).is_err());
    }

    #[test]
    fn set_id_codec_revalidates_schemas() {
        let mut manager = FieldCodecManager::with_defaults();
        manager
            .add_id_codec("nibble", Arc::new(FixedIdCodec::new(4)))
            .unwrap();
        let mut codec = MessageCodec::new(Arc::new(manager));
        codec
            .validate(&MessageSchema::new("Big").with_id(40))
            .unwrap();
        assert!(codec.set_id_codec("nibble").is_err());
        assert!(codec.is_validated("Big"));
        assert!(matches!(
            codec.set_id_codec("missing"),
            Err(DcclError::UnknownIdCodec(_))
        ));
    }

    #[test]
    fn info_lists_fields_and_sizes() {
        let mut codec = codec();
        codec.validate(&simple_schema()).unwrap();
        let info = codec.info("Simple").unwrap();
        assert!(info.contains("== Begin Simple =="));
        assert!(info.contains("1. value [required uint32, codec default]: 7 bits"));
        assert!(info.contains("encoded: 2 to 2 bytes"));
        assert_eq!(codec.info_all().unwrap(), info);
    }
}
