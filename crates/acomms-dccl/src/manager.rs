//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Registry of named field and identifier codecs."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Codec registry.
//!
//! Field codecs are keyed by `(FieldType, name)` with an optional qualifier. A qualified
//! registration applies only to fields whose lookup qualifier matches (usually the name of
//! the embedded message type) and always wins over the general registration. Identifier
//! codecs live in a separate namespace.
//!
//! The registry has no interior locking. Build it once, then share it behind an `Arc`.
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::codecs::{
    DefaultBoolCodec, DefaultEnumCodec, DefaultMessageCodec, DefaultNumericCodec,
    DefaultTextCodec, StaticCodec, TimeCodec,
};
use crate::error::{DcclError, Result};
use crate::field_codec::FieldCodec;
use crate::id_codec::{IdCodec, VarintIdCodec, DEFAULT_ID_CODEC};
use crate::schema::{FieldType, DEFAULT_CODEC};

/// Registry name of [`TimeCodec`].
pub const TIME_CODEC: &str = "_time";
/// Registry name of [`StaticCodec`].
pub const STATIC_CODEC: &str = "_static";
/// Conventional registry name for a [`crate::codecs::ModemIdCodec`].
pub const MODEM_ID_CODEC: &str = "_modem_id";

/// Registration key of a field codec.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodecKey {
    pub field_type: FieldType,
    pub name: String,
    pub qualifier: Option<String>,
}

impl CodecKey {
    pub fn new(field_type: FieldType, name: impl Into<String>) -> Self {
        Self {
            field_type,
            name: name.into(),
            qualifier: None,
        }
    }

    pub fn qualified(
        field_type: FieldType,
        name: impl Into<String>,
        qualifier: impl Into<String>,
    ) -> Self {
        Self {
            field_type,
            name: name.into(),
            qualifier: Some(qualifier.into()),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct FieldCodecManager {
    codecs: IndexMap<CodecKey, Arc<dyn FieldCodec>>,
    id_codecs: IndexMap<String, Arc<dyn IdCodec>>,
}

impl FieldCodecManager {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in codec plus the varint identifier header.
    pub fn with_defaults() -> Self {
        let mut manager = Self::new();
        let numeric: Arc<dyn FieldCodec> = Arc::new(DefaultNumericCodec);
        let time: Arc<dyn FieldCodec> = Arc::new(TimeCodec::new());
        let fixed: Arc<dyn FieldCodec> = Arc::new(StaticCodec);
        let text: Arc<dyn FieldCodec> = Arc::new(DefaultTextCodec);

        for field_type in [
            FieldType::Int32,
            FieldType::Int64,
            FieldType::UInt32,
            FieldType::UInt64,
            FieldType::Float,
            FieldType::Double,
        ] {
            manager.insert(CodecKey::new(field_type, DEFAULT_CODEC), numeric.clone());
        }
        manager.insert(
            CodecKey::new(FieldType::Bool, DEFAULT_CODEC),
            Arc::new(DefaultBoolCodec),
        );
        manager.insert(CodecKey::new(FieldType::String, DEFAULT_CODEC), text.clone());
        manager.insert(CodecKey::new(FieldType::Bytes, DEFAULT_CODEC), text);
        manager.insert(
            CodecKey::new(FieldType::Enum, DEFAULT_CODEC),
            Arc::new(DefaultEnumCodec),
        );
        manager.insert(
            CodecKey::new(FieldType::Message, DEFAULT_CODEC),
            Arc::new(DefaultMessageCodec),
        );
        for field_type in [FieldType::Int64, FieldType::UInt64, FieldType::Double] {
            manager.insert(CodecKey::new(field_type, TIME_CODEC), time.clone());
        }
        for field_type in [
            FieldType::Bool,
            FieldType::Int32,
            FieldType::Int64,
            FieldType::UInt32,
            FieldType::UInt64,
            FieldType::Float,
            FieldType::Double,
            FieldType::String,
            FieldType::Enum,
        ] {
            manager.insert(CodecKey::new(field_type, STATIC_CODEC), fixed.clone());
        }
        manager
            .id_codecs
            .insert(DEFAULT_ID_CODEC.to_owned(), Arc::new(VarintIdCodec));
        manager
    }

    fn insert(&mut self, key: CodecKey, codec: Arc<dyn FieldCodec>) -> Option<Arc<dyn FieldCodec>> {
        self.codecs.insert(key, codec)
    }

    fn add_key(&mut self, key: CodecKey, codec: Arc<dyn FieldCodec>) -> Result<()> {
        if self.codecs.contains_key(&key) {
            return Err(DcclError::DuplicateCodec {
                name: key.name,
                field_type: key.field_type,
                qualifier: key.qualifier,
            });
        }
        debug!(codec = %key.name, field_type = %key.field_type, qualifier = ?key.qualifier, "field codec registered");
        self.insert(key, codec);
        Ok(())
    }

    /// Register `codec` for `(field_type, name)`. Existing registrations are never replaced.
    pub fn add(
        &mut self,
        field_type: FieldType,
        name: impl Into<String>,
        codec: Arc<dyn FieldCodec>,
    ) -> Result<()> {
        self.add_key(CodecKey::new(field_type, name), codec)
    }

    /// Register `codec` only for fields whose lookup qualifier equals `qualifier`.
    pub fn add_qualified(
        &mut self,
        field_type: FieldType,
        name: impl Into<String>,
        qualifier: impl Into<String>,
        codec: Arc<dyn FieldCodec>,
    ) -> Result<()> {
        self.add_key(CodecKey::qualified(field_type, name, qualifier), codec)
    }

    /// Register or overwrite the general entry for `(field_type, name)`.
    pub fn replace(
        &mut self,
        field_type: FieldType,
        name: impl Into<String>,
        codec: Arc<dyn FieldCodec>,
    ) -> Option<Arc<dyn FieldCodec>> {
        self.insert(CodecKey::new(field_type, name), codec)
    }

    /// Resolve a codec: the qualified entry if one matches, else the general one.
    pub fn find(
        &self,
        field_type: FieldType,
        name: &str,
        qualifier: Option<&str>,
    ) -> Result<Arc<dyn FieldCodec>> {
        if let Some(qualifier) = qualifier {
            if let Some(codec) = self
                .codecs
                .get(&CodecKey::qualified(field_type, name, qualifier))
            {
                return Ok(codec.clone());
            }
        }
        self.codecs
            .get(&CodecKey::new(field_type, name))
            .cloned()
            .ok_or_else(|| DcclError::CodecNotFound {
                name: name.to_owned(),
                field_type,
            })
    }

    pub fn contains(&self, key: &CodecKey) -> bool {
        self.codecs.contains_key(key)
    }

    pub fn remove(&mut self, key: &CodecKey) -> Option<Arc<dyn FieldCodec>> {
        self.codecs.shift_remove(key)
    }

    /// Every registration in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &CodecKey> {
        self.codecs.keys()
    }

    pub fn add_id_codec(&mut self, name: impl Into<String>, codec: Arc<dyn IdCodec>) -> Result<()> {
        let name = name.into();
        if self.id_codecs.contains_key(&name) {
            return Err(DcclError::DuplicateIdCodec(name));
        }
        self.id_codecs.insert(name, codec);
        Ok(())
    }

    pub fn find_id_codec(&self, name: &str) -> Result<Arc<dyn IdCodec>> {
        self.id_codecs
            .get(name)
            .cloned()
            .ok_or_else(|| DcclError::UnknownIdCodec(name.to_owned()))
    }
}
