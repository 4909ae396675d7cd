//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Message schema model consumed by the message codec."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Schema model.
//!
//! Schemas are plain data: a loader (or hand-written code) builds a [`MessageSchema`] and
//! hands it to [`crate::MessageCodec::validate`], which keeps its own validated copy.
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Name of the codec used when a field does not ask for one.
pub const DEFAULT_CODEC: &str = "default";

/// Semantic type of a field.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FieldType {
    Bool,
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float,
    Double,
    String,
    Bytes,
    Enum,
    Message,
}

impl FieldType {
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            FieldType::Int32 | FieldType::Int64 | FieldType::UInt32 | FieldType::UInt64
        )
    }

    pub fn is_signed_integer(self) -> bool {
        matches!(self, FieldType::Int32 | FieldType::Int64)
    }

    pub fn is_floating(self) -> bool {
        matches!(self, FieldType::Float | FieldType::Double)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_floating()
    }

    /// Inclusive value range of the storage type, for numeric types.
    pub fn storage_bounds(self) -> Option<(f64, f64)> {
        match self {
            FieldType::Int32 => Some((i32::MIN as f64, i32::MAX as f64)),
            FieldType::Int64 => Some((i64::MIN as f64, i64::MAX as f64)),
            FieldType::UInt32 => Some((0.0, u32::MAX as f64)),
            FieldType::UInt64 => Some((0.0, u64::MAX as f64)),
            FieldType::Float => Some((f32::MIN as f64, f32::MAX as f64)),
            FieldType::Double => Some((f64::MIN, f64::MAX)),
            _ => None,
        }
    }
}

/// Presence rule of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Label {
    #[default]
    Required,
    Optional,
    Repeated,
}

/// Codec-specific options attached to a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldOptions {
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Decimal digits kept after the point; negative values round to tens, hundreds, ...
    pub precision: i32,
    pub max_length: Option<usize>,
    pub fixed_length: bool,
    pub max_repeat: Option<usize>,
    pub static_value: Option<String>,
    pub enum_values: Vec<String>,
    /// Selects a qualified codec registration; defaults to the nested message name.
    pub qualifier: Option<String>,
}

/// One entry of a message schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub label: Label,
    #[serde(default)]
    pub codec: Option<String>,
    #[serde(default)]
    pub options: FieldOptions,
    /// Layout of an embedded message, for [`FieldType::Message`] fields.
    #[serde(default)]
    pub message: Option<Box<MessageSchema>>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            label: Label::Required,
            codec: None,
            options: FieldOptions::default(),
            message: None,
        }
    }

    /// Field embedding another message.
    pub fn nested(name: impl Into<String>, schema: MessageSchema) -> Self {
        let mut field = Self::new(name, FieldType::Message);
        field.message = Some(Box::new(schema));
        field
    }

    pub fn optional(mut self) -> Self {
        self.label = Label::Optional;
        self
    }

    pub fn repeated(mut self, max_repeat: usize) -> Self {
        self.label = Label::Repeated;
        self.options.max_repeat = Some(max_repeat);
        self
    }

    pub fn bounds(mut self, min: f64, max: f64) -> Self {
        self.options.min = Some(min);
        self.options.max = Some(max);
        self
    }

    pub fn precision(mut self, precision: i32) -> Self {
        self.options.precision = precision;
        self
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.options.max_length = Some(max_length);
        self
    }

    pub fn fixed_length(mut self) -> Self {
        self.options.fixed_length = true;
        self
    }

    pub fn enum_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.enum_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn static_value(mut self, value: impl Into<String>) -> Self {
        self.options.static_value = Some(value.into());
        self
    }

    pub fn codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = Some(codec.into());
        self
    }

    pub fn qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.options.qualifier = Some(qualifier.into());
        self
    }

    pub fn codec_name(&self) -> &str {
        self.codec.as_deref().unwrap_or(DEFAULT_CODEC)
    }

    /// Qualifier used for codec lookup: explicit option first, else the nested message name.
    pub fn lookup_qualifier(&self) -> Option<&str> {
        self.options
            .qualifier
            .as_deref()
            .or_else(|| self.message.as_ref().map(|schema| schema.name.as_str()))
    }
}

/// Ordered field layout of one message type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSchema {
    pub name: String,
    #[serde(default)]
    pub id: Option<u32>,
    #[serde(default)]
    pub max_bytes: Option<usize>,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

impl MessageSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            max_bytes: None,
            fields: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field_named(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }
}
