//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Error taxonomy for schema validation, encoding and decoding."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use thiserror::Error;

use crate::schema::FieldType;

/// Shared result type for codec operations.
pub type Result<T> = std::result::Result<T, DcclError>;

/// Errors raised while registering codecs, validating schemas or moving bits.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DcclError {
    /// A schema or one of its fields carries inconsistent options.
    #[error("invalid schema '{message}' (field '{field}'): {reason}")]
    InvalidSchema {
        /// Message type name.
        message: String,
        /// Offending field, empty for message-level problems.
        field: String,
        /// Human readable reason.
        reason: String,
    },
    /// No codec is registered under the requested name for the field type.
    #[error("no field codec '{name}' registered for type {field_type}")]
    CodecNotFound {
        /// Codec name looked up.
        name: String,
        /// Field type looked up.
        field_type: FieldType,
    },
    /// A codec is already registered under this key.
    #[error("field codec '{name}' already registered for type {field_type}")]
    DuplicateCodec {
        /// Codec name.
        name: String,
        /// Field type.
        field_type: FieldType,
        /// Qualifier, if the registration was qualified.
        qualifier: Option<String>,
    },
    /// A required field was not set on the message being encoded.
    #[error("message '{message}' is missing required field '{field}'")]
    MissingRequiredField {
        /// Message type name.
        message: String,
        /// Field name.
        field: String,
    },
    /// The byte string is shorter than the message needs.
    #[error("encoded message too short: need {required} bits, have {available}")]
    DecodeSizeMismatch {
        /// Bits required.
        required: usize,
        /// Bits available.
        available: usize,
    },
    /// The header carries an identifier no validated schema uses.
    #[error("no validated message with id {0}")]
    UnknownMessageId(u32),
    /// The message type has not been validated.
    #[error("message '{0}' has not been validated")]
    UnknownMessage(String),
    /// An identifier codec is already registered under this name.
    #[error("id codec '{0}' already registered")]
    DuplicateIdCodec(String),
    /// No identifier codec is registered under this name.
    #[error("no id codec named '{0}'")]
    UnknownIdCodec(String),
    /// A value does not fit the requested bit width.
    #[error("size mismatch: {0}")]
    SizeMismatch(String),
    /// A field value lies outside its declared bounds.
    #[error("field '{field}' out of range: {reason}")]
    OutOfRange {
        /// Field name.
        field: String,
        /// Human readable reason.
        reason: String,
    },
    /// A field value has the wrong shape for its codec.
    #[error("field '{field}' has an invalid value: {reason}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Human readable reason.
        reason: String,
    },
}

impl DcclError {
    pub(crate) fn schema(
        message: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        DcclError::InvalidSchema {
            message: message.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }
}
