//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Pluggable per-field encoder contract."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt::Debug;

use crate::bitset::{BitCursor, Bitset};
use crate::error::Result;
use crate::layout::BoundField;
use crate::value::FieldValue;

/// Encoder/decoder for a single field value.
///
/// Codecs only ever see one element: presence bits for optional fields and the count
/// prefix of repeated fields are written by [`BoundField`] around every codec call.
/// Sizes are in bits. Implementations are shared between schemas and must not keep
/// per-message state.
pub trait FieldCodec: Send + Sync + Debug {
    /// Check the field's options; called once when a schema is validated.
    fn validate(&self, field: &BoundField) -> Result<()>;

    /// Encoded size of `value`.
    fn size(&self, field: &BoundField, value: &FieldValue) -> Result<usize>;

    fn min_size(&self, field: &BoundField) -> Result<usize>;

    fn max_size(&self, field: &BoundField) -> Result<usize>;

    fn encode(&self, field: &BoundField, value: &FieldValue, bits: &mut Bitset) -> Result<()>;

    fn decode(&self, field: &BoundField, cursor: &mut BitCursor<'_>) -> Result<FieldValue>;

    /// Value implied by the schema alone. Fields with a fixed value occupy no bits and
    /// bypass presence handling entirely.
    fn fixed_value(&self, _field: &BoundField) -> Result<Option<FieldValue>> {
        Ok(None)
    }
}
