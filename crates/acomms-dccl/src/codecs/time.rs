//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Time-of-day codec for timestamp fields."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Timestamp codec.
//!
//! Only the UTC second of the day is sent (17 bits). The receiver puts the date back by
//! picking the candidate day that lies within twelve hours of its own clock, so sender and
//! receiver must agree on time to better than half a day.
use chrono::{DateTime, Utc};

use crate::bitset::{bits_for, BitCursor, Bitset};
use crate::error::Result;
use crate::field_codec::FieldCodec;
use crate::layout::BoundField;
use crate::schema::FieldType;
use crate::value::FieldValue;

const SECONDS_PER_DAY: i64 = 86_400;
const HALF_DAY: i64 = SECONDS_PER_DAY / 2;

/// Codec for `int64`, `uint64` and `double` fields holding seconds since the UNIX epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimeCodec {
    reference: Option<DateTime<Utc>>,
}

impl TimeCodec {
    /// Resolve decoded times against the current UTC clock.
    pub fn new() -> Self {
        Self { reference: None }
    }

    /// Resolve decoded times against a fixed instant.
    pub fn anchored(reference: DateTime<Utc>) -> Self {
        Self {
            reference: Some(reference),
        }
    }

    fn width(&self) -> usize {
        bits_for((SECONDS_PER_DAY - 1) as u64)
    }

    fn resolve(&self, second_of_day: i64) -> i64 {
        let reference = self.reference.unwrap_or_else(Utc::now).timestamp();
        let day_start = reference - reference.rem_euclid(SECONDS_PER_DAY);
        let candidate = day_start + second_of_day;
        if candidate - reference > HALF_DAY {
            candidate - SECONDS_PER_DAY
        } else if reference - candidate > HALF_DAY {
            candidate + SECONDS_PER_DAY
        } else {
            candidate
        }
    }
}

impl FieldCodec for TimeCodec {
    fn validate(&self, field: &BoundField) -> Result<()> {
        match field.field_type() {
            FieldType::Int64 | FieldType::UInt64 | FieldType::Double => Ok(()),
            other => Err(field.schema_error(format!("time codec cannot handle {}", other))),
        }
    }

    fn size(&self, _field: &BoundField, _value: &FieldValue) -> Result<usize> {
        Ok(self.width())
    }

    fn min_size(&self, _field: &BoundField) -> Result<usize> {
        Ok(self.width())
    }

    fn max_size(&self, _field: &BoundField) -> Result<usize> {
        Ok(self.width())
    }

    fn encode(&self, field: &BoundField, value: &FieldValue, bits: &mut Bitset) -> Result<()> {
        let seconds = value.as_f64().ok_or_else(|| {
            field.invalid_value(format!("expected seconds since epoch, got {}", value.kind()))
        })?;
        if !seconds.is_finite() {
            return Err(field.invalid_value("timestamp is not finite"));
        }
        let second_of_day = (seconds.round_ties_even() as i64).rem_euclid(SECONDS_PER_DAY);
        bits.append_bits(second_of_day as u64, self.width())
    }

    fn decode(&self, field: &BoundField, cursor: &mut BitCursor<'_>) -> Result<FieldValue> {
        let second_of_day = cursor.read_unsigned(self.width())? as i64;
        if second_of_day >= SECONDS_PER_DAY {
            return Err(field.out_of_range(format!(
                "second of day {} exceeds a day",
                second_of_day
            )));
        }
        let seconds = self.resolve(second_of_day);
        Ok(match field.field_type() {
            FieldType::Int64 => FieldValue::Int(seconds),
            FieldType::UInt64 => FieldValue::UInt(seconds.max(0) as u64),
            _ => FieldValue::Float(seconds as f64),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::*;
    use crate::codecs::tests::bind_with;
    use crate::manager::{FieldCodecManager, TIME_CODEC};
    use crate::schema::FieldDescriptor;

    fn bound_at(reference: DateTime<Utc>) -> BoundField {
        let mut manager = FieldCodecManager::with_defaults();
        manager.replace(
            FieldType::UInt64,
            TIME_CODEC,
            Arc::new(TimeCodec::anchored(reference)),
        );
        bind_with(
            &manager,
            FieldDescriptor::new("stamp", FieldType::UInt64).codec(TIME_CODEC),
        )
        .unwrap()
    }

    #[test]
    fn same_day_round_trip() {
        let sent = Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 15).unwrap().timestamp() as u64;
        let received = Utc.with_ymd_and_hms(2024, 5, 1, 10, 31, 0).unwrap();
        let bound = bound_at(received);
        let mut bits = Bitset::new();
        bound
            .encode_value(Some(&FieldValue::UInt(sent)), &mut bits)
            .unwrap();
        assert_eq!(bits.len(), 17);
        assert_eq!(
            bound.decode_value(&mut bits.cursor()).unwrap(),
            Some(FieldValue::UInt(sent))
        );
    }

    #[test]
    fn message_sent_before_midnight_resolves_to_previous_day() {
        let sent = Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 50).unwrap().timestamp() as u64;
        let received = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 20).unwrap();
        let bound = bound_at(received);
        let mut bits = Bitset::new();
        bound
            .encode_value(Some(&FieldValue::UInt(sent)), &mut bits)
            .unwrap();
        assert_eq!(
            bound.decode_value(&mut bits.cursor()).unwrap(),
            Some(FieldValue::UInt(sent))
        );
    }
}
