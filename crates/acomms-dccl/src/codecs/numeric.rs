//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Bounded fixed-point codec for integer and floating point fields."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Bounded numeric codec.
//!
//! A value `v` in `[min, max]` is sent as the unsigned integer
//! `round((v - min) * 10^precision)` in `ceil(log2((max - min) * 10^precision + 1))` bits.
//! Integer fields with zero precision take an exact integer path so 64-bit bounds do not
//! lose precision through floating point.
use crate::bitset::{bits_for, BitCursor, Bitset};
use crate::error::Result;
use crate::field_codec::FieldCodec;
use crate::layout::BoundField;
use crate::schema::FieldType;
use crate::value::FieldValue;

const MAX_EXTRA_DIGITS: i32 = 15;

/// Default codec for `int32`, `int64`, `uint32`, `uint64`, `float` and `double`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultNumericCodec;

#[derive(Debug, Clone, Copy)]
enum Layout {
    Exact {
        min: i128,
        max: i128,
        width: usize,
    },
    Scaled {
        min: f64,
        max: f64,
        precision: i32,
        /// Digits kept on decode; finer than `precision` when `min` is off its grid.
        decode_precision: i32,
        range: u64,
        width: usize,
    },
}

impl Layout {
    fn width(&self) -> usize {
        match self {
            Layout::Exact { width, .. } | Layout::Scaled { width, .. } => *width,
        }
    }
}

/// `value * 10^precision`, dividing for negative precision to keep powers of ten exact.
fn scale_up(value: f64, precision: i32) -> f64 {
    if precision >= 0 {
        value * 10f64.powi(precision)
    } else {
        value / 10f64.powi(-precision)
    }
}

fn scale_down(steps: f64, precision: i32) -> f64 {
    if precision >= 0 {
        steps / 10f64.powi(precision)
    } else {
        steps * 10f64.powi(-precision)
    }
}

/// Round to `precision` decimal digits, ties to even.
fn round_to_precision(value: f64, precision: i32) -> f64 {
    scale_down(scale_up(value, precision).round_ties_even(), precision)
}

/// Smallest precision at or above `precision` that represents `min` exactly.
fn grid_precision(min: f64, precision: i32) -> i32 {
    let tolerance = 1e-9 * min.abs().max(1.0);
    (precision..precision + MAX_EXTRA_DIGITS)
        .find(|&digits| (round_to_precision(min, digits) - min).abs() <= tolerance)
        .unwrap_or(precision + MAX_EXTRA_DIGITS)
}

fn integer_bound(field: &BoundField, value: f64) -> Result<i128> {
    if value.fract() != 0.0 {
        return Err(field.schema_error(format!("bound {} is not an integer", value)));
    }
    Ok(value as i128)
}

impl DefaultNumericCodec {
    fn layout(&self, field: &BoundField) -> Result<Layout> {
        let field_type = field.field_type();
        let options = field.options();
        let (storage_min, storage_max) = field_type
            .storage_bounds()
            .ok_or_else(|| field.schema_error(format!("{} is not a numeric type", field_type)))?;
        let min = options
            .min
            .ok_or_else(|| field.schema_error("numeric fields require a min bound"))?;
        let max = options
            .max
            .ok_or_else(|| field.schema_error("numeric fields require a max bound"))?;
        if !min.is_finite() || !max.is_finite() {
            return Err(field.schema_error("bounds must be finite"));
        }
        if max < min {
            return Err(field.schema_error(format!("max {} is below min {}", max, min)));
        }
        if min < storage_min || max > storage_max {
            return Err(field.schema_error(format!(
                "bounds [{}, {}] exceed the range of {}",
                min, max, field_type
            )));
        }
        if field_type.is_integer() && options.precision > 0 {
            return Err(field.schema_error("integer fields cannot carry decimal precision"));
        }

        if field_type.is_integer() && options.precision == 0 {
            let (type_min, type_max) = match field_type {
                FieldType::Int32 => (i32::MIN as i128, i32::MAX as i128),
                FieldType::Int64 => (i64::MIN as i128, i64::MAX as i128),
                FieldType::UInt32 => (0, u32::MAX as i128),
                _ => (0, u64::MAX as i128),
            };
            let min = integer_bound(field, min)?.max(type_min);
            let max = integer_bound(field, max)?.min(type_max);
            let range = (max - min) as u64;
            return Ok(Layout::Exact {
                min,
                max,
                width: bits_for(range),
            });
        }

        let span = scale_up(max - min, options.precision).round();
        if span >= u64::MAX as f64 {
            return Err(field.schema_error(format!(
                "range [{}, {}] at precision {} needs more than 64 bits",
                min, max, options.precision
            )));
        }
        let range = span as u64;
        Ok(Layout::Scaled {
            min,
            max,
            precision: options.precision,
            decode_precision: grid_precision(min, options.precision),
            range,
            width: bits_for(range),
        })
    }

    fn wire_value(&self, field: &BoundField, layout: &Layout, value: &FieldValue) -> Result<u64> {
        match *layout {
            Layout::Exact { min, max, .. } => {
                let value: i128 = match value {
                    FieldValue::Int(v) => i128::from(*v),
                    FieldValue::UInt(v) => i128::from(*v),
                    FieldValue::Float(v) if v.fract() == 0.0 => *v as i128,
                    other => {
                        return Err(field.invalid_value(format!(
                            "expected an integer, got {}",
                            other.kind()
                        )))
                    }
                };
                if value < min || value > max {
                    return Err(field.out_of_range(format!(
                        "{} outside [{}, {}]",
                        value, min, max
                    )));
                }
                Ok((value - min) as u64)
            }
            Layout::Scaled {
                min,
                max,
                precision,
                range,
                ..
            } => {
                let raw = value.as_f64().ok_or_else(|| {
                    field.invalid_value(format!("expected a number, got {}", value.kind()))
                })?;
                if !raw.is_finite() {
                    return Err(field.invalid_value("value is not finite"));
                }
                if raw < min || raw > max {
                    return Err(field.out_of_range(format!(
                        "{} outside [{}, {}]",
                        raw, min, max
                    )));
                }
                let wire = scale_up(raw - min, precision).round_ties_even();
                Ok((wire.max(0.0) as u64).min(range))
            }
        }
    }

    fn from_wire(&self, field: &BoundField, layout: &Layout, wire: u64) -> Result<FieldValue> {
        let field_type = field.field_type();
        match *layout {
            Layout::Exact { min, max, .. } => {
                let value = min + i128::from(wire);
                if value > max {
                    return Err(field.out_of_range(format!(
                        "decoded {} exceeds max {}",
                        value, max
                    )));
                }
                if field_type.is_signed_integer() {
                    Ok(FieldValue::Int(value as i64))
                } else {
                    Ok(FieldValue::UInt(value as u64))
                }
            }
            Layout::Scaled {
                min,
                max,
                precision,
                decode_precision,
                range,
                ..
            } => {
                if wire > range {
                    return Err(field.out_of_range(format!(
                        "decoded step {} exceeds range {}",
                        wire, range
                    )));
                }
                // The top step can land past `max` when the span is not a whole number of steps.
                let value = round_to_precision(
                    min + scale_down(wire as f64, precision),
                    decode_precision,
                )
                .clamp(min, max);
                Ok(match field_type {
                    FieldType::Int32 | FieldType::Int64 => FieldValue::Int(value as i64),
                    FieldType::UInt32 | FieldType::UInt64 => FieldValue::UInt(value as u64),
                    _ => FieldValue::Float(value),
                })
            }
        }
    }
}

impl FieldCodec for DefaultNumericCodec {
    fn validate(&self, field: &BoundField) -> Result<()> {
        let width = self.layout(field)?.width();
        if width > u64::BITS as usize {
            return Err(field.schema_error(format!("{} bits exceed the 64 bit limit", width)));
        }
        Ok(())
    }

    fn size(&self, field: &BoundField, _value: &FieldValue) -> Result<usize> {
        Ok(self.layout(field)?.width())
    }

    fn min_size(&self, field: &BoundField) -> Result<usize> {
        Ok(self.layout(field)?.width())
    }

    fn max_size(&self, field: &BoundField) -> Result<usize> {
        Ok(self.layout(field)?.width())
    }

    fn encode(&self, field: &BoundField, value: &FieldValue, bits: &mut Bitset) -> Result<()> {
        let layout = self.layout(field)?;
        let wire = self.wire_value(field, &layout, value)?;
        bits.append_bits(wire, layout.width())
    }

    fn decode(&self, field: &BoundField, cursor: &mut BitCursor<'_>) -> Result<FieldValue> {
        let layout = self.layout(field)?;
        let wire = cursor.read_unsigned(layout.width())?;
        self.from_wire(field, &layout, wire)
    }
}
