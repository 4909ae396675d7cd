//! ---
//! ems_section: "15-testing-qa-runbook"
//! ems_subsection: "integration-tests"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Message codec round trips across every built-in field codec."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;

use acomms_common::{CodecConfig, IdCodecConfig};
use acomms_dccl::codecs::{ModemIdCodec, TimeCodec};
use acomms_dccl::{
    BitCursor, Bitset, BoundField, DcclError, FieldCodec, FieldCodecManager, FieldDescriptor,
    FieldType, FieldValue, Message, MessageCodec, MessageSchema, DEFAULT_CODEC, MODEM_ID_CODEC,
    STATIC_CODEC, TIME_CODEC,
};
use chrono::{TimeZone, Utc};

fn reference_time() -> i64 {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
        .single()
        .map(|time| time.timestamp())
        .unwrap_or_default()
}

fn registry() -> FieldCodecManager {
    let mut manager = FieldCodecManager::with_defaults();
    let reference = Utc.timestamp_opt(reference_time(), 0).unwrap();
    manager.replace(
        FieldType::Double,
        TIME_CODEC,
        Arc::new(TimeCodec::anchored(reference)),
    );
    manager
        .add(
            FieldType::String,
            MODEM_ID_CODEC,
            Arc::new(ModemIdCodec::new([(1, "topside"), (4, "auv-4")])),
        )
        .unwrap();
    manager
}

fn position_schema() -> MessageSchema {
    MessageSchema::new("Position")
        .field(
            FieldDescriptor::new("lat", FieldType::Double)
                .bounds(-90.0, 90.0)
                .precision(5),
        )
        .field(
            FieldDescriptor::new("lon", FieldType::Double)
                .bounds(-180.0, 180.0)
                .precision(5),
        )
}

fn nav_schema() -> MessageSchema {
    MessageSchema::new("NavReport")
        .with_id(20)
        .with_max_bytes(32)
        .field(FieldDescriptor::new("time", FieldType::Double).codec(TIME_CODEC))
        .field(FieldDescriptor::new("platform", FieldType::String).codec(MODEM_ID_CODEC))
        .field(
            FieldDescriptor::new("depth", FieldType::Double)
                .bounds(0.0, 6000.0)
                .precision(1),
        )
        .field(FieldDescriptor::new("mode", FieldType::Enum).enum_values(["idle", "transit", "survey"]))
        .field(FieldDescriptor::new("surfaced", FieldType::Bool).optional())
        .field(
            FieldDescriptor::new("label", FieldType::String)
                .max_length(8)
                .optional(),
        )
        .field(
            FieldDescriptor::new("samples", FieldType::Int32)
                .bounds(-100.0, 100.0)
                .repeated(4),
        )
        .field(FieldDescriptor::nested("position", position_schema()))
        .field(
            FieldDescriptor::new("vehicle_class", FieldType::String)
                .codec(STATIC_CODEC)
                .static_value("auv"),
        )
}

fn nav_report() -> Message {
    Message::new("NavReport")
        .with("time", (reference_time() + 300) as f64)
        .with("platform", "AUV-4")
        .with("depth", 123.4)
        .with("mode", FieldValue::Enum("survey".into()))
        .with("label", "ok")
        .with("samples", FieldValue::repeated([-5, 0, 99]))
        .with(
            "position",
            Message::new("Position")
                .with("lat", 41.52343)
                .with("lon", -70.67119),
        )
}

fn float(message: &Message, field: &str) -> f64 {
    message
        .get(field)
        .and_then(FieldValue::as_f64)
        .unwrap_or(f64::NAN)
}

#[test]
fn every_codec_round_trips_in_one_message() {
    let mut codec = MessageCodec::new(Arc::new(registry()));
    codec.validate(&nav_schema()).unwrap();
    let report = nav_report();

    let bits = codec.encode_bits(&report).unwrap();
    assert_eq!(bits.len(), 146);
    assert_eq!(codec.size_bits(&report).unwrap(), 146);
    let bytes = codec.encode(&report).unwrap();
    assert_eq!(bytes.len(), 19);
    assert_eq!(codec.size(&report).unwrap(), 19);

    let decoded = codec.decode(&bytes).unwrap();
    assert_eq!(decoded.name(), "NavReport");
    assert_eq!(float(&decoded, "time"), (reference_time() + 300) as f64);
    assert_eq!(decoded.get("platform"), Some(&FieldValue::from("auv-4")));
    assert!((float(&decoded, "depth") - 123.4).abs() < 1e-9);
    assert_eq!(decoded.get("mode"), Some(&FieldValue::Enum("survey".into())));
    assert!(!decoded.is_set("surfaced"));
    assert_eq!(decoded.get("label"), Some(&FieldValue::from("ok")));
    assert_eq!(
        decoded.get("samples"),
        Some(&FieldValue::Repeated(vec![
            FieldValue::Int(-5),
            FieldValue::Int(0),
            FieldValue::Int(99)
        ]))
    );
    let position = decoded
        .get("position")
        .and_then(FieldValue::as_message)
        .unwrap();
    assert!((float(position, "lat") - 41.52343).abs() < 1e-9);
    assert!((float(position, "lon") + 70.67119).abs() < 1e-9);
    assert_eq!(decoded.get("vehicle_class"), Some(&FieldValue::from("auv")));
}

#[test]
fn sizes_are_deterministic_and_bounded() {
    let mut codec = MessageCodec::new(Arc::new(registry()));
    codec.validate(&nav_schema()).unwrap();
    let min = codec.min_size("NavReport").unwrap();
    let max = codec.max_size("NavReport").unwrap();
    let report = nav_report();
    let size = codec.size(&report).unwrap();
    assert!(min <= size && size <= max);
    assert!(max <= 32);
    for _ in 0..3 {
        assert_eq!(codec.encode(&report).unwrap().len(), size);
    }

    let minimal = Message::new("NavReport")
        .with("time", reference_time() as f64)
        .with("platform", "topside")
        .with("depth", 0.0)
        .with("mode", FieldValue::Enum("idle".into()))
        .with("position", Message::new("Position").with("lat", 0.0).with("lon", 0.0));
    assert_eq!(codec.size(&minimal).unwrap(), min);
}

#[test]
fn optional_absence_costs_one_bit() {
    let mut codec = MessageCodec::new(Arc::new(FieldCodecManager::with_defaults()));
    let schema = MessageSchema::new("Flags")
        .with_id(3)
        .field(FieldDescriptor::new("armed", FieldType::Bool).optional());
    codec.validate(&schema).unwrap();
    let empty = Message::new("Flags");
    assert_eq!(codec.size_bits(&empty).unwrap(), 8 + 1);
    let set = Message::new("Flags").with("armed", true);
    assert_eq!(codec.size_bits(&set).unwrap(), 8 + 2);
    assert!(!codec.decode(&codec.encode(&empty).unwrap()).unwrap().is_set("armed"));
}

#[test]
fn empty_repeated_field_survives_a_round_trip() {
    let mut codec = MessageCodec::new(Arc::new(FieldCodecManager::with_defaults()));
    let schema = MessageSchema::new("Pings")
        .with_id(4)
        .field(FieldDescriptor::new("ranges", FieldType::UInt32).bounds(0.0, 255.0).repeated(3));
    codec.validate(&schema).unwrap();

    let message = Message::new("Pings").with("ranges", FieldValue::Repeated(Vec::new()));
    assert!(!message.is_set("ranges"));
    let decoded = codec.decode(&codec.encode(&message).unwrap()).unwrap();
    assert_eq!(decoded, message);
}

#[test]
fn out_of_bounds_values_are_rejected() {
    let mut codec = MessageCodec::new(Arc::new(registry()));
    codec.validate(&nav_schema()).unwrap();
    let deep = nav_report().with("depth", 7000.0);
    assert!(matches!(
        codec.encode(&deep),
        Err(DcclError::OutOfRange { ref field, .. }) if field == "depth"
    ));
    let crowded = nav_report().with("samples", FieldValue::repeated([1, 2, 3, 4, 5]));
    assert!(matches!(
        codec.encode(&crowded),
        Err(DcclError::OutOfRange { ref field, .. }) if field == "samples"
    ));
    let stranger = nav_report().with("platform", "glider-9");
    assert!(matches!(
        codec.encode(&stranger),
        Err(DcclError::InvalidValue { ref field, .. }) if field == "platform"
    ));
}

/// Sends a position as whole degrees in 17 bits.
#[derive(Debug)]
struct WholeDegrees;

impl FieldCodec for WholeDegrees {
    fn validate(&self, field: &BoundField) -> acomms_dccl::Result<()> {
        match field.nested() {
            Some(_) => Ok(()),
            None => Err(field.schema_error("whole degree codec needs an embedded position")),
        }
    }

    fn size(&self, _field: &BoundField, _value: &FieldValue) -> acomms_dccl::Result<usize> {
        Ok(17)
    }

    fn min_size(&self, _field: &BoundField) -> acomms_dccl::Result<usize> {
        Ok(17)
    }

    fn max_size(&self, _field: &BoundField) -> acomms_dccl::Result<usize> {
        Ok(17)
    }

    fn encode(&self, field: &BoundField, value: &FieldValue, bits: &mut Bitset) -> acomms_dccl::Result<()> {
        let position = value
            .as_message()
            .ok_or_else(|| field.invalid_value("expected a position"))?;
        let lat = float(position, "lat").round() + 90.0;
        let lon = float(position, "lon").round() + 180.0;
        bits.append_bits(lat as u64, 8)?;
        bits.append_bits(lon as u64, 9)
    }

    fn decode(&self, _field: &BoundField, cursor: &mut BitCursor<'_>) -> acomms_dccl::Result<FieldValue> {
        let lat = cursor.read_unsigned(8)? as f64 - 90.0;
        let lon = cursor.read_unsigned(9)? as f64 - 180.0;
        Ok(FieldValue::Message(
            Message::new("Position").with("lat", lat).with("lon", lon),
        ))
    }
}

#[test]
fn qualified_codec_overrides_embedded_message_layout() {
    let mut manager = registry();
    manager
        .add_qualified(FieldType::Message, DEFAULT_CODEC, "Position", Arc::new(WholeDegrees))
        .unwrap();
    let mut codec = MessageCodec::new(Arc::new(manager));
    codec.validate(&nav_schema()).unwrap();

    let report = nav_report();
    assert_eq!(codec.size_bits(&report).unwrap(), 146 - 51 + 17);
    let decoded = codec.decode(&codec.encode(&report).unwrap()).unwrap();
    let position = decoded
        .get("position")
        .and_then(FieldValue::as_message)
        .unwrap();
    assert_eq!(float(position, "lat"), 42.0);
    assert_eq!(float(position, "lon"), -71.0);
}

#[test]
fn unregistered_codec_fails_validation() {
    let mut codec = MessageCodec::new(Arc::new(FieldCodecManager::with_defaults()));
    let schema = MessageSchema::new("Odd")
        .with_id(4)
        .field(FieldDescriptor::new("blob", FieldType::Bytes).max_length(4).codec("zlib"));
    assert_eq!(
        codec.validate(&schema),
        Err(DcclError::CodecNotFound {
            name: "zlib".into(),
            field_type: FieldType::Bytes
        })
    );
    assert!(!codec.is_validated("Odd"));
}

#[test]
fn json_schema_with_fixed_header_matches_reference_layout() {
    let schema: MessageSchema = serde_json::from_str(
        r#"{
            "name": "Simple",
            "id": 1,
            "fields": [
                { "name": "value", "type": "uint32", "options": { "min": 0, "max": 127 } }
            ]
        }"#,
    )
    .unwrap();
    let config = CodecConfig {
        id_codec: IdCodecConfig::Fixed { width: 8 },
    };
    let mut codec =
        MessageCodec::from_config(Arc::new(FieldCodecManager::with_defaults()), &config);
    codec.validate(&schema).unwrap();

    let message = Message::new("Simple").with("value", 42u32);
    assert_eq!(codec.size_bits(&message).unwrap(), 15);
    let bytes = codec.encode(&message).unwrap();
    assert_eq!(bytes.len(), 2);
    assert_eq!(codec.id_from_encoded(&bytes).unwrap(), 1);
    assert_eq!(
        codec.decode(&bytes).unwrap().get("value"),
        Some(&FieldValue::UInt(42))
    );
}

#[test]
fn concatenated_messages_split_back_apart() {
    let mut codec = MessageCodec::new(Arc::new(registry()));
    codec.validate(&nav_schema()).unwrap();
    let flags = MessageSchema::new("Flags")
        .with_id(3)
        .field(FieldDescriptor::new("armed", FieldType::Bool));
    codec.validate(&flags).unwrap();

    let batch = vec![
        Message::new("Flags").with("armed", true),
        nav_report(),
        Message::new("Flags").with("armed", false),
    ];
    let bytes = codec.encode_repeated(&batch).unwrap();
    assert_eq!(bytes.len(), 2 + 19 + 2);
    let decoded = codec.decode_repeated(&bytes).unwrap();
    let names: Vec<&str> = decoded.iter().map(Message::name).collect();
    assert_eq!(names, ["Flags", "NavReport", "Flags"]);
    assert_eq!(decoded[2].get("armed"), Some(&FieldValue::Bool(false)));

    let info = codec.info_all().unwrap();
    assert!(info.find("Begin Flags").unwrap() < info.find("Begin NavReport").unwrap());
}
