//! Schema mapper for GTFS-Realtime feeds.
//!
//! Translates the generic [`FieldMap`](crate::wire::FieldMap) produced by
//! the wire reader into the typed model in [`crate::feed`], applying the
//! fixed field-number contract of each message type. Absent fields fall
//! back to documented defaults; a value whose wire shape contradicts the
//! schema fails loudly with [`SchemaError`] instead of being reinterpreted.

use chrono::Utc;
use thiserror::Error;
use tracing::warn;

use crate::feed::{
    Alert, EntitySelector, FeedEntity, FeedHeader, ParsedFeed, Position, ScheduleRelationship,
    StopTimeEvent, StopTimeUpdate, TimeRange, TranslatedString, Translation, TripDescriptor,
    TripUpdate, VehiclePosition, VehicleStopStatus,
};
use crate::wire::{self, FieldMap, WireError, WireValue};

/// A field-map entry whose wire shape does not match the schema.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("field {field} holds {found}, expected {expected}")]
pub struct SchemaError {
    pub field: u32,
    pub expected: &'static str,
    pub found: &'static str,
}

/// Any failure while decoding a feed.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Field numbers per message type.
///
/// `FeedEntity` and `TripDescriptor` follow the numbering the upstream
/// producer uses; the rest is the published GTFS-Realtime contract.
mod fields {
    pub mod feed_message {
        pub const HEADER: u32 = 1;
        pub const ENTITY: u32 = 2;
    }
    pub mod feed_header {
        pub const GTFS_REALTIME_VERSION: u32 = 1;
        pub const TIMESTAMP: u32 = 3;
    }
    pub mod feed_entity {
        pub const ID: u32 = 1;
        pub const TRIP_UPDATE: u32 = 2;
        pub const VEHICLE: u32 = 3;
        pub const ALERT: u32 = 4;
    }
    pub mod trip_descriptor {
        pub const TRIP_ID: u32 = 1;
        pub const START_DATE: u32 = 2;
        pub const START_TIME: u32 = 4;
        pub const ROUTE_ID: u32 = 5;
        pub const DIRECTION_ID: u32 = 6;
    }
    pub mod trip_update {
        pub const TRIP: u32 = 1;
        pub const STOP_TIME_UPDATE: u32 = 2;
        pub const TIMESTAMP: u32 = 4;
    }
    pub mod stop_time_update {
        pub const ARRIVAL: u32 = 2;
        pub const DEPARTURE: u32 = 3;
        pub const STOP_ID: u32 = 4;
        pub const SCHEDULE_RELATIONSHIP: u32 = 5;
    }
    pub mod stop_time_event {
        pub const DELAY: u32 = 1;
        pub const TIME: u32 = 2;
        pub const UNCERTAINTY: u32 = 3;
    }
    pub mod vehicle_position {
        pub const TRIP: u32 = 1;
        pub const POSITION: u32 = 2;
        pub const CURRENT_STOP_SEQUENCE: u32 = 3;
        pub const CURRENT_STATUS: u32 = 4;
        pub const TIMESTAMP: u32 = 5;
        pub const STOP_ID: u32 = 7;
    }
    pub mod position {
        pub const LATITUDE: u32 = 1;
        pub const LONGITUDE: u32 = 2;
        pub const BEARING: u32 = 3;
        pub const SPEED: u32 = 5;
    }
    pub mod alert {
        pub const ACTIVE_PERIOD: u32 = 1;
        pub const INFORMED_ENTITY: u32 = 5;
        pub const CAUSE: u32 = 6;
        pub const EFFECT: u32 = 7;
        pub const URL: u32 = 8;
        pub const HEADER_TEXT: u32 = 10;
        pub const DESCRIPTION_TEXT: u32 = 11;
    }
    pub mod time_range {
        pub const START: u32 = 1;
        pub const END: u32 = 2;
    }
    pub mod entity_selector {
        pub const AGENCY_ID: u32 = 1;
        pub const ROUTE_ID: u32 = 2;
        pub const ROUTE_TYPE: u32 = 3;
        pub const TRIP: u32 = 4;
        pub const STOP_ID: u32 = 5;
    }
    pub mod translated_string {
        pub const TRANSLATION: u32 = 1;
    }
    pub mod translation {
        pub const TEXT: u32 = 1;
        pub const LANGUAGE: u32 = 2;
    }
}

/// Decodes a protobuf-encoded GTFS-RT `FeedMessage` from raw bytes.
///
/// Entities keep wire order. A schema mismatch inside one entity's
/// optional payload drops that payload with a warning; wire-level errors
/// reject the whole feed.
///
/// # Errors
///
/// [`ParseError`] on truncated or otherwise malformed wire data, or a
/// schema mismatch at the feed level.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, ParseError> {
    let fields = wire::parse_message(bytes)?;

    let header = match first_bytes(&fields, fields::feed_message::HEADER)? {
        Some(buf) => map_header(buf)?,
        None => map_header(&[])?,
    };

    let mut entities = Vec::new();
    for buf in repeated_bytes(&fields, fields::feed_message::ENTITY)? {
        entities.push(map_entity(buf)?);
    }

    Ok(ParsedFeed { header, entities })
}

fn map_header(buf: &[u8]) -> Result<FeedHeader, ParseError> {
    let fields = wire::parse_message(buf)?;
    let gtfs_realtime_version = first_string(&fields, fields::feed_header::GTFS_REALTIME_VERSION)?
        .unwrap_or_else(|| "1.0".to_string());
    let timestamp = first_varint(&fields, fields::feed_header::TIMESTAMP)?
        .map(|t| t as i64)
        .unwrap_or_else(|| Utc::now().timestamp());
    Ok(FeedHeader {
        gtfs_realtime_version,
        timestamp,
    })
}

fn map_entity(buf: &[u8]) -> Result<FeedEntity, ParseError> {
    let fields = wire::parse_message(buf)?;
    let id = first_string(&fields, fields::feed_entity::ID)?.unwrap_or_default();

    let trip_update =
        optional_payload(&fields, fields::feed_entity::TRIP_UPDATE, &id, map_trip_update)?;
    let vehicle = optional_payload(&fields, fields::feed_entity::VEHICLE, &id, map_vehicle)?;
    let alert = optional_payload(&fields, fields::feed_entity::ALERT, &id, map_alert)?;

    Ok(FeedEntity {
        id,
        trip_update,
        vehicle,
        alert,
    })
}

/// Extracts one of an entity's optional payloads. A schema mismatch inside
/// the payload drops it and keeps the entity; wire errors propagate.
fn optional_payload<T>(
    fields: &FieldMap<'_>,
    field: u32,
    entity_id: &str,
    map: impl Fn(&[u8]) -> Result<T, ParseError>,
) -> Result<Option<T>, ParseError> {
    let value = match fields.first(field) {
        None => return Ok(None),
        Some(WireValue::Bytes(buf)) => map(*buf),
        Some(other) => Err(SchemaError {
            field,
            expected: "bytes",
            found: other.kind(),
        }
        .into()),
    };
    match value {
        Ok(value) => Ok(Some(value)),
        Err(ParseError::Schema(err)) => {
            warn!(entity_id, field, error = %err, "Dropping entity payload on schema mismatch");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn map_trip_descriptor(buf: &[u8]) -> Result<TripDescriptor, ParseError> {
    let fields = wire::parse_message(buf)?;
    Ok(TripDescriptor {
        trip_id: first_string(&fields, fields::trip_descriptor::TRIP_ID)?.unwrap_or_default(),
        route_id: first_string(&fields, fields::trip_descriptor::ROUTE_ID)?.unwrap_or_default(),
        start_date: first_string(&fields, fields::trip_descriptor::START_DATE)?.unwrap_or_default(),
        start_time: first_string(&fields, fields::trip_descriptor::START_TIME)?,
        direction_id: first_varint(&fields, fields::trip_descriptor::DIRECTION_ID)?
            .map(|v| v as u32),
    })
}

fn map_trip_update(buf: &[u8]) -> Result<TripUpdate, ParseError> {
    let fields = wire::parse_message(buf)?;

    let trip = match first_bytes(&fields, fields::trip_update::TRIP)? {
        Some(buf) => map_trip_descriptor(buf)?,
        None => TripDescriptor::default(),
    };

    let mut stop_time_updates = Vec::new();
    for buf in repeated_bytes(&fields, fields::trip_update::STOP_TIME_UPDATE)? {
        stop_time_updates.push(map_stop_time_update(buf)?);
    }

    Ok(TripUpdate {
        trip,
        stop_time_updates,
        timestamp: first_varint(&fields, fields::trip_update::TIMESTAMP)?,
    })
}

fn map_stop_time_update(buf: &[u8]) -> Result<StopTimeUpdate, ParseError> {
    let fields = wire::parse_message(buf)?;

    let arrival = match first_bytes(&fields, fields::stop_time_update::ARRIVAL)? {
        Some(buf) => Some(map_stop_time_event(buf)?),
        None => None,
    };
    let departure = match first_bytes(&fields, fields::stop_time_update::DEPARTURE)? {
        Some(buf) => Some(map_stop_time_event(buf)?),
        None => None,
    };

    Ok(StopTimeUpdate {
        stop_id: first_string(&fields, fields::stop_time_update::STOP_ID)?.unwrap_or_default(),
        arrival,
        departure,
        schedule_relationship: first_varint(
            &fields,
            fields::stop_time_update::SCHEDULE_RELATIONSHIP,
        )?
        .map(ScheduleRelationship::from_raw),
    })
}

fn map_stop_time_event(buf: &[u8]) -> Result<StopTimeEvent, ParseError> {
    let fields = wire::parse_message(buf)?;
    Ok(StopTimeEvent {
        time: first_varint(&fields, fields::stop_time_event::TIME)?.map(|v| v as i64),
        delay: first_varint(&fields, fields::stop_time_event::DELAY)?.map(|v| v as i64 as i32),
        uncertainty: first_varint(&fields, fields::stop_time_event::UNCERTAINTY)?
            .map(|v| v as i64 as i32),
    })
}

fn map_vehicle(buf: &[u8]) -> Result<VehiclePosition, ParseError> {
    let fields = wire::parse_message(buf)?;

    let trip = match first_bytes(&fields, fields::vehicle_position::TRIP)? {
        Some(buf) => map_trip_descriptor(buf)?,
        None => TripDescriptor::default(),
    };
    let position = match first_bytes(&fields, fields::vehicle_position::POSITION)? {
        Some(buf) => Some(map_position(buf)?),
        None => None,
    };

    Ok(VehiclePosition {
        trip,
        position,
        current_stop_sequence: first_varint(
            &fields,
            fields::vehicle_position::CURRENT_STOP_SEQUENCE,
        )?
        .map(|v| v as u32),
        stop_id: first_string(&fields, fields::vehicle_position::STOP_ID)?,
        current_status: first_varint(&fields, fields::vehicle_position::CURRENT_STATUS)?
            .map(VehicleStopStatus::from_raw),
        timestamp: first_varint(&fields, fields::vehicle_position::TIMESTAMP)?,
    })
}

fn map_position(buf: &[u8]) -> Result<Position, ParseError> {
    let fields = wire::parse_message(buf)?;
    Ok(Position {
        latitude: first_f32(&fields, fields::position::LATITUDE)?.unwrap_or(0.0),
        longitude: first_f32(&fields, fields::position::LONGITUDE)?.unwrap_or(0.0),
        bearing: first_f32(&fields, fields::position::BEARING)?,
        speed: first_f32(&fields, fields::position::SPEED)?,
    })
}

fn map_alert(buf: &[u8]) -> Result<Alert, ParseError> {
    let fields = wire::parse_message(buf)?;

    let mut active_periods = Vec::new();
    for buf in repeated_bytes(&fields, fields::alert::ACTIVE_PERIOD)? {
        active_periods.push(map_time_range(buf)?);
    }

    let mut informed_entities = Vec::new();
    for buf in repeated_bytes(&fields, fields::alert::INFORMED_ENTITY)? {
        informed_entities.push(map_entity_selector(buf)?);
    }

    let translated = |field: u32| -> Result<Option<TranslatedString>, ParseError> {
        match first_bytes(&fields, field)? {
            Some(buf) => Ok(Some(map_translated_string(buf)?)),
            None => Ok(None),
        }
    };

    Ok(Alert {
        active_periods,
        informed_entities,
        cause: first_varint(&fields, fields::alert::CAUSE)?,
        effect: first_varint(&fields, fields::alert::EFFECT)?,
        url: translated(fields::alert::URL)?,
        header_text: translated(fields::alert::HEADER_TEXT)?,
        description_text: translated(fields::alert::DESCRIPTION_TEXT)?,
    })
}

fn map_time_range(buf: &[u8]) -> Result<TimeRange, ParseError> {
    let fields = wire::parse_message(buf)?;
    Ok(TimeRange {
        start: first_varint(&fields, fields::time_range::START)?,
        end: first_varint(&fields, fields::time_range::END)?,
    })
}

fn map_entity_selector(buf: &[u8]) -> Result<EntitySelector, ParseError> {
    let fields = wire::parse_message(buf)?;

    let trip = match first_bytes(&fields, fields::entity_selector::TRIP)? {
        Some(buf) => Some(map_trip_descriptor(buf)?),
        None => None,
    };

    Ok(EntitySelector {
        agency_id: first_string(&fields, fields::entity_selector::AGENCY_ID)?,
        route_id: first_string(&fields, fields::entity_selector::ROUTE_ID)?,
        route_type: first_varint(&fields, fields::entity_selector::ROUTE_TYPE)?.map(|v| v as u32),
        trip,
        stop_id: first_string(&fields, fields::entity_selector::STOP_ID)?,
    })
}

fn map_translated_string(buf: &[u8]) -> Result<TranslatedString, ParseError> {
    let fields = wire::parse_message(buf)?;
    let mut translations = Vec::new();
    for buf in repeated_bytes(&fields, fields::translated_string::TRANSLATION)? {
        let fields = wire::parse_message(buf)?;
        translations.push(Translation {
            text: first_string(&fields, fields::translation::TEXT)?.unwrap_or_default(),
            language: first_string(&fields, fields::translation::LANGUAGE)?,
        });
    }
    Ok(TranslatedString { translations })
}

// Field-map accessors. Scalars take the first occurrence; repeated fields
// keep every occurrence in arrival order.

fn first_varint(fields: &FieldMap<'_>, field: u32) -> Result<Option<u64>, SchemaError> {
    match fields.first(field) {
        None => Ok(None),
        Some(WireValue::Varint(v)) => Ok(Some(*v)),
        Some(other) => Err(SchemaError {
            field,
            expected: "varint",
            found: other.kind(),
        }),
    }
}

fn first_bytes<'a>(fields: &FieldMap<'a>, field: u32) -> Result<Option<&'a [u8]>, SchemaError> {
    match fields.first(field) {
        None => Ok(None),
        Some(WireValue::Bytes(b)) => Ok(Some(*b)),
        Some(other) => Err(SchemaError {
            field,
            expected: "bytes",
            found: other.kind(),
        }),
    }
}

fn first_string(fields: &FieldMap<'_>, field: u32) -> Result<Option<String>, SchemaError> {
    Ok(first_bytes(fields, field)?.map(|b| String::from_utf8_lossy(b).into_owned()))
}

fn first_f32(fields: &FieldMap<'_>, field: u32) -> Result<Option<f32>, SchemaError> {
    match fields.first(field) {
        None => Ok(None),
        Some(WireValue::Fixed32(raw)) => Ok(Some(wire::fixed32_to_f32(*raw))),
        Some(other) => Err(SchemaError {
            field,
            expected: "fixed32",
            found: other.kind(),
        }),
    }
}

fn repeated_bytes<'a>(fields: &FieldMap<'a>, field: u32) -> Result<Vec<&'a [u8]>, SchemaError> {
    fields
        .get(field)
        .iter()
        .map(|value| match value {
            WireValue::Bytes(b) => Ok(*b),
            other => Err(SchemaError {
                field,
                expected: "bytes",
                found: other.kind(),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimal encode helpers for building synthetic wire buffers.

    fn put_varint(buf: &mut Vec<u8>, mut v: u64) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                buf.push(byte);
                return;
            }
            buf.push(byte | 0x80);
        }
    }

    fn put_varint_field(buf: &mut Vec<u8>, field: u32, v: u64) {
        put_varint(buf, u64::from(field) << 3);
        put_varint(buf, v);
    }

    fn put_bytes_field(buf: &mut Vec<u8>, field: u32, payload: &[u8]) {
        put_varint(buf, u64::from(field) << 3 | 2);
        put_varint(buf, payload.len() as u64);
        buf.extend_from_slice(payload);
    }

    fn put_f32_field(buf: &mut Vec<u8>, field: u32, v: f32) {
        put_varint(buf, u64::from(field) << 3 | 5);
        buf.extend_from_slice(&v.to_le_bytes());
    }

    #[test]
    fn test_empty_header_defaults() {
        let header = map_header(&[]).unwrap();
        assert_eq!(header.gtfs_realtime_version, "1.0");
        let now = Utc::now().timestamp();
        assert!((header.timestamp - now).abs() <= 1);
    }

    #[test]
    fn test_header_explicit_values() {
        let mut buf = Vec::new();
        put_bytes_field(&mut buf, 1, b"2.0");
        put_varint_field(&mut buf, 3, 1_700_000_000);

        let header = map_header(&buf).unwrap();
        assert_eq!(header.gtfs_realtime_version, "2.0");
        assert_eq!(header.timestamp, 1_700_000_000);
    }

    #[test]
    fn test_empty_feed_has_default_header() {
        let feed = parse_feed(&[]).unwrap();
        assert_eq!(feed.header.gtfs_realtime_version, "1.0");
        assert!(feed.entities.is_empty());
    }

    #[test]
    fn test_trip_descriptor_fields() {
        let mut buf = Vec::new();
        put_bytes_field(&mut buf, 1, b"trip-1");
        put_bytes_field(&mut buf, 2, b"20260806");
        put_bytes_field(&mut buf, 4, b"08:15:00");
        put_bytes_field(&mut buf, 5, b"L");
        put_varint_field(&mut buf, 6, 1);

        let trip = map_trip_descriptor(&buf).unwrap();
        assert_eq!(trip.trip_id, "trip-1");
        assert_eq!(trip.start_date, "20260806");
        assert_eq!(trip.start_time.as_deref(), Some("08:15:00"));
        assert_eq!(trip.route_id, "L");
        assert_eq!(trip.direction_id, Some(1));
    }

    #[test]
    fn test_stop_time_updates_keep_wire_order() {
        let mut tu = Vec::new();
        for stop in ["S1", "S2", "S3"] {
            let mut stu = Vec::new();
            put_bytes_field(&mut stu, 4, stop.as_bytes());
            put_bytes_field(&mut tu, 2, &stu);
        }

        let update = map_trip_update(&tu).unwrap();
        let stops: Vec<_> = update
            .stop_time_updates
            .iter()
            .map(|s| s.stop_id.as_str())
            .collect();
        assert_eq!(stops, ["S1", "S2", "S3"]);
    }

    #[test]
    fn test_stop_time_event_negative_delay() {
        // -30 as a two's-complement int32 varint (10 bytes on the wire).
        let mut buf = Vec::new();
        put_varint_field(&mut buf, 1, -30i64 as u64);
        put_varint_field(&mut buf, 2, 1_700_000_100);

        let event = map_stop_time_event(&buf).unwrap();
        assert_eq!(event.delay, Some(-30));
        assert_eq!(event.time, Some(1_700_000_100));
        assert_eq!(event.uncertainty, None);
    }

    #[test]
    fn test_vehicle_position_floats_bit_exact() {
        let mut pos = Vec::new();
        put_f32_field(&mut pos, 1, 40.7128);
        put_f32_field(&mut pos, 2, -74.0060);
        put_f32_field(&mut pos, 3, 187.5);

        let mut veh = Vec::new();
        put_bytes_field(&mut veh, 2, &pos);
        put_varint_field(&mut veh, 4, 1);

        let vehicle = map_vehicle(&veh).unwrap();
        let position = vehicle.position.unwrap();
        assert_eq!(position.latitude, 40.7128f32);
        assert_eq!(position.longitude, -74.0060f32);
        assert_eq!(position.bearing, Some(187.5));
        assert_eq!(position.speed, None);
        assert_eq!(vehicle.current_status, Some(VehicleStopStatus::StoppedAt));
    }

    #[test]
    fn test_unknown_enum_value_maps_to_unknown() {
        let mut veh = Vec::new();
        put_varint_field(&mut veh, 4, 17);

        let vehicle = map_vehicle(&veh).unwrap();
        assert_eq!(vehicle.current_status, Some(VehicleStopStatus::Unknown(17)));
    }

    #[test]
    fn test_missing_trip_defaults_to_empty_descriptor() {
        let vehicle = map_vehicle(&[]).unwrap();
        assert_eq!(vehicle.trip, TripDescriptor::default());
        assert_eq!(vehicle.trip.trip_id, "");
    }

    #[test]
    fn test_schema_mismatch_drops_entity_payload_only() {
        // Entity whose vehicle field is a varint instead of a sub-message.
        let mut entity = Vec::new();
        put_bytes_field(&mut entity, 1, b"e1");
        put_varint_field(&mut entity, 3, 99);

        let mut feed = Vec::new();
        put_bytes_field(&mut feed, 2, &entity);

        let parsed = parse_feed(&feed).unwrap();
        assert_eq!(parsed.entities.len(), 1);
        assert_eq!(parsed.entities[0].id, "e1");
        assert!(parsed.entities[0].vehicle.is_none());
    }

    #[test]
    fn test_wire_error_rejects_whole_feed() {
        // Entity field claims more payload bytes than the buffer holds.
        let feed = [2 << 3 | 2, 10, 0x01];
        assert!(matches!(
            parse_feed(&feed),
            Err(ParseError::Wire(WireError::Truncated { .. }))
        ));
    }

    #[test]
    fn test_alert_repeated_fields_in_order() {
        let mut alert = Vec::new();
        for (start, end) in [(100u64, 200u64), (300, 400)] {
            let mut period = Vec::new();
            put_varint_field(&mut period, 1, start);
            put_varint_field(&mut period, 2, end);
            put_bytes_field(&mut alert, 1, &period);
        }
        for route in ["A", "C"] {
            let mut selector = Vec::new();
            put_bytes_field(&mut selector, 2, route.as_bytes());
            put_bytes_field(&mut alert, 5, &selector);
        }
        let mut text = Vec::new();
        let mut translation = Vec::new();
        put_bytes_field(&mut translation, 1, b"Service change");
        put_bytes_field(&mut translation, 2, b"en");
        put_bytes_field(&mut text, 1, &translation);
        put_bytes_field(&mut alert, 10, &text);
        put_varint_field(&mut alert, 6, 3);
        put_varint_field(&mut alert, 7, 4);

        let alert = map_alert(&alert).unwrap();
        assert_eq!(
            alert.active_periods,
            vec![
                TimeRange {
                    start: Some(100),
                    end: Some(200)
                },
                TimeRange {
                    start: Some(300),
                    end: Some(400)
                },
            ]
        );
        let routes: Vec<_> = alert
            .informed_entities
            .iter()
            .map(|e| e.route_id.as_deref())
            .collect();
        assert_eq!(routes, [Some("A"), Some("C")]);
        assert_eq!(alert.cause, Some(3));
        assert_eq!(alert.effect, Some(4));
        let header = alert.header_text.unwrap();
        assert_eq!(header.first_text(), Some("Service change"));
        assert_eq!(header.translations[0].language.as_deref(), Some("en"));
    }

    #[test]
    fn test_parse_feed_idempotent() {
        let mut header = Vec::new();
        put_bytes_field(&mut header, 1, b"2.0");
        put_varint_field(&mut header, 3, 1000);

        let mut entity = Vec::new();
        put_bytes_field(&mut entity, 1, b"e1");

        let mut feed = Vec::new();
        put_bytes_field(&mut feed, 1, &header);
        put_bytes_field(&mut feed, 2, &entity);

        let first = parse_feed(&feed).unwrap();
        let second = parse_feed(&feed).unwrap();
        assert_eq!(first, second);
    }
}
