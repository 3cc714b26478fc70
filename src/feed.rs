//! Typed GTFS-Realtime domain model.
//!
//! Every parse produces these fresh; a feed snapshot is immutable once
//! built and carries no identity across polls. Optional sub-messages stay
//! `None` when absent from the wire — absence is a documented default,
//! never an error.

use serde::Serialize;
use std::fmt;

/// A fully decoded GTFS-Realtime feed: header plus entities in wire order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedFeed {
    pub header: FeedHeader,
    pub entities: Vec<FeedEntity>,
}

/// Feed-level metadata.
///
/// `gtfs_realtime_version` defaults to `"1.0"` and `timestamp` to the
/// wall clock at parse time when the producer omits them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedHeader {
    pub gtfs_realtime_version: String,
    pub timestamp: i64,
}

/// One feed entity. Each of the three payload kinds is independently
/// optional; producers populate whichever apply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedEntity {
    pub id: String,
    pub trip_update: Option<TripUpdate>,
    pub vehicle: Option<VehiclePosition>,
    pub alert: Option<Alert>,
}

/// Identifies a scheduled service instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TripDescriptor {
    pub trip_id: String,
    pub route_id: String,
    pub start_date: String,
    pub start_time: Option<String>,
    pub direction_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripUpdate {
    pub trip: TripDescriptor,
    /// Stop-time updates in wire order, which is the chronological stop
    /// sequence of the trip.
    pub stop_time_updates: Vec<StopTimeUpdate>,
    pub timestamp: Option<u64>,
}

/// Predicted arrival or departure timing at one stop.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StopTimeEvent {
    pub time: Option<i64>,
    pub delay: Option<i32>,
    pub uncertainty: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopTimeUpdate {
    pub stop_id: String,
    pub arrival: Option<StopTimeEvent>,
    pub departure: Option<StopTimeEvent>,
    pub schedule_relationship: Option<ScheduleRelationship>,
}

/// Relationship of a stop-time update to the static schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScheduleRelationship {
    Scheduled,
    Skipped,
    NoData,
    /// Raw value outside the known table; preserved for diagnostics.
    Unknown(u64),
}

impl ScheduleRelationship {
    pub fn from_raw(raw: u64) -> Self {
        match raw {
            0 => Self::Scheduled,
            1 => Self::Skipped,
            2 => Self::NoData,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for ScheduleRelationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => write!(f, "SCHEDULED"),
            Self::Skipped => write!(f, "SKIPPED"),
            Self::NoData => write!(f, "NO_DATA"),
            Self::Unknown(raw) => write!(f, "UNKNOWN({raw})"),
        }
    }
}

/// Vehicle progress relative to its current stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VehicleStopStatus {
    IncomingAt,
    StoppedAt,
    InTransitTo,
    /// Raw value outside the known table; preserved for diagnostics.
    Unknown(u64),
}

impl VehicleStopStatus {
    pub fn from_raw(raw: u64) -> Self {
        match raw {
            0 => Self::IncomingAt,
            1 => Self::StoppedAt,
            2 => Self::InTransitTo,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for VehicleStopStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncomingAt => write!(f, "INCOMING_AT"),
            Self::StoppedAt => write!(f, "STOPPED_AT"),
            Self::InTransitTo => write!(f, "IN_TRANSIT_TO"),
            Self::Unknown(raw) => write!(f, "UNKNOWN({raw})"),
        }
    }
}

/// Geographic position, single precision as transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub latitude: f32,
    pub longitude: f32,
    pub bearing: Option<f32>,
    pub speed: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehiclePosition {
    pub trip: TripDescriptor,
    pub position: Option<Position>,
    pub current_stop_sequence: Option<u32>,
    pub stop_id: Option<String>,
    pub current_status: Option<VehicleStopStatus>,
    pub timestamp: Option<u64>,
}

/// A period during which an alert is active, epoch seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

/// The agency/route/trip/stop scope an alert applies to.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntitySelector {
    pub agency_id: Option<String>,
    pub route_id: Option<String>,
    pub route_type: Option<u32>,
    pub trip: Option<TripDescriptor>,
    pub stop_id: Option<String>,
}

/// A service alert. `cause` and `effect` carry the raw wire codes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Alert {
    pub active_periods: Vec<TimeRange>,
    pub informed_entities: Vec<EntitySelector>,
    pub cause: Option<u64>,
    pub effect: Option<u64>,
    pub url: Option<TranslatedString>,
    pub header_text: Option<TranslatedString>,
    pub description_text: Option<TranslatedString>,
}

/// Localized text: one translation per language, wire order preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TranslatedString {
    pub translations: Vec<Translation>,
}

impl TranslatedString {
    /// The first translation's text, the conventional display choice when
    /// no language negotiation happens.
    pub fn first_text(&self) -> Option<&str> {
        self.translations.first().map(|t| t.text.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Translation {
    pub text: String,
    pub language: Option<String>,
}
