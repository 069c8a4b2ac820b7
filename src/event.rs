//! Vendor-shaped and canonical event records.

use crate::error::FrameError;
use serde::{Deserialize, Deserializer};
use std::fmt;

/// One `<EventNotificationAlert>` document as pushed by the camera.
///
/// Both transport decoders produce this type, so everything downstream is transport-agnostic.
/// Unknown child elements (region lists, target rectangles, ...) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawEvent {
    pub ip_address: String,
    pub ipv6_address: String,
    #[serde(deserialize_with = "lenient_u32")]
    pub port_no: u32,
    pub protocol: String,
    pub mac_address: String,
    #[serde(rename = "channelID")]
    #[serde(deserialize_with = "lenient_u32")]
    pub channel_id: u32,
    pub date_time: String,
    #[serde(deserialize_with = "lenient_u32")]
    pub active_post_count: u32,
    pub event_type: String,
    pub event_state: String,
    pub event_description: String,
    pub channel_name: String,
}

impl RawEvent {
    /// Decode one XML document. Anything that is not a complete, well-formed alert with an
    /// `eventType` is a frame error.
    pub fn from_xml(bytes: &[u8]) -> Result<Self, FrameError> {
        let text = std::str::from_utf8(bytes).map_err(|_| FrameError::InvalidUtf8)?;
        let event: RawEvent =
            quick_xml::de::from_str(text).map_err(|e| FrameError::Xml(e.to_string()))?;
        if event.event_type.trim().is_empty() {
            return Err(FrameError::MissingEventType);
        }
        Ok(event)
    }
}

/// Numeric element that firmware sometimes sends empty (`<portNo></portNo>`); empty reads as 0.
fn lenient_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(0);
    }
    text.parse().map_err(serde::de::Error::custom)
}

/// Canonical alarm taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Motion,
    VideoLoss,
    RegionEntrance,
    LineDetection,
    Unknown,
}

impl EventKind {
    /// Name handed to sinks.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Motion => "motion",
            EventKind::VideoLoss => "videoloss",
            EventKind::RegionEntrance => "regionEntrance",
            EventKind::LineDetection => "linedetection",
            EventKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventState {
    Active,
    Inactive,
}

impl EventState {
    /// Parse the vendor `eventState` text (case-insensitive, trimmed).
    pub fn from_vendor(state: &str) -> Option<Self> {
        let state = state.trim();
        if state.eq_ignore_ascii_case("active") {
            Some(EventState::Active)
        } else if state.eq_ignore_ascii_case("inactive") {
            Some(EventState::Inactive)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventState::Active => "active",
            EventState::Inactive => "inactive",
        }
    }
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized state transition, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalEvent {
    pub camera_name: String,
    pub kind: EventKind,
    pub state: EventState,
    /// `dateTime` as reported by the device.
    pub timestamp: String,
    pub description: String,
    pub channel_id: u32,
    /// The vendor `eventType` tag this event was mapped from.
    pub vendor_type: String,
    /// Whether this `(type, state)` pair is the one the vendor integration historically treated
    /// as the alarm trigger. See the mapping table in [`crate::normalizer`].
    pub vendor_trigger: bool,
}
