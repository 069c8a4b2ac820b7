//! Vendor → canonical mapping and edge-triggering.
//!
//! Mapping is table-driven: [`EVENT_TABLE`] lists every modeled `(eventType, eventState)` pair.
//! Adding a vendor event type means adding rows, not branches.
//!
//! Edge-triggering: cameras re-announce unchanged states (the video-loss heartbeat arrives every
//! few seconds). An event is forwarded only when its state differs from the last state seen for
//! the same kind on the same camera.

use crate::error::FrameError;
use crate::event::{CanonicalEvent, EventKind, EventState, RawEvent};
use std::collections::HashMap;
use tracing::trace;

/// One row of the mapping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMapping {
    pub vendor_type: &'static str,
    pub vendor_state: &'static str,
    pub kind: EventKind,
    pub state: EventState,
    /// The pair the legacy integration fired alarms on. Motion triggers on `active`, while
    /// video-loss, region-entrance and line-detection were observed gated on `inactive`. The
    /// polarity is unconfirmed against vendor documentation, so it is recorded here for review
    /// instead of being folded into `state`.
    pub vendor_trigger: bool,
}

const fn row(
    vendor_type: &'static str,
    vendor_state: &'static str,
    kind: EventKind,
    state: EventState,
    vendor_trigger: bool,
) -> EventMapping {
    EventMapping { vendor_type, vendor_state, kind, state, vendor_trigger }
}

pub const EVENT_TABLE: &[EventMapping] = &[
    row("VMD", "active", EventKind::Motion, EventState::Active, true),
    row("VMD", "inactive", EventKind::Motion, EventState::Inactive, false),
    row("videoloss", "active", EventKind::VideoLoss, EventState::Active, false),
    row("videoloss", "inactive", EventKind::VideoLoss, EventState::Inactive, true),
    row("regionEntrance", "active", EventKind::RegionEntrance, EventState::Active, false),
    row("regionEntrance", "inactive", EventKind::RegionEntrance, EventState::Inactive, true),
    row("linedetection", "active", EventKind::LineDetection, EventState::Active, false),
    row("linedetection", "inactive", EventKind::LineDetection, EventState::Inactive, true),
];

/// Look up a vendor pair in [`EVENT_TABLE`] (ASCII case-insensitive, trimmed).
pub fn lookup(event_type: &str, event_state: &str) -> Option<&'static EventMapping> {
    let (event_type, event_state) = (event_type.trim(), event_state.trim());
    EVENT_TABLE.iter().find(|m| {
        m.vendor_type.eq_ignore_ascii_case(event_type)
            && m.vendor_state.eq_ignore_ascii_case(event_state)
    })
}

/// Identity of an edge-triggered stream within one camera. Unmodeled tags are kept apart so one
/// unknown event type never suppresses another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum EdgeKey {
    Known(EventKind),
    Unknown(String),
}

/// Per-camera normalizer. Owns the camera's edge state; never shared across cameras.
#[derive(Debug)]
pub struct EventNormalizer {
    camera: String,
    edges: HashMap<EdgeKey, EventState>,
}

impl EventNormalizer {
    pub fn new(camera: impl Into<String>) -> Self {
        Self { camera: camera.into(), edges: HashMap::new() }
    }

    pub fn camera(&self) -> &str {
        &self.camera
    }

    /// Map a raw event and apply edge-triggering.
    ///
    /// Returns `Ok(None)` for a repeated, unchanged state and `Err` when the vendor state is
    /// neither `active` nor `inactive`.
    pub fn normalize(&mut self, raw: &RawEvent) -> Result<Option<CanonicalEvent>, FrameError> {
        let (kind, state, vendor_trigger, key) =
            match lookup(&raw.event_type, &raw.event_state) {
                Some(m) => (m.kind, m.state, m.vendor_trigger, EdgeKey::Known(m.kind)),
                None => {
                    let state = EventState::from_vendor(&raw.event_state)
                        .ok_or_else(|| FrameError::UnknownState(raw.event_state.clone()))?;
                    let tag = raw.event_type.trim().to_ascii_lowercase();
                    (EventKind::Unknown, state, false, EdgeKey::Unknown(tag))
                }
            };

        if self.edges.get(&key) == Some(&state) {
            trace!(
                target: "alarmstream::normalizer",
                camera = %self.camera,
                kind = %kind,
                state = %state,
                "duplicate state suppressed"
            );
            return Ok(None);
        }
        self.edges.insert(key, state);

        Ok(Some(CanonicalEvent {
            camera_name: self.camera.clone(),
            kind,
            state,
            timestamp: raw.date_time.clone(),
            description: raw.event_description.clone(),
            channel_id: raw.channel_id,
            vendor_type: raw.event_type.trim().to_string(),
            vendor_trigger,
        }))
    }

    /// Last accepted state for a modeled kind.
    pub fn last_state(&self, kind: EventKind) -> Option<EventState> {
        self.edges.get(&EdgeKey::Known(kind)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(event_type: &str, state: &str) -> RawEvent {
        RawEvent {
            event_type: event_type.into(),
            event_state: state.into(),
            event_description: format!("{event_type} alarm"),
            date_time: "2024-05-01T10:15:30+02:00".into(),
            channel_id: 1,
            ..RawEvent::default()
        }
    }

    #[test]
    fn table_covers_both_states_of_every_modeled_kind() {
        for kind in [
            EventKind::Motion,
            EventKind::VideoLoss,
            EventKind::RegionEntrance,
            EventKind::LineDetection,
        ] {
            for state in [EventState::Active, EventState::Inactive] {
                let rows = EVENT_TABLE.iter().filter(|m| m.kind == kind && m.state == state);
                assert_eq!(rows.count(), 1, "{kind} {state}");
            }
        }
    }

    #[test]
    fn trigger_column_preserves_observed_gating() {
        let triggers: Vec<_> = EVENT_TABLE
            .iter()
            .filter(|m| m.vendor_trigger)
            .map(|m| (m.vendor_type, m.vendor_state))
            .collect();
        assert_eq!(
            triggers,
            vec![
                ("VMD", "active"),
                ("videoloss", "inactive"),
                ("regionEntrance", "inactive"),
                ("linedetection", "inactive"),
            ]
        );
    }

    #[test]
    fn lookup_ignores_case_and_padding() {
        let m = lookup(" vmd ", "ACTIVE").unwrap();
        assert_eq!((m.kind, m.state), (EventKind::Motion, EventState::Active));
        assert!(lookup("tamperdetection", "active").is_none());
    }

    #[test]
    fn repeated_pushes_fire_once_per_transition() {
        let mut n = EventNormalizer::new("porch");
        let pushes = ["active", "active", "active", "inactive"];
        let emitted: Vec<_> = pushes
            .iter()
            .filter_map(|s| n.normalize(&raw("VMD", s)).unwrap())
            .map(|e| e.state)
            .collect();
        assert_eq!(emitted, vec![EventState::Active, EventState::Inactive]);
        assert_eq!(n.last_state(EventKind::Motion), Some(EventState::Inactive));
    }

    #[test]
    fn kinds_are_edge_triggered_independently() {
        let mut n = EventNormalizer::new("porch");
        assert!(n.normalize(&raw("VMD", "active")).unwrap().is_some());
        assert!(n.normalize(&raw("videoloss", "inactive")).unwrap().is_some());
        assert!(n.normalize(&raw("videoloss", "inactive")).unwrap().is_none());
        assert!(n.normalize(&raw("VMD", "active")).unwrap().is_none());
    }

    #[test]
    fn unknown_types_are_forwarded_and_keyed_by_tag() {
        let mut n = EventNormalizer::new("porch");
        let first = n.normalize(&raw("tamperdetection", "active")).unwrap().unwrap();
        assert_eq!(first.kind, EventKind::Unknown);
        assert_eq!(first.vendor_type, "tamperdetection");
        assert!(!first.vendor_trigger);
        assert!(n.normalize(&raw("shelteralarm", "active")).unwrap().is_some());
        assert!(n.normalize(&raw("tamperdetection", "active")).unwrap().is_none());
    }

    #[test]
    fn unknown_state_is_a_frame_error() {
        let mut n = EventNormalizer::new("porch");
        assert_eq!(
            n.normalize(&raw("VMD", "blinking")),
            Err(FrameError::UnknownState("blinking".into()))
        );
        assert_eq!(n.last_state(EventKind::Motion), None);
    }

    #[test]
    fn canonical_event_carries_raw_details() {
        let mut n = EventNormalizer::new("porch");
        let event = n.normalize(&raw("regionEntrance", "inactive")).unwrap().unwrap();
        assert_eq!(event.camera_name, "porch");
        assert_eq!(event.kind, EventKind::RegionEntrance);
        assert_eq!(event.state, EventState::Inactive);
        assert_eq!(event.timestamp, "2024-05-01T10:15:30+02:00");
        assert_eq!(event.description, "regionEntrance alarm");
        assert!(event.vendor_trigger);
    }
}
