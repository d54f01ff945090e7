//! Zone evaluation engine.
//!
//! [`evaluate`] is a pure function from a detection event and a resolved zone
//! list to an allow/suppress [`Decision`]. [`ZoneFilter`] wraps
//! resolve-then-evaluate for hosts that hold a [`ZoneSource`].

use serde::Serialize;
use std::fmt;

use crate::detect::{DetectedObject, DetectionEvent};
use crate::geometry::Tolerance;
use crate::resolve::{resolve, ResolvedZones, ZoneSource};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DecisionReason {
    NoZonesConfigured,
    MatchedZone,
    NoMatch,
    FilterDisabled,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoZonesConfigured => write!(f, "no zones configured"),
            Self::MatchedZone => write!(f, "matched zone"),
            Self::NoMatch => write!(f, "no object inside any zone"),
            Self::FilterDisabled => write!(f, "filter disabled"),
        }
    }
}

/// First zone (in authored order) that claimed the first matching object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ZoneMatch {
    pub zone: String,
    /// Index into the event's object list.
    pub object_index: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Decision {
    pub allow: bool,
    pub matched_objects: Vec<DetectedObject>,
    pub reason: DecisionReason,
    pub first_match: Option<ZoneMatch>,
}

impl Decision {
    fn pass_through(event: &DetectionEvent) -> Self {
        Self {
            allow: true,
            matched_objects: event.objects.clone(),
            reason: DecisionReason::FilterDisabled,
            first_match: None,
        }
    }
}

/// Evaluates events with a fixed tolerance.
#[derive(Clone, Copy, Debug, Default)]
pub struct Evaluator {
    tolerance: Tolerance,
}

impl Evaluator {
    pub fn new(tolerance: Tolerance) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> Tolerance {
        self.tolerance
    }

    pub fn evaluate(&self, event: &DetectionEvent, zones: &ResolvedZones) -> Decision {
        let zones = match zones {
            ResolvedZones::NoFilter(_) => return Decision::pass_through(event),
            ResolvedZones::Zones(zones) => zones,
        };

        if zones.is_empty() {
            return Decision {
                allow: false,
                matched_objects: Vec::new(),
                reason: DecisionReason::NoZonesConfigured,
                first_match: None,
            };
        }

        let mut matched_objects = Vec::new();
        let mut first_match = None;
        for (object_index, object) in event.objects.iter().enumerate() {
            let Some(zone) = zones.iter().find(|z| z.matches(object, self.tolerance)) else {
                continue;
            };
            if first_match.is_none() {
                first_match = Some(ZoneMatch {
                    zone: zone.name().to_string(),
                    object_index,
                });
            }
            matched_objects.push(object.clone());
        }

        let allow = !matched_objects.is_empty();
        Decision {
            allow,
            matched_objects,
            reason: if allow {
                DecisionReason::MatchedZone
            } else {
                DecisionReason::NoMatch
            },
            first_match,
        }
    }
}

/// Evaluates with exact geometry.
pub fn evaluate(event: &DetectionEvent, zones: &ResolvedZones) -> Decision {
    Evaluator::default().evaluate(event, zones)
}

/// Resolve-then-evaluate against a zone configuration source.
pub struct ZoneFilter<S: ZoneSource> {
    source: S,
    evaluator: Evaluator,
}

impl<S: ZoneSource> ZoneFilter<S> {
    pub fn new(source: S, tolerance: Tolerance) -> Self {
        Self {
            source,
            evaluator: Evaluator::new(tolerance),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn filter(&self, notifier_id: &str, event: &DetectionEvent) -> Decision {
        let zones = resolve(&self.source, notifier_id, &event.camera_id);
        if let ResolvedZones::NoFilter(bypass) = &zones {
            log::info!(
                "notifier {} camera {}: forwarding unfiltered ({})",
                notifier_id,
                event.camera_id,
                bypass
            );
        }

        let decision = self.evaluator.evaluate(event, &zones);
        match (&decision.reason, &decision.first_match) {
            (DecisionReason::MatchedZone, Some(m)) => log::info!(
                "notifier {} camera {}: forwarding, {} object(s) matched, first '{}' in zone '{}'",
                notifier_id,
                event.camera_id,
                decision.matched_objects.len(),
                event.objects[m.object_index].class_label,
                m.zone
            ),
            (DecisionReason::FilterDisabled, _) => {}
            (reason, _) => log::info!(
                "notifier {} camera {}: suppressing notification ({}), {} object(s) checked",
                notifier_id,
                event.camera_id,
                reason,
                event.objects.len()
            ),
        }
        decision
    }
}
