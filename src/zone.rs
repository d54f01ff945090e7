//! Zone model: named polygons with membership semantics and class filters.
//!
//! Zones are authored as [`ZoneSpec`] values (the serializable, drawn form)
//! and validated once when saved, producing a [`ZoneCheck`]. Only a
//! `ZoneCheck::Valid` zone ever reaches evaluation.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::detect::{classes, DetectedObject};
use crate::geometry::{self, Point, Polygon, PolygonError, Tolerance};

/// How a detected object's box is tested against a zone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MembershipMode {
    /// The box overlaps the zone anywhere.
    #[default]
    Intersect,
    /// The box centroid lies inside the zone.
    Contain,
}

impl FromStr for MembershipMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "intersect" | "intersects" => Ok(Self::Intersect),
            "contain" | "contains" => Ok(Self::Contain),
            other => Err(anyhow!(
                "unknown zone type '{}': expected 'Intersect' or 'Contain'",
                other
            )),
        }
    }
}

impl fmt::Display for MembershipMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Intersect => write!(f, "Intersect"),
            Self::Contain => write!(f, "Contain"),
        }
    }
}

/// Which detector labels a zone reacts to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassFilter {
    #[default]
    Any,
    /// Exact, case-sensitive label allowlist.
    Only(BTreeSet<String>),
}

impl ClassFilter {
    pub fn only<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(labels.into_iter().map(Into::into).collect())
    }

    /// Expands detector categories (`person`, `vehicle`, `animal`, ...) into
    /// the labels they cover. Unknown categories are kept verbatim so custom
    /// detector labels still work.
    pub fn from_categories<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut labels = BTreeSet::new();
        for category in categories {
            let category = category.as_ref();
            let known = classes::labels_in_category(category);
            if known.is_empty() {
                labels.insert(category.to_string());
            } else {
                labels.extend(known.into_iter().map(str::to_string));
            }
        }
        Self::Only(labels)
    }

    pub fn admits(&self, label: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Only(labels) => labels.contains(label),
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// A zone as drawn by the operator, before validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoneSpec {
    pub name: String,
    /// Outline as `[x, y]` pairs in normalized frame coordinates.
    pub points: Vec<[f64; 2]>,
    #[serde(default)]
    pub mode: MembershipMode,
    #[serde(default)]
    pub classes: ClassFilter,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ZoneSpec {
    pub fn new(name: impl Into<String>, points: Vec<[f64; 2]>) -> Self {
        Self {
            name: name.into(),
            points,
            mode: MembershipMode::default(),
            classes: ClassFilter::default(),
            enabled: true,
        }
    }

    pub fn with_mode(mut self, mode: MembershipMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_classes(mut self, classes: ClassFilter) -> Self {
        self.classes = classes;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A validated zone, ready for evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct Zone {
    name: String,
    polygon: Polygon,
    mode: MembershipMode,
    classes: ClassFilter,
    enabled: bool,
}

impl Zone {
    pub fn from_spec(spec: &ZoneSpec) -> Result<Self, PolygonError> {
        let polygon = Polygon::new(spec.points.iter().copied().map(Point::from).collect())?;
        Ok(Self {
            name: spec.name.clone(),
            polygon,
            mode: spec.mode,
            classes: spec.classes.clone(),
            enabled: spec.enabled,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn polygon(&self) -> &Polygon {
        &self.polygon
    }

    pub fn mode(&self) -> MembershipMode {
        self.mode
    }

    pub fn classes(&self) -> &ClassFilter {
        &self.classes
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn to_spec(&self) -> ZoneSpec {
        ZoneSpec {
            name: self.name.clone(),
            points: self.polygon.vertices().iter().map(|p| [p.x, p.y]).collect(),
            mode: self.mode,
            classes: self.classes.clone(),
            enabled: self.enabled,
        }
    }

    /// Does this zone claim the object?
    ///
    /// Disabled zones and filtered-out labels short-circuit before any
    /// geometry is evaluated.
    pub fn matches(&self, object: &DetectedObject, tolerance: Tolerance) -> bool {
        if !self.enabled {
            return false;
        }
        if !self.classes.admits(&object.class_label) {
            return false;
        }
        match self.mode {
            MembershipMode::Contain => geometry::contains(
                &self.polygon,
                geometry::centroid(&object.bounding_box),
                tolerance,
            ),
            MembershipMode::Intersect => {
                geometry::intersects(&self.polygon, &object.bounding_box, tolerance)
            }
        }
    }
}

/// Save-time validation result for a drawn zone.
///
/// Invalid zones are retained so the drawing is not lost, but the resolver
/// skips them.
#[derive(Clone, Debug, PartialEq)]
pub enum ZoneCheck {
    Valid(Zone),
    Invalid { spec: ZoneSpec, reason: PolygonError },
}

impl ZoneCheck {
    pub fn check(spec: ZoneSpec) -> Self {
        match Zone::from_spec(&spec) {
            Ok(zone) => Self::Valid(zone),
            Err(reason) => Self::Invalid { spec, reason },
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Valid(zone) => zone.name(),
            Self::Invalid { spec, .. } => &spec.name,
        }
    }

    pub fn spec(&self) -> ZoneSpec {
        match self {
            Self::Valid(zone) => zone.to_spec(),
            Self::Invalid { spec, .. } => spec.clone(),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

/// Zone names: 1..64 of `[A-Za-z0-9 _.-]`.
pub fn validate_zone_name(name: &str) -> Result<()> {
    static ZONE_NAME_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = ZONE_NAME_RE.get_or_init(|| {
        regex::Regex::new(r"^[A-Za-z0-9 _.-]{1,64}$").expect("zone name pattern compiles")
    });

    if !re.is_match(name) || name.trim().is_empty() {
        return Err(anyhow!(
            "zone name '{}' must match ^[A-Za-z0-9 _.-]{{1,64}}$",
            name
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;

    fn left_half(mode: MembershipMode) -> Zone {
        let spec = ZoneSpec::new(
            "left",
            vec![[0.0, 0.0], [0.5, 0.0], [0.5, 1.0], [0.0, 1.0]],
        )
        .with_mode(mode);
        Zone::from_spec(&spec).expect("valid zone")
    }

    #[test]
    fn class_filter_is_exact_and_case_sensitive() {
        let filter = ClassFilter::only(["person"]);
        assert!(filter.admits("person"));
        assert!(!filter.admits("Person"));
        assert!(!filter.admits("vehicle"));
        assert!(ClassFilter::Any.admits("anything"));
    }

    #[test]
    fn person_zone_never_matches_vehicle() {
        let spec = ZoneSpec::new("porch", vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]])
            .with_classes(ClassFilter::only(["person"]));
        let zone = Zone::from_spec(&spec).expect("valid zone");
        let car = DetectedObject::new("vehicle", Rect::new(0.4, 0.4, 0.2, 0.2));
        let person = DetectedObject::new("person", Rect::new(0.4, 0.4, 0.2, 0.2));
        assert!(!zone.matches(&car, Tolerance::EXACT));
        assert!(zone.matches(&person, Tolerance::EXACT));
    }

    #[test]
    fn contain_uses_centroid_while_intersect_uses_overlap() {
        // Straddles the x=0.5 edge with its centroid at x=0.55.
        let straddling = DetectedObject::new("person", Rect::new(0.4, 0.4, 0.3, 0.2));
        assert!(!left_half(MembershipMode::Contain).matches(&straddling, Tolerance::EXACT));
        assert!(left_half(MembershipMode::Intersect).matches(&straddling, Tolerance::EXACT));

        let centered = DetectedObject::new("person", Rect::new(0.3, 0.4, 0.3, 0.2));
        assert!(left_half(MembershipMode::Contain).matches(&centered, Tolerance::EXACT));
    }

    #[test]
    fn disabled_zone_never_matches() {
        let spec = ZoneSpec::new("off", vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]).disabled();
        let zone = Zone::from_spec(&spec).expect("valid zone");
        let obj = DetectedObject::new("person", Rect::new(0.6, 0.1, 0.1, 0.1));
        assert!(!zone.matches(&obj, Tolerance::EXACT));
    }

    #[test]
    fn categories_expand_to_labels() {
        let filter = ClassFilter::from_categories(["vehicle", "drone"]);
        assert!(filter.admits("car"));
        assert!(filter.admits("truck"));
        assert!(filter.admits("drone"));
        assert!(!filter.admits("person"));
    }

    #[test]
    fn membership_mode_parses_ui_values() {
        assert_eq!(
            "Intersect".parse::<MembershipMode>().unwrap(),
            MembershipMode::Intersect
        );
        assert_eq!(
            "contain".parse::<MembershipMode>().unwrap(),
            MembershipMode::Contain
        );
        assert!("overlap".parse::<MembershipMode>().is_err());
        assert_eq!(MembershipMode::Contain.to_string(), "Contain");
    }

    #[test]
    fn invalid_spec_is_kept_with_reason() {
        let spec = ZoneSpec::new("scribble", vec![[0.1, 0.1], [0.2, 0.2]]);
        let check = ZoneCheck::check(spec.clone());
        assert!(!check.is_valid());
        assert_eq!(check.name(), "scribble");
        assert_eq!(check.spec(), spec);
        match check {
            ZoneCheck::Invalid { reason, .. } => {
                assert_eq!(reason, PolygonError::TooFewVertices { found: 2 })
            }
            ZoneCheck::Valid(_) => panic!("expected invalid zone"),
        }
    }

    #[test]
    fn spec_serializes_with_defaults() {
        let spec: ZoneSpec =
            serde_json::from_str(r#"{"name": "drive", "points": [[0,0],[1,0],[1,1]]}"#)
                .expect("parse zone");
        assert_eq!(spec.mode, MembershipMode::Intersect);
        assert_eq!(spec.classes, ClassFilter::Any);
        assert!(spec.enabled);

        let spec: ZoneSpec = serde_json::from_str(
            r#"{"name": "walk", "points": [[0,0],[1,0],[1,1]], "mode": "Contain",
                "classes": {"only": ["person"]}, "enabled": false}"#,
        )
        .expect("parse zone");
        assert_eq!(spec.mode, MembershipMode::Contain);
        assert_eq!(spec.classes, ClassFilter::only(["person"]));
        assert!(!spec.enabled);
    }

    #[test]
    fn zone_names_are_validated() {
        assert!(validate_zone_name("Front Porch").is_ok());
        assert!(validate_zone_name("drive_way-2").is_ok());
        assert!(validate_zone_name("").is_err());
        assert!(validate_zone_name("   ").is_err());
        assert!(validate_zone_name("cam:zone").is_err());
        assert!(validate_zone_name(&"z".repeat(65)).is_err());
    }
}
