//! Zone set resolution: which zones govern a notifier for one camera.
//!
//! A notifier either uses its own custom zones or a shared preset, never
//! both. Resolution fails open: whenever configuration is missing or
//! unreadable the result is [`ResolvedZones::NoFilter`], which lets every
//! notification through, rather than an empty zone list, which blocks them
//! all.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::zone::{Zone, ZoneCheck, ZoneSpec};

/// Per-camera zone lists from one provenance (a preset or a notifier).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ZoneSet {
    cameras: BTreeMap<String, Vec<ZoneCheck>>,
}

impl ZoneSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zones recorded for a camera, in authored order. `None` when the camera
    /// has never had a zone.
    pub fn zones(&self, camera_id: &str) -> Option<&[ZoneCheck]> {
        self.cameras.get(camera_id).map(Vec::as_slice)
    }

    pub fn cameras(&self) -> impl Iterator<Item = &str> {
        self.cameras.keys().map(String::as_str)
    }

    /// Inserts or replaces (by name, keeping its position) a zone.
    pub fn upsert(&mut self, camera_id: &str, spec: ZoneSpec) -> &ZoneCheck {
        let zones = self.cameras.entry(camera_id.to_string()).or_default();
        let check = ZoneCheck::check(spec);
        let index = match zones.iter().position(|z| z.name() == check.name()) {
            Some(index) => {
                zones[index] = check;
                index
            }
            None => {
                zones.push(check);
                zones.len() - 1
            }
        };
        &zones[index]
    }

    /// Removes a zone by name. The camera entry disappears with its last zone.
    pub fn remove(&mut self, camera_id: &str, zone_name: &str) -> bool {
        let Some(zones) = self.cameras.get_mut(camera_id) else {
            return false;
        };
        let before = zones.len();
        zones.retain(|z| z.name() != zone_name);
        let removed = zones.len() != before;
        if zones.is_empty() {
            self.cameras.remove(camera_id);
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }
}

/// Per-notifier filter settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifierSettings {
    /// Master switch. When off, every notification passes.
    #[serde(default = "default_true")]
    pub filtering_enabled: bool,
    /// Use this notifier's own zones instead of a preset.
    #[serde(default)]
    pub use_custom: bool,
    /// Preset id used when `use_custom` is off.
    #[serde(default)]
    pub selected_preset: Option<String>,
    /// Log (and, with the overlay feature, render) the matching zone/object.
    #[serde(default)]
    pub debug_zones: bool,
}

fn default_true() -> bool {
    true
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            filtering_enabled: true,
            use_custom: false,
            selected_preset: None,
            debug_zones: false,
        }
    }
}

/// Who owns a zone set.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ZoneOwner {
    Preset(String),
    Notifier(String),
}

impl ZoneOwner {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Preset(_) => "preset",
            Self::Notifier(_) => "notifier",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Preset(id) | Self::Notifier(id) => id,
        }
    }
}

impl fmt::Display for ZoneOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

impl FromStr for ZoneOwner {
    type Err = anyhow::Error;

    /// Parses `preset:<id>` or `notifier:<id>`.
    fn from_str(s: &str) -> Result<Self> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| anyhow!("zone owner '{}' must be preset:<id> or notifier:<id>", s))?;
        let id = id.trim();
        if id.is_empty() {
            return Err(anyhow!("zone owner '{}' has an empty id", s));
        }
        match kind.trim().to_ascii_lowercase().as_str() {
            "preset" => Ok(Self::Preset(id.to_string())),
            "notifier" => Ok(Self::Notifier(id.to_string())),
            other => Err(anyhow!("unknown zone owner kind '{}'", other)),
        }
    }
}

/// Read side of the zone configuration store.
pub trait ZoneSource {
    fn notifier_settings(&self, notifier_id: &str) -> Result<Option<NotifierSettings>>;

    fn has_preset(&self, preset_id: &str) -> Result<bool>;

    /// Zones for one camera of one owner; `None` when the camera has no entry.
    fn zones(&self, owner: &ZoneOwner, camera_id: &str) -> Result<Option<Vec<ZoneCheck>>>;
}

impl<T: ZoneSource + ?Sized> ZoneSource for Box<T> {
    fn notifier_settings(&self, notifier_id: &str) -> Result<Option<NotifierSettings>> {
        (**self).notifier_settings(notifier_id)
    }

    fn has_preset(&self, preset_id: &str) -> Result<bool> {
        (**self).has_preset(preset_id)
    }

    fn zones(&self, owner: &ZoneOwner, camera_id: &str) -> Result<Option<Vec<ZoneCheck>>> {
        (**self).zones(owner, camera_id)
    }
}

/// Why filtering was bypassed for an evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BypassReason {
    FilteringDisabled,
    NotifierUnknown,
    NoPresetSelected,
    PresetNotFound,
    CameraNotConfigured,
    NoUsableZones,
    ConfigurationUnavailable,
}

impl fmt::Display for BypassReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::FilteringDisabled => "zone filtering disabled",
            Self::NotifierUnknown => "notifier has no zone filter settings",
            Self::NoPresetSelected => "no preset selected",
            Self::PresetNotFound => "preset not found",
            Self::CameraNotConfigured => "no zones configured for camera",
            Self::NoUsableZones => "every zone for camera is malformed",
            Self::ConfigurationUnavailable => "zone configuration unavailable",
        };
        f.write_str(text)
    }
}

/// Outcome of zone set resolution.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedZones {
    /// Allow everything unconditionally.
    NoFilter(BypassReason),
    /// Enabled, valid zones in authored order. Empty means suppress everything.
    Zones(Vec<Zone>),
}

impl ResolvedZones {
    pub fn is_no_filter(&self) -> bool {
        matches!(self, Self::NoFilter(_))
    }
}

/// Resolves the effective zone list for `(notifier_id, camera_id)`.
///
/// Never fails; store errors are logged and resolve to `NoFilter`.
pub fn resolve(source: &dyn ZoneSource, notifier_id: &str, camera_id: &str) -> ResolvedZones {
    match try_resolve(source, notifier_id, camera_id) {
        Ok(resolved) => resolved,
        Err(e) => {
            log::warn!(
                "zone lookup failed for notifier {} camera {}: {:#}",
                notifier_id,
                camera_id,
                e
            );
            ResolvedZones::NoFilter(BypassReason::ConfigurationUnavailable)
        }
    }
}

fn try_resolve(
    source: &dyn ZoneSource,
    notifier_id: &str,
    camera_id: &str,
) -> Result<ResolvedZones> {
    let Some(settings) = source.notifier_settings(notifier_id)? else {
        return Ok(ResolvedZones::NoFilter(BypassReason::NotifierUnknown));
    };
    if !settings.filtering_enabled {
        return Ok(ResolvedZones::NoFilter(BypassReason::FilteringDisabled));
    }

    let owner = if settings.use_custom {
        ZoneOwner::Notifier(notifier_id.to_string())
    } else {
        let Some(preset_id) = settings.selected_preset.filter(|id| !id.trim().is_empty()) else {
            return Ok(ResolvedZones::NoFilter(BypassReason::NoPresetSelected));
        };
        if !source.has_preset(&preset_id)? {
            return Ok(ResolvedZones::NoFilter(BypassReason::PresetNotFound));
        }
        ZoneOwner::Preset(preset_id)
    };

    let Some(checks) = source.zones(&owner, camera_id)? else {
        return Ok(ResolvedZones::NoFilter(BypassReason::CameraNotConfigured));
    };
    Ok(collect_zones(&owner, camera_id, checks))
}

fn collect_zones(owner: &ZoneOwner, camera_id: &str, checks: Vec<ZoneCheck>) -> ResolvedZones {
    if checks.is_empty() {
        return ResolvedZones::NoFilter(BypassReason::CameraNotConfigured);
    }

    let configured = checks.len();
    let mut invalid = 0usize;
    let mut zones = Vec::with_capacity(configured);
    for check in checks {
        match check {
            ZoneCheck::Valid(zone) if zone.is_enabled() => zones.push(zone),
            ZoneCheck::Valid(zone) => {
                log::debug!("{} camera {}: zone '{}' disabled", owner, camera_id, zone.name());
            }
            ZoneCheck::Invalid { spec, reason } => {
                invalid += 1;
                log::warn!(
                    "{} camera {}: skipping malformed zone '{}': {}",
                    owner,
                    camera_id,
                    spec.name,
                    reason
                );
            }
        }
    }

    if invalid == configured {
        return ResolvedZones::NoFilter(BypassReason::NoUsableZones);
    }
    ResolvedZones::Zones(zones)
}
