//! Portable zone configuration documents (TOML or JSON).
//!
//! ```toml
//! [presets.4f1c...]
//! name = "Driveway"
//! [[presets.4f1c....cameras.front]]
//! name = "drive"
//! points = [[0.0, 0.5], [1.0, 0.5], [1.0, 1.0], [0.0, 1.0]]
//!
//! [notifiers.phone]
//! selected_preset = "4f1c..."
//! ```

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::resolve::{NotifierSettings, ZoneOwner};
use crate::storage::{InMemoryZoneStore, ZoneConfigStore};
use crate::zone::ZoneSpec;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneDocument {
    #[serde(default)]
    pub presets: BTreeMap<String, PresetDocument>,
    #[serde(default)]
    pub notifiers: BTreeMap<String, NotifierDocument>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PresetDocument {
    pub name: String,
    #[serde(default)]
    pub cameras: BTreeMap<String, Vec<ZoneSpec>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotifierDocument {
    #[serde(default = "default_true")]
    pub filtering_enabled: bool,
    #[serde(default)]
    pub use_custom: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_preset: Option<String>,
    #[serde(default)]
    pub debug_zones: bool,
    #[serde(default)]
    pub cameras: BTreeMap<String, Vec<ZoneSpec>>,
}

fn default_true() -> bool {
    true
}

impl Default for NotifierDocument {
    fn default() -> Self {
        Self::from_settings(&NotifierSettings::default())
    }
}

impl NotifierDocument {
    fn from_settings(settings: &NotifierSettings) -> Self {
        Self {
            filtering_enabled: settings.filtering_enabled,
            use_custom: settings.use_custom,
            selected_preset: settings.selected_preset.clone(),
            debug_zones: settings.debug_zones,
            cameras: BTreeMap::new(),
        }
    }

    pub fn settings(&self) -> NotifierSettings {
        NotifierSettings {
            filtering_enabled: self.filtering_enabled,
            use_custom: self.use_custom,
            selected_preset: self.selected_preset.clone(),
            debug_zones: self.debug_zones,
        }
    }
}

/// Counts reported after an import.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub presets: usize,
    pub notifiers: usize,
    pub zones: usize,
    /// Zones stored but flagged invalid; they are skipped at evaluation time.
    pub invalid_zones: usize,
}

impl ZoneDocument {
    /// Reads a document; `.toml` files parse as TOML, anything else as JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read zone document {}", path.display()))?;
        let parsed = if is_toml(path) {
            Self::from_toml_str(&raw)
        } else {
            Self::from_json_str(&raw)
        };
        parsed.with_context(|| format!("invalid zone document {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let rendered = if is_toml(path) {
            self.to_toml_string()?
        } else {
            self.to_json_string()?
        };
        std::fs::write(path, rendered)
            .with_context(|| format!("failed to write zone document {}", path.display()))
    }

    /// Snapshot of everything a store holds.
    pub fn export(store: &dyn ZoneConfigStore) -> Result<Self> {
        let mut doc = Self::default();
        for preset in store.presets()? {
            let owner = ZoneOwner::Preset(preset.id.clone());
            doc.presets.insert(
                preset.id,
                PresetDocument {
                    name: preset.name,
                    cameras: export_cameras(store, &owner)?,
                },
            );
        }
        for notifier_id in store.notifiers()? {
            let settings = store
                .notifier_settings(&notifier_id)?
                .ok_or_else(|| anyhow!("notifier '{}' vanished during export", notifier_id))?;
            let owner = ZoneOwner::Notifier(notifier_id.clone());
            let mut entry = NotifierDocument::from_settings(&settings);
            entry.cameras = export_cameras(store, &owner)?;
            doc.notifiers.insert(notifier_id, entry);
        }
        Ok(doc)
    }

    /// Merges the document into a store. Zones with the same name on the same
    /// camera are replaced; everything else is kept.
    pub fn apply_to(&self, store: &mut dyn ZoneConfigStore) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();
        for (preset_id, preset) in &self.presets {
            store.insert_preset(preset_id, &preset.name)?;
            summary.presets += 1;
            let owner = ZoneOwner::Preset(preset_id.clone());
            import_cameras(store, &owner, &preset.cameras, &mut summary)?;
        }
        for (notifier_id, notifier) in &self.notifiers {
            store.put_notifier_settings(notifier_id, &notifier.settings())?;
            summary.notifiers += 1;
            let owner = ZoneOwner::Notifier(notifier_id.clone());
            import_cameras(store, &owner, &notifier.cameras, &mut summary)?;
        }
        Ok(summary)
    }
}

impl InMemoryZoneStore {
    pub fn from_document(doc: &ZoneDocument) -> Result<Self> {
        let mut store = Self::new();
        let summary = doc.apply_to(&mut store)?;
        if summary.invalid_zones > 0 {
            log::warn!(
                "zone document contains {} invalid zone(s); they will be ignored",
                summary.invalid_zones
            );
        }
        Ok(store)
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false)
}

fn export_cameras(
    store: &dyn ZoneConfigStore,
    owner: &ZoneOwner,
) -> Result<BTreeMap<String, Vec<ZoneSpec>>> {
    let mut cameras = BTreeMap::new();
    for camera_id in store.cameras(owner)? {
        let specs = store
            .zones(owner, &camera_id)?
            .unwrap_or_default()
            .iter()
            .map(|check| check.spec())
            .collect();
        cameras.insert(camera_id, specs);
    }
    Ok(cameras)
}

fn import_cameras(
    store: &mut dyn ZoneConfigStore,
    owner: &ZoneOwner,
    cameras: &BTreeMap<String, Vec<ZoneSpec>>,
    summary: &mut ImportSummary,
) -> Result<()> {
    for (camera_id, specs) in cameras {
        for spec in specs {
            let check = store
                .put_zone(owner, camera_id, spec.clone())
                .with_context(|| format!("{} camera {} zone '{}'", owner, camera_id, spec.name))?;
            summary.zones += 1;
            if !check.is_valid() {
                summary.invalid_zones += 1;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::ZoneSource;
    use crate::zone::{ClassFilter, MembershipMode};

    const SAMPLE: &str = r#"
[presets.p1]
name = "Driveway"

[[presets.p1.cameras.front]]
name = "drive"
points = [[0.0, 0.5], [1.0, 0.5], [1.0, 1.0], [0.0, 1.0]]
mode = "Contain"
classes = { only = ["person", "car"] }

[[presets.p1.cameras.front]]
name = "broken"
points = [[0.1, 0.1], [0.2, 0.2]]

[notifiers.phone]
selected_preset = "p1"

[notifiers.tablet]
use_custom = true
debug_zones = true

[[notifiers.tablet.cameras.back]]
name = "yard"
points = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]
enabled = false
"#;

    #[test]
    fn parses_toml_document() {
        let doc = ZoneDocument::from_toml_str(SAMPLE).expect("parse");
        let drive = &doc.presets["p1"].cameras["front"][0];
        assert_eq!(drive.mode, MembershipMode::Contain);
        assert_eq!(drive.classes, ClassFilter::only(["person", "car"]));
        assert!(drive.enabled);

        let phone = doc.notifiers["phone"].settings();
        assert!(phone.filtering_enabled);
        assert!(!phone.use_custom);
        assert_eq!(phone.selected_preset.as_deref(), Some("p1"));
        assert!(!doc.notifiers["tablet"].cameras["back"][0].enabled);
    }

    #[test]
    fn import_counts_invalid_zones() {
        let doc = ZoneDocument::from_toml_str(SAMPLE).expect("parse");
        let mut store = InMemoryZoneStore::new();
        let summary = doc.apply_to(&mut store).expect("import");
        assert_eq!(
            summary,
            ImportSummary {
                presets: 1,
                notifiers: 2,
                zones: 3,
                invalid_zones: 1,
            }
        );
        assert!(store.has_preset("p1").unwrap());
    }

    #[test]
    fn export_then_import_preserves_configuration() {
        let doc = ZoneDocument::from_toml_str(SAMPLE).expect("parse");
        let store = InMemoryZoneStore::from_document(&doc).expect("load");
        let exported = ZoneDocument::export(&store).expect("export");
        assert_eq!(exported, doc);

        let json = exported.to_json_string().expect("json");
        assert_eq!(ZoneDocument::from_json_str(&json).expect("reparse"), doc);
        let toml = exported.to_toml_string().expect("toml");
        assert_eq!(ZoneDocument::from_toml_str(&toml).expect("reparse"), doc);
    }

    #[test]
    fn rejects_bad_zone_names() {
        let raw = r#"{"presets":{"p":{"name":"x","cameras":{"c":[{"name":"a/b","points":[[0,0],[1,0],[1,1]]}]}}}}"#;
        let doc = ZoneDocument::from_json_str(raw).expect("parse");
        let mut store = InMemoryZoneStore::new();
        assert!(doc.apply_to(&mut store).is_err());
    }
}
