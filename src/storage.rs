use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::resolve::{NotifierSettings, ZoneOwner, ZoneSet, ZoneSource};
use crate::zone::{validate_zone_name, ZoneCheck, ZoneSpec};
use crate::{new_preset_id, now_s, open_db_connection};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresetInfo {
    pub id: String,
    pub name: String,
}

/// Write side of the zone configuration store.
///
/// Edits take `&mut self`, so a resolution in progress never observes a
/// half-applied change; they take effect on the next resolution.
pub trait ZoneConfigStore: ZoneSource {
    /// Creates a preset with a fresh random id and returns the id.
    fn create_preset(&mut self, name: &str) -> Result<String>;

    /// Creates or renames a preset with a caller-chosen id.
    fn insert_preset(&mut self, preset_id: &str, name: &str) -> Result<()>;

    /// Deletes a preset and all of its zones.
    fn delete_preset(&mut self, preset_id: &str) -> Result<bool>;

    fn presets(&self) -> Result<Vec<PresetInfo>>;

    fn put_notifier_settings(&mut self, notifier_id: &str, settings: &NotifierSettings)
        -> Result<()>;

    fn notifiers(&self) -> Result<Vec<String>>;

    /// Saves a zone, validating it. Malformed polygons are stored as
    /// `ZoneCheck::Invalid`; bad names or unknown presets are rejected.
    fn put_zone(&mut self, owner: &ZoneOwner, camera_id: &str, spec: ZoneSpec)
        -> Result<ZoneCheck>;

    fn remove_zone(&mut self, owner: &ZoneOwner, camera_id: &str, zone_name: &str)
        -> Result<bool>;

    /// Cameras with at least one zone for this owner.
    fn cameras(&self, owner: &ZoneOwner) -> Result<Vec<String>>;
}

fn validate_zone_target(camera_id: &str, spec: &ZoneSpec) -> Result<()> {
    if camera_id.trim().is_empty() {
        return Err(anyhow!("camera id must not be empty"));
    }
    validate_zone_name(&spec.name)
}

// -------------------- In-memory store --------------------

#[derive(Clone, Debug, Default)]
struct PresetEntry {
    name: String,
    zones: ZoneSet,
}

#[derive(Clone, Debug, Default)]
struct NotifierEntry {
    settings: NotifierSettings,
    zones: ZoneSet,
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryZoneStore {
    presets: BTreeMap<String, PresetEntry>,
    notifiers: BTreeMap<String, NotifierEntry>,
}

impl InMemoryZoneStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn zone_set(&self, owner: &ZoneOwner) -> Option<&ZoneSet> {
        match owner {
            ZoneOwner::Preset(id) => self.presets.get(id).map(|p| &p.zones),
            ZoneOwner::Notifier(id) => self.notifiers.get(id).map(|n| &n.zones),
        }
    }

    fn zone_set_mut(&mut self, owner: &ZoneOwner) -> Result<&mut ZoneSet> {
        match owner {
            ZoneOwner::Preset(id) => self
                .presets
                .get_mut(id)
                .map(|p| &mut p.zones)
                .ok_or_else(|| anyhow!("unknown preset '{}'", id)),
            ZoneOwner::Notifier(id) => Ok(&mut self.notifiers.entry(id.clone()).or_default().zones),
        }
    }
}

impl ZoneSource for InMemoryZoneStore {
    fn notifier_settings(&self, notifier_id: &str) -> Result<Option<NotifierSettings>> {
        Ok(self.notifiers.get(notifier_id).map(|n| n.settings.clone()))
    }

    fn has_preset(&self, preset_id: &str) -> Result<bool> {
        Ok(self.presets.contains_key(preset_id))
    }

    fn zones(&self, owner: &ZoneOwner, camera_id: &str) -> Result<Option<Vec<ZoneCheck>>> {
        Ok(self
            .zone_set(owner)
            .and_then(|set| set.zones(camera_id))
            .map(<[ZoneCheck]>::to_vec))
    }
}

impl ZoneConfigStore for InMemoryZoneStore {
    fn create_preset(&mut self, name: &str) -> Result<String> {
        let id = new_preset_id();
        self.insert_preset(&id, name)?;
        Ok(id)
    }

    fn insert_preset(&mut self, preset_id: &str, name: &str) -> Result<()> {
        if preset_id.trim().is_empty() {
            return Err(anyhow!("preset id must not be empty"));
        }
        self.presets.entry(preset_id.to_string()).or_default().name = name.to_string();
        Ok(())
    }

    fn delete_preset(&mut self, preset_id: &str) -> Result<bool> {
        Ok(self.presets.remove(preset_id).is_some())
    }

    fn presets(&self) -> Result<Vec<PresetInfo>> {
        Ok(self
            .presets
            .iter()
            .map(|(id, entry)| PresetInfo {
                id: id.clone(),
                name: entry.name.clone(),
            })
            .collect())
    }

    fn put_notifier_settings(
        &mut self,
        notifier_id: &str,
        settings: &NotifierSettings,
    ) -> Result<()> {
        if notifier_id.trim().is_empty() {
            return Err(anyhow!("notifier id must not be empty"));
        }
        self.notifiers
            .entry(notifier_id.to_string())
            .or_default()
            .settings = settings.clone();
        Ok(())
    }

    fn notifiers(&self) -> Result<Vec<String>> {
        Ok(self.notifiers.keys().cloned().collect())
    }

    fn put_zone(
        &mut self,
        owner: &ZoneOwner,
        camera_id: &str,
        spec: ZoneSpec,
    ) -> Result<ZoneCheck> {
        validate_zone_target(camera_id, &spec)?;
        Ok(self.zone_set_mut(owner)?.upsert(camera_id, spec).clone())
    }

    fn remove_zone(
        &mut self,
        owner: &ZoneOwner,
        camera_id: &str,
        zone_name: &str,
    ) -> Result<bool> {
        Ok(match owner {
            ZoneOwner::Preset(id) => self
                .presets
                .get_mut(id)
                .map(|p| p.zones.remove(camera_id, zone_name))
                .unwrap_or(false),
            ZoneOwner::Notifier(id) => self
                .notifiers
                .get_mut(id)
                .map(|n| n.zones.remove(camera_id, zone_name))
                .unwrap_or(false),
        })
    }

    fn cameras(&self, owner: &ZoneOwner) -> Result<Vec<String>> {
        Ok(self
            .zone_set(owner)
            .map(|set| set.cameras().map(str::to_string).collect())
            .unwrap_or_default())
    }
}

// -------------------- SQLite store --------------------

type ZoneCacheKey = (ZoneOwner, String);

/// SQLite-backed configuration store.
///
/// Validated zone lists are cached per `(owner, camera)` and the cache entry
/// is dropped on every edit, so evaluations never re-validate polygons.
pub struct SqliteZoneStore {
    conn: Connection,
    cache: Mutex<ZoneCache>,
}

#[derive(Default)]
struct ZoneCache {
    /// `PRAGMA data_version` when the entries were loaded; it moves when
    /// another connection commits.
    data_version: i64,
    entries: HashMap<ZoneCacheKey, Option<Vec<ZoneCheck>>>,
}

impl SqliteZoneStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = open_db_connection(db_path)
            .with_context(|| format!("failed to open zone database {}", db_path))?;
        let mut store = Self {
            conn,
            cache: Mutex::new(ZoneCache::default()),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS presets (
              id TEXT PRIMARY KEY,
              name TEXT NOT NULL,
              created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS notifiers (
              id TEXT PRIMARY KEY,
              filtering_enabled INTEGER NOT NULL,
              use_custom INTEGER NOT NULL,
              selected_preset TEXT,
              debug_zones INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS zones (
              owner_kind TEXT NOT NULL,
              owner_id TEXT NOT NULL,
              camera_id TEXT NOT NULL,
              name TEXT NOT NULL,
              position INTEGER NOT NULL,
              spec_json TEXT NOT NULL,
              PRIMARY KEY (owner_kind, owner_id, camera_id, name)
            );

            CREATE INDEX IF NOT EXISTS idx_zones_camera
              ON zones(owner_kind, owner_id, camera_id, position);
            "#,
        )?;
        Ok(())
    }

    fn cache(&self) -> Result<MutexGuard<'_, ZoneCache>> {
        self.cache
            .lock()
            .map_err(|_| anyhow!("zone cache lock poisoned"))
    }

    fn invalidate(&self, owner: &ZoneOwner, camera_id: Option<&str>) -> Result<()> {
        let mut cache = self.cache()?;
        match camera_id {
            Some(camera) => {
                cache.entries.remove(&(owner.clone(), camera.to_string()));
            }
            None => cache
                .entries
                .retain(|(cached_owner, _), _| cached_owner != owner),
        }
        Ok(())
    }

    fn load_zones(&self, owner: &ZoneOwner, camera_id: &str) -> Result<Option<Vec<ZoneCheck>>> {
        let mut stmt = self.conn.prepare(
            "SELECT spec_json FROM zones
             WHERE owner_kind = ?1 AND owner_id = ?2 AND camera_id = ?3
             ORDER BY position ASC",
        )?;
        let mut rows = stmt.query(params![owner.kind(), owner.id(), camera_id])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let payload: String = row.get(0)?;
            let spec: ZoneSpec = serde_json::from_str(&payload)
                .with_context(|| format!("corrupt zone record for {} camera {}", owner, camera_id))?;
            out.push(ZoneCheck::check(spec));
        }
        Ok(if out.is_empty() { None } else { Some(out) })
    }

    fn ensure_owner(&self, owner: &ZoneOwner) -> Result<()> {
        match owner {
            ZoneOwner::Preset(id) => {
                if !self.has_preset(id)? {
                    return Err(anyhow!("unknown preset '{}'", id));
                }
            }
            ZoneOwner::Notifier(id) => {
                let defaults = NotifierSettings::default();
                self.conn.execute(
                    "INSERT OR IGNORE INTO notifiers
                       (id, filtering_enabled, use_custom, selected_preset, debug_zones)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        id,
                        defaults.filtering_enabled,
                        defaults.use_custom,
                        defaults.selected_preset,
                        defaults.debug_zones
                    ],
                )?;
            }
        }
        Ok(())
    }
}

impl ZoneSource for SqliteZoneStore {
    fn notifier_settings(&self, notifier_id: &str) -> Result<Option<NotifierSettings>> {
        let settings = self
            .conn
            .query_row(
                "SELECT filtering_enabled, use_custom, selected_preset, debug_zones
                 FROM notifiers WHERE id = ?1",
                params![notifier_id],
                |row| {
                    Ok(NotifierSettings {
                        filtering_enabled: row.get(0)?,
                        use_custom: row.get(1)?,
                        selected_preset: row.get(2)?,
                        debug_zones: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(settings)
    }

    fn has_preset(&self, preset_id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM presets WHERE id = ?1",
                params![preset_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn zones(&self, owner: &ZoneOwner, camera_id: &str) -> Result<Option<Vec<ZoneCheck>>> {
        let data_version: i64 = self
            .conn
            .query_row("PRAGMA data_version", [], |row| row.get(0))?;
        let key = (owner.clone(), camera_id.to_string());
        {
            let mut cache = self.cache()?;
            if cache.data_version != data_version {
                cache.entries.clear();
                cache.data_version = data_version;
            }
            if let Some(cached) = cache.entries.get(&key) {
                return Ok(cached.clone());
            }
        }
        let loaded = self.load_zones(owner, camera_id)?;
        self.cache()?.entries.insert(key, loaded.clone());
        Ok(loaded)
    }
}

impl ZoneConfigStore for SqliteZoneStore {
    fn create_preset(&mut self, name: &str) -> Result<String> {
        let id = new_preset_id();
        self.insert_preset(&id, name)?;
        Ok(id)
    }

    fn insert_preset(&mut self, preset_id: &str, name: &str) -> Result<()> {
        if preset_id.trim().is_empty() {
            return Err(anyhow!("preset id must not be empty"));
        }
        let created_at = i64::try_from(now_s()?)
            .map_err(|_| anyhow!("current time exceeds i64 range"))?;
        self.conn.execute(
            "INSERT INTO presets (id, name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            params![preset_id, name, created_at],
        )?;
        Ok(())
    }

    fn delete_preset(&mut self, preset_id: &str) -> Result<bool> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM zones WHERE owner_kind = 'preset' AND owner_id = ?1",
            params![preset_id],
        )?;
        let removed = tx.execute("DELETE FROM presets WHERE id = ?1", params![preset_id])?;
        tx.commit()?;
        self.invalidate(&ZoneOwner::Preset(preset_id.to_string()), None)?;
        Ok(removed > 0)
    }

    fn presets(&self) -> Result<Vec<PresetInfo>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM presets ORDER BY created_at ASC, id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(PresetInfo {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn put_notifier_settings(
        &mut self,
        notifier_id: &str,
        settings: &NotifierSettings,
    ) -> Result<()> {
        if notifier_id.trim().is_empty() {
            return Err(anyhow!("notifier id must not be empty"));
        }
        self.conn.execute(
            "INSERT INTO notifiers
               (id, filtering_enabled, use_custom, selected_preset, debug_zones)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
               filtering_enabled = excluded.filtering_enabled,
               use_custom = excluded.use_custom,
               selected_preset = excluded.selected_preset,
               debug_zones = excluded.debug_zones",
            params![
                notifier_id,
                settings.filtering_enabled,
                settings.use_custom,
                settings.selected_preset,
                settings.debug_zones
            ],
        )?;
        Ok(())
    }

    fn notifiers(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT id FROM notifiers ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn put_zone(
        &mut self,
        owner: &ZoneOwner,
        camera_id: &str,
        spec: ZoneSpec,
    ) -> Result<ZoneCheck> {
        validate_zone_target(camera_id, &spec)?;
        self.ensure_owner(owner)?;
        let payload = serde_json::to_string(&spec)?;

        let tx = self.conn.transaction()?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT position FROM zones
                 WHERE owner_kind = ?1 AND owner_id = ?2 AND camera_id = ?3 AND name = ?4",
                params![owner.kind(), owner.id(), camera_id, spec.name],
                |row| row.get(0),
            )
            .optional()?;
        match existing {
            Some(position) => {
                tx.execute(
                    "UPDATE zones SET spec_json = ?5
                     WHERE owner_kind = ?1 AND owner_id = ?2 AND camera_id = ?3 AND name = ?4
                       AND position = ?6",
                    params![owner.kind(), owner.id(), camera_id, spec.name, payload, position],
                )?;
            }
            None => {
                let next: i64 = tx.query_row(
                    "SELECT COALESCE(MAX(position), -1) + 1 FROM zones
                     WHERE owner_kind = ?1 AND owner_id = ?2 AND camera_id = ?3",
                    params![owner.kind(), owner.id(), camera_id],
                    |row| row.get(0),
                )?;
                tx.execute(
                    "INSERT INTO zones (owner_kind, owner_id, camera_id, name, position, spec_json)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![owner.kind(), owner.id(), camera_id, spec.name, next, payload],
                )?;
            }
        }
        tx.commit()?;

        self.invalidate(owner, Some(camera_id))?;
        Ok(ZoneCheck::check(spec))
    }

    fn remove_zone(
        &mut self,
        owner: &ZoneOwner,
        camera_id: &str,
        zone_name: &str,
    ) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM zones
             WHERE owner_kind = ?1 AND owner_id = ?2 AND camera_id = ?3 AND name = ?4",
            params![owner.kind(), owner.id(), camera_id, zone_name],
        )?;
        self.invalidate(owner, Some(camera_id))?;
        Ok(removed > 0)
    }

    fn cameras(&self, owner: &ZoneOwner) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT camera_id FROM zones
             WHERE owner_kind = ?1 AND owner_id = ?2 ORDER BY camera_id ASC",
        )?;
        let rows = stmt.query_map(params![owner.kind(), owner.id()], |row| {
            row.get::<_, String>(0)
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
