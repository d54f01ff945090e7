//! Notification Zone Filter
//!
//! Decides whether a camera detection notification is delivered, based on
//! where the detected objects sit relative to operator-drawn zones.
//!
//! # Decision rules
//!
//! 1. Filtering off, or nothing configured for the notifier/camera pair:
//!    the notification passes unchanged (fail open).
//! 2. Zones configured: the notification passes when at least one object
//!    satisfies at least one enabled zone, otherwise it is suppressed.
//! 3. Malformed zones are rejected when saved and never reach evaluation.
//!
//! # Module Structure
//!
//! - `geometry`: points, boxes, polygons, containment and intersection
//! - `zone`: named zones with membership mode and class filter
//! - `resolve`: effective zone list per notifier and camera
//! - `engine`: allow/suppress decision for one detection event
//! - `storage`: zone configuration stores (in-memory, SQLite)
//! - `document`: TOML/JSON import and export of zone configuration
//! - `transport`: MQTT notification payloads and broker setup

use anyhow::Result;
use rand::RngCore;
use rusqlite::{Connection, OpenFlags};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod config;
pub mod detect;
pub mod document;
pub mod engine;
pub mod geometry;
#[cfg(feature = "debug-overlay")]
pub mod overlay;
pub mod resolve;
pub mod storage;
pub mod transport;
pub mod zone;

pub use detect::{DetectedObject, DetectionEvent};
pub use document::ZoneDocument;
pub use engine::{evaluate, Decision, DecisionReason, Evaluator, ZoneFilter, ZoneMatch};
pub use geometry::{Point, Polygon, PolygonError, Rect, Tolerance};
pub use resolve::{resolve, BypassReason, NotifierSettings, ResolvedZones, ZoneOwner, ZoneSource};
pub use storage::{InMemoryZoneStore, PresetInfo, SqliteZoneStore, ZoneConfigStore};
pub use zone::{ClassFilter, MembershipMode, Zone, ZoneCheck, ZoneSpec};

/// Private in-memory SQLite database shared across connections of one process.
pub fn shared_memory_uri() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!(
        "file:zone_filter_{:x}?mode=memory&cache=shared",
        u64::from_le_bytes(bytes)
    )
}

pub(crate) fn open_db_connection(db_path: &str) -> Result<Connection> {
    if db_path.starts_with("file:") {
        return Ok(Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?);
    }
    Ok(Connection::open(db_path)?)
}

/// 128-bit random preset id, hex encoded.
pub fn new_preset_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub(crate) fn now_s() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}
