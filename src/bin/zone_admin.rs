//! zone_admin - manage presets, notifier settings and zones, and dry-run
//! notifications against the stored configuration.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use notify_zone_filter::document::ZoneDocument;
use notify_zone_filter::transport::Notification;
use notify_zone_filter::{
    ClassFilter, MembershipMode, NotifierSettings, SqliteZoneStore, Tolerance, ZoneCheck,
    ZoneConfigStore, ZoneFilter, ZoneOwner, ZoneSource, ZoneSpec,
};

#[derive(Parser, Debug)]
#[command(name = "zone_admin", about = "Manage notification filter zones")]
struct Args {
    /// Path to the zone database.
    #[arg(long, env = "ZONE_FILTER_DB_PATH", default_value = "zone_filter.db")]
    db_path: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a preset (prints its id)
    PresetCreate { name: String },

    /// List presets
    PresetList,

    /// Delete a preset and its zones
    PresetDelete { id: String },

    /// Add or replace a zone
    ZonePut {
        /// preset:<id> or notifier:<id>
        #[arg(long)]
        owner: ZoneOwner,
        #[arg(long)]
        camera: String,
        #[arg(long)]
        name: String,
        /// Outline as "x,y;x,y;x,y" in normalized coordinates
        #[arg(long)]
        points: String,
        /// Intersect or Contain
        #[arg(long, default_value = "Intersect")]
        mode: MembershipMode,
        /// Comma-separated detector labels the zone reacts to
        #[arg(long, conflicts_with = "categories")]
        classes: Option<String>,
        /// Comma-separated categories (person, vehicle, animal, ...)
        #[arg(long)]
        categories: Option<String>,
        #[arg(long)]
        disabled: bool,
    },

    /// Remove a zone
    ZoneRemove {
        #[arg(long)]
        owner: ZoneOwner,
        #[arg(long)]
        camera: String,
        #[arg(long)]
        name: String,
    },

    /// List zones for an owner
    ZoneList {
        #[arg(long)]
        owner: ZoneOwner,
        #[arg(long)]
        camera: Option<String>,
    },

    /// Configure a notifier
    NotifierSet {
        id: String,
        #[arg(long)]
        preset: Option<String>,
        #[arg(long)]
        use_custom: bool,
        #[arg(long)]
        disable_filtering: bool,
        #[arg(long)]
        debug_zones: bool,
    },

    /// List notifiers and their settings
    NotifierList,

    /// Merge a JSON or TOML zone document into the database
    Import { path: PathBuf },

    /// Write the database as a zone document ("-" for stdout, JSON)
    Export { path: String },

    /// Evaluate a notification payload file without sending anything
    Evaluate {
        payload: PathBuf,
        #[arg(long, default_value_t = 0.0)]
        epsilon: f64,
    },

    /// Render the first matching zone and object onto a snapshot (PNG)
    #[cfg(feature = "debug-overlay")]
    Preview {
        payload: PathBuf,
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 0.0)]
        epsilon: f64,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let mut store = SqliteZoneStore::open(&args.db_path)?;

    match args.command {
        Command::PresetCreate { name } => {
            let id = store.create_preset(&name)?;
            println!("{}", id);
        }
        Command::PresetList => {
            for preset in store.presets()? {
                println!("{}  {}", preset.id, preset.name);
            }
        }
        Command::PresetDelete { id } => {
            if !store.delete_preset(&id)? {
                return Err(anyhow!("no preset with id {}", id));
            }
            println!("deleted preset {}", id);
        }
        Command::ZonePut {
            owner,
            camera,
            name,
            points,
            mode,
            classes,
            categories,
            disabled,
        } => {
            let mut spec = ZoneSpec::new(name, parse_points(&points)?).with_mode(mode);
            if let Some(labels) = classes {
                spec = spec.with_classes(ClassFilter::only(split_csv(&labels)));
            } else if let Some(categories) = categories {
                spec = spec.with_classes(ClassFilter::from_categories(split_csv(&categories)));
            }
            if disabled {
                spec = spec.disabled();
            }
            match store.put_zone(&owner, &camera, spec)? {
                ZoneCheck::Valid(zone) => {
                    println!("saved zone '{}' for {} {}", zone.name(), owner, camera)
                }
                ZoneCheck::Invalid { spec, reason } => println!(
                    "saved zone '{}' for {} {} but it is invalid and will be ignored: {}",
                    spec.name, owner, camera, reason
                ),
            }
        }
        Command::ZoneRemove {
            owner,
            camera,
            name,
        } => {
            if !store.remove_zone(&owner, &camera, &name)? {
                return Err(anyhow!("no zone '{}' for {} {}", name, owner, camera));
            }
            println!("removed zone '{}'", name);
        }
        Command::ZoneList { owner, camera } => {
            let cameras = match camera {
                Some(camera) => vec![camera],
                None => store.cameras(&owner)?,
            };
            for camera in cameras {
                println!("{}", camera);
                for check in store.zones(&owner, &camera)?.unwrap_or_default() {
                    print_zone(&check);
                }
            }
        }
        Command::NotifierSet {
            id,
            preset,
            use_custom,
            disable_filtering,
            debug_zones,
        } => {
            let settings = NotifierSettings {
                filtering_enabled: !disable_filtering,
                use_custom,
                selected_preset: preset,
                debug_zones,
            };
            store.put_notifier_settings(&id, &settings)?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Command::NotifierList => {
            for id in store.notifiers()? {
                let settings = store.notifier_settings(&id)?.unwrap_or_default();
                println!("{}  {}", id, serde_json::to_string(&settings)?);
            }
        }
        Command::Import { path } => {
            let doc = ZoneDocument::load(&path)?;
            let summary = doc.apply_to(&mut store)?;
            println!(
                "imported {} preset(s), {} notifier(s), {} zone(s) ({} invalid)",
                summary.presets, summary.notifiers, summary.zones, summary.invalid_zones
            );
        }
        Command::Export { path } => {
            let doc = ZoneDocument::export(&store)?;
            if path == "-" {
                println!("{}", doc.to_json_string()?);
            } else {
                doc.save(Path::new(&path))?;
                println!("exported to {}", path);
            }
        }
        Command::Evaluate { payload, epsilon } => {
            let notification = read_notification(&payload)?;
            let event = notification.detection_event()?;
            let filter = ZoneFilter::new(store, Tolerance::new(epsilon));
            let decision = filter.filter(&notification.notifier_id, &event);
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
        #[cfg(feature = "debug-overlay")]
        Command::Preview {
            payload,
            snapshot,
            output,
            epsilon,
        } => preview(store, &payload, &snapshot, &output, epsilon)?,
    }
    Ok(())
}

#[cfg(feature = "debug-overlay")]
fn preview(
    store: SqliteZoneStore,
    payload: &Path,
    snapshot: &Path,
    output: &Path,
    epsilon: f64,
) -> Result<()> {
    use notify_zone_filter::{overlay, resolve, Evaluator, ResolvedZones};

    let notification = read_notification(payload)?;
    let event = notification.detection_event()?;
    let zones = resolve(&store, &notification.notifier_id, &event.camera_id);
    let decision = Evaluator::new(Tolerance::new(epsilon)).evaluate(&event, &zones);
    let (ResolvedZones::Zones(zones), Some(first)) = (&zones, &decision.first_match) else {
        return Err(anyhow!("no zone matched ({}); nothing to draw", decision.reason));
    };
    let zone = zones
        .iter()
        .find(|zone| zone.name() == first.zone)
        .ok_or_else(|| anyhow!("matched zone '{}' vanished", first.zone))?;

    let bytes = std::fs::read(snapshot)
        .with_context(|| format!("failed to read snapshot {}", snapshot.display()))?;
    let png = overlay::render_match(&bytes, zone, &event.objects[first.object_index])?;
    std::fs::write(output, png)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("wrote {}", output.display());
    Ok(())
}

fn read_notification(path: &Path) -> Result<Notification> {
    let raw = std::fs::read(path)
        .with_context(|| format!("failed to read payload {}", path.display()))?;
    Notification::from_slice(&raw)
}

fn print_zone(check: &ZoneCheck) {
    let spec = check.spec();
    let classes = match &spec.classes {
        ClassFilter::Any => "any".to_string(),
        ClassFilter::Only(labels) => labels.iter().cloned().collect::<Vec<_>>().join(","),
    };
    let state = match check {
        ZoneCheck::Valid(_) if spec.enabled => "enabled".to_string(),
        ZoneCheck::Valid(_) => "disabled".to_string(),
        ZoneCheck::Invalid { reason, .. } => format!("invalid: {}", reason),
    };
    println!(
        "  {:<20} {:<9} classes={} points={} [{}]",
        spec.name,
        spec.mode,
        classes,
        spec.points.len(),
        state
    );
}

fn parse_points(raw: &str) -> Result<Vec<[f64; 2]>> {
    raw.split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (x, y) = pair
                .split_once(',')
                .ok_or_else(|| anyhow!("point '{}' must be x,y", pair))?;
            let x: f64 = x.trim().parse().with_context(|| format!("bad x in '{}'", pair))?;
            let y: f64 = y.trim().parse().with_context(|| format!("bad y in '{}'", pair))?;
            Ok([x, y])
        })
        .collect()
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_point_lists() {
        assert_eq!(
            parse_points("0,0; 1,0 ;1, 1;").unwrap(),
            vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]
        );
        assert!(parse_points("0,0;1").is_err());
        assert!(parse_points("a,b").is_err());
    }

    #[test]
    fn splits_csv() {
        assert_eq!(split_csv(" person, car,,dog "), vec!["person", "car", "dog"]);
    }
}
