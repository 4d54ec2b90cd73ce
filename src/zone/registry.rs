use crate::state::Point3;
use crate::zone::sse::RtdbEvent;
use crate::zone::{ForbiddenZone, ZoneError, ZoneSize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

/// Local read-through mirror of the external zone collection.
///
/// Only the zone source writes here; evaluators read.
pub struct ZoneRegistry {
    zones: RwLock<BTreeMap<String, Entry>>,
}

/// A mirrored zone and the store fields it was built from
struct Entry {
    zone: ForbiddenZone,
    record: Map<String, Value>,
}

impl From<ForbiddenZone> for Entry {
    fn from(zone: ForbiddenZone) -> Self {
        let record = zone.to_record();
        Self { zone, record }
    }
}

/// What a single store event did to the mirror
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RegistryChange {
    /// Whole collection was replaced
    pub reset: bool,
    pub upserted: Vec<String>,
    pub removed: Vec<String>,
}

impl RegistryChange {
    pub fn is_empty(&self) -> bool {
        !self.reset && self.upserted.is_empty() && self.removed.is_empty()
    }
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self {
            zones: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_zones(zones: impl IntoIterator<Item = ForbiddenZone>) -> Self {
        let registry = Self::new();
        registry.replace_all(zones);
        registry
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Entry>> {
        self.zones.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Entry>> {
        self.zones.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the whole mirror
    pub fn replace_all(&self, zones: impl IntoIterator<Item = ForbiddenZone>) {
        let fresh: BTreeMap<_, _> = zones
            .into_iter()
            .map(|z| (z.id.clone(), Entry::from(z)))
            .collect();
        *self.write() = fresh;
    }

    pub fn upsert(&self, zone: ForbiddenZone) {
        self.write().insert(zone.id.clone(), Entry::from(zone));
    }

    pub fn remove(&self, id: &str) -> Option<ForbiddenZone> {
        self.write().remove(id).map(|entry| entry.zone)
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn get(&self, id: &str) -> Option<ForbiddenZone> {
        self.read().get(id).map(|entry| entry.zone.clone())
    }

    /// All zones, ordered by id
    pub fn list(&self) -> Vec<ForbiddenZone> {
        self.read().values().map(|entry| entry.zone.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Ids of every zone containing `point`
    pub fn violated_by(&self, point: &Point3, tolerance: f64) -> BTreeSet<String> {
        self.read()
            .values()
            .map(|entry| &entry.zone)
            .filter(|zone| zone.contains(point, tolerance))
            .map(|zone| zone.id.clone())
            .collect()
    }

    /// Apply a Realtime Database stream event.
    ///
    /// Paths are relative to the zone collection: `/` is the collection,
    /// `/<id>` one zone, `/<id>/<field>` one field of a zone.
    pub fn apply_event(
        &self,
        event: &RtdbEvent,
        default_size: ZoneSize,
    ) -> Result<RegistryChange, ZoneError> {
        let (path, data, is_patch) = match event {
            RtdbEvent::Put { path, data } => (path, data, false),
            RtdbEvent::Patch { path, data } => (path, data, true),
            _ => return Ok(RegistryChange::default()),
        };

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut change = RegistryChange::default();

        match segments.as_slice() {
            [] if is_patch => {
                let children = data
                    .as_object()
                    .ok_or_else(|| ZoneError::MalformedEvent("root patch is not an object".to_string()))?;
                for (id, record) in children {
                    self.set_zone(id, record, default_size, &mut change);
                }
            }
            [] => {
                let entries = parse_entries(data, default_size);
                change.reset = true;
                change.upserted = entries.keys().cloned().collect();
                *self.write() = entries;
            }
            [id] if is_patch => {
                let fields = data
                    .as_object()
                    .ok_or_else(|| ZoneError::MalformedEvent(format!("patch of '{}' is not an object", id)))?;
                let mut record = self.current_record(id);
                for (field, value) in fields {
                    set_field(&mut record, field, value);
                }
                self.set_zone(id, &Value::Object(record), default_size, &mut change);
            }
            [id] => self.set_zone(id, data, default_size, &mut change),
            [id, field] => {
                let mut record = self.current_record(id);
                set_field(&mut record, field, data);
                self.set_zone(id, &Value::Object(record), default_size, &mut change);
            }
            _ => return Err(ZoneError::UnsupportedPath(path.clone())),
        }

        Ok(change)
    }

    /// Fields last received for `id`, empty if unknown
    fn current_record(&self, id: &str) -> Map<String, Value> {
        self.read()
            .get(id)
            .map(|entry| entry.record.clone())
            .unwrap_or_default()
    }

    /// Set one zone, or remove it when the record is null or has no fields left
    fn set_zone(&self, id: &str, record: &Value, default_size: ZoneSize, change: &mut RegistryChange) {
        let emptied = record.as_object().is_some_and(|fields| fields.is_empty());
        if record.is_null() || emptied {
            if self.remove(id).is_some() {
                change.removed.push(id.to_string());
            }
            return;
        }
        match ForbiddenZone::from_record(id, record, default_size) {
            Ok(zone) => {
                let record = record.as_object().cloned().unwrap_or_default();
                self.write().insert(id.to_string(), Entry { zone, record });
                change.upserted.push(id.to_string());
            }
            Err(e) => warn!(error = %e, "Ignoring zone record"),
        }
    }
}

impl Default for ZoneRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn set_field(record: &mut Map<String, Value>, field: &str, value: &Value) {
    if value.is_null() {
        record.remove(field);
    } else {
        record.insert(field.to_string(), value.clone());
    }
}

/// Parse a whole collection snapshot; malformed or empty entries are dropped.
fn parse_entries(data: &Value, default_size: ZoneSize) -> BTreeMap<String, Entry> {
    let Some(children) = data.as_object() else {
        return BTreeMap::new();
    };
    children
        .iter()
        .filter_map(|(id, record)| {
            let fields = record.as_object().filter(|fields| !fields.is_empty())?;
            match ForbiddenZone::from_record(id, record, default_size) {
                Ok(zone) => Some((
                    id.clone(),
                    Entry {
                        zone,
                        record: fields.clone(),
                    },
                )),
                Err(e) => {
                    warn!(error = %e, "Ignoring zone record");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn put(path: &str, data: Value) -> RtdbEvent {
        RtdbEvent::Put {
            path: path.to_string(),
            data,
        }
    }

    fn patch(path: &str, data: Value) -> RtdbEvent {
        RtdbEvent::Patch {
            path: path.to_string(),
            data,
        }
    }

    fn seeded() -> ZoneRegistry {
        let registry = ZoneRegistry::new();
        registry
            .apply_event(
                &put(
                    "/",
                    json!({
                        "a": {"x": 0, "y": 0, "z": 0, "w": 2, "h": 2, "d": 2},
                        "b": {"x": 10, "y": 0, "z": 0, "w": 2, "h": 2, "d": 2}
                    }),
                ),
                ZoneSize::default(),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_violated_by_reports_every_zone() {
        let registry = ZoneRegistry::with_zones([
            ForbiddenZone::new("a", Point3::new(0.0, 0.0, 0.0), ZoneSize::new(2.0, 2.0, 2.0)),
            ForbiddenZone::new("b", Point3::new(1.0, 0.0, 0.0), ZoneSize::new(2.0, 2.0, 2.0)),
            ForbiddenZone::new("c", Point3::new(9.0, 0.0, 0.0), ZoneSize::new(2.0, 2.0, 2.0)),
        ]);

        let hit = registry.violated_by(&Point3::new(0.5, 0.0, 0.0), 0.02);
        assert_eq!(hit, BTreeSet::from(["a".to_string(), "b".to_string()]));

        let hit = registry.violated_by(&Point3::new(1.8, 0.0, 0.0), 0.02);
        assert_eq!(hit, BTreeSet::from(["b".to_string()]));
    }

    #[test]
    fn test_root_put_replaces_everything() {
        let registry = seeded();
        assert_eq!(registry.len(), 2);

        let change = registry
            .apply_event(&put("/", json!({"c": {"x": 1}})), ZoneSize::default())
            .unwrap();
        assert!(change.reset);
        assert_eq!(registry.list().len(), 1);
        assert_eq!(registry.get("c").unwrap().size, ZoneSize::default());
    }

    #[test]
    fn test_root_put_null_clears() {
        let registry = seeded();
        registry
            .apply_event(&put("/", Value::Null), ZoneSize::default())
            .unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_child_put_adds_and_removes() {
        let registry = seeded();

        let change = registry
            .apply_event(&put("/-Nnew", json!({"x": 3, "y": 1, "z": 3})), ZoneSize::default())
            .unwrap();
        assert_eq!(change.upserted, vec!["-Nnew".to_string()]);
        assert_eq!(registry.len(), 3);

        let change = registry
            .apply_event(&put("/a", Value::Null), ZoneSize::default())
            .unwrap();
        assert_eq!(change.removed, vec!["a".to_string()]);
        assert!(registry.get("a").is_none());
    }

    #[test]
    fn test_root_patch_sets_children() {
        let registry = seeded();
        registry
            .apply_event(
                &patch("/", json!({"a": null, "d": {"x": 4, "w": 1, "h": 1, "d": 1}})),
                ZoneSize::default(),
            )
            .unwrap();

        assert!(registry.get("a").is_none());
        assert!(registry.get("b").is_some());
        assert_eq!(registry.get("d").unwrap().center.x, 4.0);
    }

    #[test]
    fn test_child_patch_merges_fields() {
        let registry = seeded();
        registry
            .apply_event(&patch("/b", json!({"x": 12.5})), ZoneSize::default())
            .unwrap();

        let zone = registry.get("b").unwrap();
        assert_eq!(zone.center, Point3::new(12.5, 0.0, 0.0));
        assert_eq!(zone.size, ZoneSize::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn test_patch_nulling_every_field_removes_zone() {
        let registry = seeded();
        let change = registry
            .apply_event(
                &patch(
                    "/b",
                    json!({"x": null, "y": null, "z": null, "w": null, "h": null, "d": null}),
                ),
                ZoneSize::default(),
            )
            .unwrap();

        assert_eq!(change.removed, vec!["b".to_string()]);
        assert!(change.upserted.is_empty());
        assert!(registry.get("b").is_none());
        assert!(registry
            .violated_by(&Point3::new(10.0, 0.0, 0.0), 0.02)
            .is_empty());
    }

    #[test]
    fn test_field_put_null_on_last_field_removes_zone() {
        let registry = ZoneRegistry::new();
        registry
            .apply_event(&put("/solo", json!({"w": 3})), ZoneSize::default())
            .unwrap();
        assert!(registry.get("solo").is_some());

        let change = registry
            .apply_event(&put("/solo/w", Value::Null), ZoneSize::default())
            .unwrap();
        assert_eq!(change.removed, vec!["solo".to_string()]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_field_put_updates_one_field() {
        let registry = seeded();
        registry
            .apply_event(&put("/a/h", json!(6)), ZoneSize::default())
            .unwrap();
        assert_eq!(registry.get("a").unwrap().size, ZoneSize::new(2.0, 6.0, 2.0));
    }

    #[test]
    fn test_deep_path_is_rejected_without_change() {
        let registry = seeded();
        let err = registry
            .apply_event(&put("/a/h/extra", json!(1)), ZoneSize::default())
            .unwrap_err();
        assert!(matches!(err, ZoneError::UnsupportedPath(_)));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_keep_alive_is_no_op() {
        let registry = seeded();
        let change = registry
            .apply_event(&RtdbEvent::KeepAlive, ZoneSize::default())
            .unwrap();
        assert!(change.is_empty());
        assert_eq!(registry.len(), 2);
    }
}
