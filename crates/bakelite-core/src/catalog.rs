use serde::{Deserialize, Serialize};

/// One streaming source inside a pack.  `id` is opaque and stable; name and
/// url are editable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Station {
    pub id: String,
    pub name: String,
    pub url: String,
}

/// An ordered collection of stations.  Order is meaningful: it defines the
/// dial positions 1..N.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Pack {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub stations: Vec<Station>,
}

/// The full station catalog.  At most one pack is active at a time.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Catalog {
    #[serde(default)]
    pub packs: Vec<Pack>,
    #[serde(default)]
    pub active_pack_id: Option<String>,
}

impl Catalog {
    pub fn pack(&self, pack_id: &str) -> Option<&Pack> {
        self.packs.iter().find(|p| p.id == pack_id)
    }

    pub fn pack_mut(&mut self, pack_id: &str) -> Option<&mut Pack> {
        self.packs.iter_mut().find(|p| p.id == pack_id)
    }

    pub fn active_pack(&self) -> Option<&Pack> {
        self.active_pack_id.as_deref().and_then(|id| self.pack(id))
    }

    /// Number of dial positions in the active pack (0 when no pack is active).
    pub fn station_count(&self) -> usize {
        self.active_pack().map(|p| p.stations.len()).unwrap_or(0)
    }

    /// Station at 1-based dial position `index` in the active pack.
    pub fn station_at(&self, index: usize) -> Option<&Station> {
        if index == 0 {
            return None;
        }
        self.active_pack().and_then(|p| p.stations.get(index - 1))
    }

    /// Drop a dangling active_pack_id (deleted pack), falling back to the
    /// first pack if any exist.
    pub fn validate_active_pack(&mut self) {
        if let Some(id) = &self.active_pack_id {
            if self.pack(id).is_none() {
                self.active_pack_id = self.packs.first().map(|p| p.id.clone());
            }
        }
    }
}

impl Pack {
    /// Reorder stations to match `station_ids`.  Unknown ids are ignored;
    /// stations missing from the list keep their relative order at the end.
    pub fn reorder(&mut self, station_ids: &[String]) {
        let mut remaining = std::mem::take(&mut self.stations);
        let mut ordered = Vec::with_capacity(remaining.len());
        for id in station_ids {
            if let Some(pos) = remaining.iter().position(|s| &s.id == id) {
                ordered.push(remaining.remove(pos));
            }
        }
        ordered.extend(remaining);
        self.stations = ordered;
    }
}

/// Opaque unique id for packs and stations.  Time + counter keeps it unique
/// within and across runs without pulling in a uuid dependency.
pub fn new_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros())
        .unwrap_or(0);
    format!("{:x}-{:x}", now, n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(id: &str) -> Station {
        Station {
            id: id.to_string(),
            name: format!("Station {}", id),
            url: format!("https://example.com/{}", id),
        }
    }

    fn catalog_with_pack(station_ids: &[&str]) -> Catalog {
        let pack = Pack {
            id: "p1".into(),
            name: "Pack".into(),
            stations: station_ids.iter().map(|id| station(id)).collect(),
        };
        Catalog {
            packs: vec![pack],
            active_pack_id: Some("p1".into()),
        }
    }

    #[test]
    fn station_at_is_one_based() {
        let cat = catalog_with_pack(&["a", "b"]);
        assert!(cat.station_at(0).is_none());
        assert_eq!(cat.station_at(1).unwrap().id, "a");
        assert_eq!(cat.station_at(2).unwrap().id, "b");
        assert!(cat.station_at(3).is_none());
    }

    #[test]
    fn reorder_handles_unknown_and_missing_ids() {
        let mut cat = catalog_with_pack(&["a", "b", "c"]);
        let pack = cat.pack_mut("p1").unwrap();
        pack.reorder(&["c".into(), "nope".into(), "a".into()]);
        let ids: Vec<&str> = pack.stations.iter().map(|s| s.id.as_str()).collect();
        // "b" was not listed: appended after the explicit order.
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[test]
    fn validate_active_pack_falls_back_to_first() {
        let mut cat = catalog_with_pack(&["a"]);
        cat.active_pack_id = Some("deleted".into());
        cat.validate_active_pack();
        assert_eq!(cat.active_pack_id.as_deref(), Some("p1"));

        cat.packs.clear();
        cat.validate_active_pack();
        assert!(cat.active_pack_id.is_none());
    }

    #[test]
    fn ids_are_unique() {
        let a = new_id();
        let b = new_id();
        assert_ne!(a, b);
    }
}
