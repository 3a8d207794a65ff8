use super::entities::{EntityKey, EntityKind, EntityView};
use crate::models::Snapshot;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq)]
pub enum EntityEvent {
    /// First sighting of this id for the integration instance.
    Created(EntityView),
    Unavailable(EntityKey),
    Available(EntityKey),
}

#[derive(Serialize, Deserialize, Default)]
struct StoredRegistry {
    entities: BTreeMap<String, EntityView>,
}

/// Tracks which per-entity views have been materialized. Each tracking id
/// is created once; ids that disappear are reported unavailable, never
/// removed.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    path: Option<PathBuf>,
    entities: BTreeMap<String, EntityView>,
    present: HashSet<String>,
}

impl EntityRegistry {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads previously materialized views from `path`. A missing file is an
    /// empty registry; restored entities start out as present.
    pub fn load(path: &Path) -> io::Result<Self> {
        let stored = if path.exists() {
            let content = fs::read_to_string(path)?;
            serde_json::from_str::<StoredRegistry>(&content)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        } else {
            StoredRegistry::default()
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            present: stored.entities.keys().cloned().collect(),
            entities: stored.entities,
        })
    }

    pub fn views(&self) -> impl Iterator<Item = &EntityView> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, tracking_id: &str) -> bool {
        self.entities.contains_key(tracking_id)
    }

    /// Diffs the snapshot's ids against what is already tracked.
    pub fn sync(&mut self, snapshot: &Snapshot) -> Vec<EntityEvent> {
        let current: Vec<(EntityKey, &str)> = snapshot
            .notes
            .iter()
            .map(|n| (EntityKey::new(EntityKind::Note, &n.id), n.title.as_str()))
            .chain(
                snapshot
                    .checklists
                    .iter()
                    .map(|l| (EntityKey::new(EntityKind::Checklist, &l.id), l.title.as_str())),
            )
            .chain(
                snapshot
                    .tasks
                    .iter()
                    .map(|t| (EntityKey::new(EntityKind::Task, &t.id), t.title.as_str())),
            )
            .collect();
        debug!(
            notes = snapshot.notes.len(),
            checklists = snapshot.checklists.len(),
            tasks = snapshot.tasks.len(),
            "syncing entity registry"
        );

        let mut events = Vec::new();
        let mut seen = HashSet::new();
        let mut created = false;
        for (key, title) in current {
            let tracking_id = key.tracking_id();
            if !self.entities.contains_key(&tracking_id) {
                debug!(tracking_id = %tracking_id, title, "adding entity view");
                let view = EntityView::new(key, title);
                self.entities.insert(tracking_id.clone(), view.clone());
                events.push(EntityEvent::Created(view));
                created = true;
            } else if !self.present.contains(&tracking_id) {
                events.push(EntityEvent::Available(key));
            }
            seen.insert(tracking_id);
        }

        for (tracking_id, view) in &self.entities {
            if self.present.contains(tracking_id) && !seen.contains(tracking_id) {
                events.push(EntityEvent::Unavailable(view.key.clone()));
            }
        }
        self.present = seen;

        if created && let Err(err) = self.save() {
            warn!(error = %err, "failed to persist entity registry");
        }
        events
    }

    fn save(&self) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let stored = StoredRegistry {
            entities: self.entities.clone(),
        };
        let content = serde_json::to_string_pretty(&stored)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, content)
    }
}
