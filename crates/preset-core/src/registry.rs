//! Read models for the records this crate does not own.
//!
//! Presets, groups and clients live in external storage. The engine reads
//! them through the traits below; [`Registry`] is the in-memory implementation
//! used by the server, seeded from the YAML config.

use crate::config::Config;
use crate::error::{PresetError, Result};
use crate::types::{Client, ClientId, Group, GroupId, Preset, PresetId};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub trait PresetSource: Send + Sync {
    fn preset(&self, id: &PresetId) -> Result<Preset>;
    fn preset_ids(&self) -> Result<Vec<PresetId>>;
}

/// Resolves group membership. Callers must not cache results across
/// reconciliation cycles.
pub trait GroupResolver: Send + Sync {
    fn members(&self, group_id: &GroupId) -> Result<Vec<ClientId>>;
}

pub trait ClientDirectory: Send + Sync {
    fn client(&self, id: &ClientId) -> Option<Client>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct Records {
    clients: BTreeMap<ClientId, Client>,
    groups: BTreeMap<GroupId, Group>,
    presets: BTreeMap<PresetId, Preset>,
}

/// In-memory record store.
///
/// When built with [`Registry::persist_to`], preset and group edits are
/// written back to the config file. An edit only becomes visible once that
/// write has succeeded.
#[derive(Debug, Default)]
pub struct Registry {
    records: RwLock<Records>,
    base: Option<Config>,
    path: Option<PathBuf>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        let mut records = Records::default();
        for c in &config.clients {
            records.clients.insert(c.id.clone(), c.clone());
        }
        for g in &config.groups {
            records.groups.insert(g.id.clone(), g.clone());
        }
        for p in &config.presets {
            records.presets.insert(p.id.clone(), p.clone());
        }
        Self {
            records: RwLock::new(records),
            base: Some(config.clone()),
            path: None,
        }
    }

    pub fn persist_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn upsert_client(&self, client: Client) {
        self.records.write().clients.insert(client.id.clone(), client);
    }

    pub fn upsert_group(&self, group: Group) -> Result<()> {
        self.commit(|records| {
            records.groups.insert(group.id.clone(), group);
            Ok(())
        })
    }

    pub fn set_members(&self, group_id: &GroupId, members: Vec<ClientId>) -> Result<Group> {
        self.commit(|records| {
            let group = records
                .groups
                .entry(group_id.clone())
                .or_insert_with(|| Group {
                    id: group_id.clone(),
                    name: group_id.to_string(),
                    members: Vec::new(),
                });
            group.members = members;
            Ok(group.clone())
        })
    }

    pub fn remove_group(&self, group_id: &GroupId) -> Result<()> {
        self.commit(|records| match records.groups.remove(group_id) {
            Some(_) => Ok(()),
            None => Err(PresetError::GroupNotFound(group_id.clone())),
        })
    }

    /// Validate and store a preset.
    pub fn save_preset(&self, preset: Preset) -> Result<()> {
        self.commit(|records| {
            let group = preset
                .target_group_id
                .as_ref()
                .and_then(|g| records.groups.get(g));
            preset.validate(group, |id| records.clients.get(id).map(|c| c.name.clone()))?;
            records.presets.insert(preset.id.clone(), preset);
            Ok(())
        })
    }

    pub fn delete_preset(&self, id: &PresetId) -> Result<Preset> {
        self.commit(|records| {
            records
                .presets
                .remove(id)
                .ok_or_else(|| PresetError::PresetNotFound(id.clone()))
        })
    }

    /// Apply `edit` to a copy of the records, write the result out and only
    /// then make it current. The write lock is held throughout so edits
    /// validate against the state they replace.
    fn commit<T>(&self, edit: impl FnOnce(&mut Records) -> Result<T>) -> Result<T> {
        let mut current = self.records.write();
        let mut next = current.clone();
        let out = edit(&mut next)?;
        if let Some(path) = &self.path {
            self.config_of(&next).save(path)?;
        }
        *current = next;
        Ok(out)
    }

    fn config_of(&self, records: &Records) -> Config {
        let mut config = self.base.clone().unwrap_or_default();
        config.clients = records.clients.values().cloned().collect();
        config.groups = records.groups.values().cloned().collect();
        config.presets = records.presets.values().cloned().collect();
        config
    }
}

impl PresetSource for Registry {
    fn preset(&self, id: &PresetId) -> Result<Preset> {
        self.records
            .read()
            .presets
            .get(id)
            .cloned()
            .ok_or_else(|| PresetError::PresetNotFound(id.clone()))
    }

    fn preset_ids(&self) -> Result<Vec<PresetId>> {
        Ok(self.records.read().presets.keys().cloned().collect())
    }
}

impl GroupResolver for Registry {
    fn members(&self, group_id: &GroupId) -> Result<Vec<ClientId>> {
        self.records
            .read()
            .groups
            .get(group_id)
            .map(|g| g.members.clone())
            .ok_or_else(|| PresetError::GroupNotFound(group_id.clone()))
    }
}

impl ClientDirectory for Registry {
    fn client(&self, id: &ClientId) -> Option<Client> {
        self.records.read().clients.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seeded() -> Registry {
        let registry = Registry::new();
        registry.upsert_client(Client {
            id: ClientId::from("c1"),
            name: "Node 1".into(),
            address: "10.0.0.1".into(),
        });
        registry
            .upsert_group(Group {
                id: GroupId::from("wall"),
                name: "Wall".into(),
                members: vec![ClientId::from("c1")],
            })
            .unwrap();
        registry
    }

    #[test]
    fn members_resolve_fresh_after_change() {
        let registry = seeded();
        let wall = GroupId::from("wall");
        assert_eq!(registry.members(&wall).unwrap(), vec![ClientId::from("c1")]);

        registry
            .set_members(&wall, vec![ClientId::from("c1"), ClientId::from("c2")])
            .unwrap();
        assert_eq!(registry.members(&wall).unwrap().len(), 2);
    }

    #[test]
    fn missing_group_is_not_found() {
        let registry = Registry::new();
        let err = registry.members(&GroupId::from("gone")).unwrap_err();
        assert!(matches!(err, PresetError::GroupNotFound(_)));
    }

    #[test]
    fn save_preset_rejects_unconfigured_member() {
        let registry = seeded();
        let preset = Preset::new("p1", "Main").with_group("wall");
        let err = registry.save_preset(preset).unwrap_err();
        assert!(err.to_string().contains("Node 1"));
        assert!(registry.preset(&PresetId::from("p1")).is_err());
    }

    #[test]
    fn edits_are_written_back_to_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("presets.yaml");
        let registry = seeded().persist_to(&path);
        registry
            .save_preset(Preset::new("p1", "Main").with_group("wall").with_command("c1", "run.exe"))
            .unwrap();

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.presets.len(), 1);
        assert_eq!(reloaded.groups.len(), 1);

        registry.delete_preset(&PresetId::from("p1")).unwrap();
        assert!(Config::load(&path).unwrap().presets.is_empty());
    }

    #[test]
    fn failed_write_leaves_records_unchanged() {
        let dir = TempDir::new().unwrap();
        // A regular file where the config directory should be.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        let registry = seeded();
        registry
            .save_preset(Preset::new("p1", "Main").with_group("wall").with_command("c1", "run.exe"))
            .unwrap();
        let registry = registry.persist_to(blocker.join("presets.yaml"));

        let err = registry.delete_preset(&PresetId::from("p1")).unwrap_err();
        assert!(matches!(err, PresetError::Io(_)));
        assert!(registry.preset(&PresetId::from("p1")).is_ok());

        let p2 = Preset::new("p2", "Second").with_group("wall").with_command("c1", "b.exe");
        assert!(registry.save_preset(p2).is_err());
        assert!(registry.preset(&PresetId::from("p2")).is_err());

        assert!(registry.set_members(&GroupId::from("wall"), Vec::new()).is_err());
        assert_eq!(
            registry.members(&GroupId::from("wall")).unwrap(),
            vec![ClientId::from("c1")]
        );
    }
}
