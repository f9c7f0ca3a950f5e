//! In-memory collaborators for tests: record every call and allow failure injection.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::{
    CreateOutcome, DeleteOutcome, DesiredRecord, EtherealError, EtherealResult, InstanceController, ManagedInstance,
    RecordStatus, StateStore,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// A status write accepted by [`MockStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusWrite {
    pub record: String,
    pub resurrections: Option<u64>,
}

#[derive(Default)]
struct StoreState {
    records: BTreeMap<String, DesiredRecord>,
    version: u64,
    list_calls: usize,
    fail_list: Option<EtherealError>,
    fail_patch: HashMap<String, EtherealError>,
    writes: Vec<StatusWrite>,
}

impl StoreState {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

/// Record store with resourceVersion semantics.
#[derive(Default)]
pub struct MockStore {
    state: Mutex<StoreState>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record; a fresh version token is assigned.
    pub fn insert(&self, mut record: DesiredRecord) {
        let mut st = lock(&self.state);
        record.resource_version = Some(st.next_version());
        st.records.insert(record.name.clone(), record);
    }

    pub fn with_records(records: impl IntoIterator<Item = DesiredRecord>) -> Self {
        let store = Self::new();
        for r in records {
            store.insert(r);
        }
        store
    }

    pub fn record(&self, name: &str) -> Option<DesiredRecord> {
        lock(&self.state).records.get(name).cloned()
    }

    pub fn resurrections(&self, name: &str) -> Option<u64> {
        self.record(name).and_then(|r| r.status.resurrections)
    }

    /// Change the desired image as an external author would.
    pub fn set_image(&self, name: &str, image: Option<&str>) {
        let mut st = lock(&self.state);
        let version = st.next_version();
        if let Some(r) = st.records.get_mut(name) {
            r.spec.image = image.map(|s| s.to_string());
            r.resource_version = Some(version);
        }
    }

    /// Bump the stored version without changing content (concurrent writer).
    pub fn touch(&self, name: &str) {
        let mut st = lock(&self.state);
        let version = st.next_version();
        if let Some(r) = st.records.get_mut(name) {
            r.resource_version = Some(version);
        }
    }

    pub fn remove(&self, name: &str) {
        lock(&self.state).records.remove(name);
    }

    pub fn fail_list(&self, err: Option<EtherealError>) {
        lock(&self.state).fail_list = err;
    }

    pub fn fail_patch(&self, name: &str, err: EtherealError) {
        lock(&self.state).fail_patch.insert(name.to_string(), err);
    }

    pub fn clear_patch_failures(&self) {
        lock(&self.state).fail_patch.clear();
    }

    pub fn list_calls(&self) -> usize {
        lock(&self.state).list_calls
    }

    pub fn status_writes(&self) -> Vec<StatusWrite> {
        lock(&self.state).writes.clone()
    }
}

#[async_trait]
impl StateStore for MockStore {
    async fn list(&self) -> EtherealResult<Vec<DesiredRecord>> {
        let mut st = lock(&self.state);
        st.list_calls += 1;
        if let Some(e) = st.fail_list.clone() {
            return Err(e);
        }
        Ok(st.records.values().cloned().collect())
    }

    async fn get(&self, name: &str) -> EtherealResult<Option<DesiredRecord>> {
        Ok(lock(&self.state).records.get(name).cloned())
    }

    async fn patch_status(&self, record: &DesiredRecord, status: &RecordStatus) -> EtherealResult<DesiredRecord> {
        let mut st = lock(&self.state);
        if let Some(e) = st.fail_patch.get(&record.name).cloned() {
            return Err(e);
        }
        let stored_version = match st.records.get(&record.name) {
            Some(r) => r.resource_version.clone(),
            None => return Err(EtherealError::NotFound(format!("record {}", record.name))),
        };
        if stored_version != record.resource_version {
            return Err(EtherealError::Conflict(format!(
                "record {} changed ({:?} -> {:?})",
                record.name, record.resource_version, stored_version
            )));
        }
        let version = st.next_version();
        st.writes.push(StatusWrite { record: record.name.clone(), resurrections: status.resurrections });
        let stored = st
            .records
            .get_mut(&record.name)
            .ok_or_else(|| EtherealError::NotFound(format!("record {}", record.name)))?;
        if status.resurrections.is_some() {
            stored.status.resurrections = status.resurrections;
        }
        stored.resource_version = Some(version);
        Ok(stored.clone())
    }
}

/// One call observed by [`MockInstances`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceCall {
    Get(String),
    Create { name: String, image: String },
    Delete(String),
}

impl InstanceCall {
    pub fn is_mutating(&self) -> bool {
        !matches!(self, InstanceCall::Get(_))
    }
}

#[derive(Default)]
struct InstanceState {
    instances: BTreeMap<String, ManagedInstance>,
    calls: Vec<InstanceCall>,
    fail_get: HashMap<String, EtherealError>,
    fail_create: HashMap<String, EtherealError>,
    fail_delete: HashMap<String, EtherealError>,
}

/// Instance namespace held in memory.
#[derive(Default)]
pub struct MockInstances {
    state: Mutex<InstanceState>,
}

impl MockInstances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place an instance as if created by someone else; no call is recorded.
    pub fn seed(&self, name: &str, image: &str) {
        lock(&self.state).instances.insert(
            name.to_string(),
            ManagedInstance { name: name.to_string(), image: Some(image.to_string()), phase: Some("Running".into()) },
        );
    }

    /// Remove an instance out-of-band (crash, eviction, manual delete).
    pub fn vanish(&self, name: &str) {
        lock(&self.state).instances.remove(name);
    }

    pub fn instance(&self, name: &str) -> Option<ManagedInstance> {
        lock(&self.state).instances.get(name).cloned()
    }

    pub fn fail_get(&self, name: &str, err: EtherealError) {
        lock(&self.state).fail_get.insert(name.to_string(), err);
    }

    pub fn fail_create(&self, name: &str, err: EtherealError) {
        lock(&self.state).fail_create.insert(name.to_string(), err);
    }

    pub fn fail_delete(&self, name: &str, err: EtherealError) {
        lock(&self.state).fail_delete.insert(name.to_string(), err);
    }

    pub fn clear_failures(&self) {
        let mut st = lock(&self.state);
        st.fail_get.clear();
        st.fail_create.clear();
        st.fail_delete.clear();
    }

    pub fn calls(&self) -> Vec<InstanceCall> {
        lock(&self.state).calls.clone()
    }

    pub fn mutating_calls(&self) -> Vec<InstanceCall> {
        self.calls().into_iter().filter(InstanceCall::is_mutating).collect()
    }

    pub fn reset_calls(&self) {
        lock(&self.state).calls.clear();
    }
}

#[async_trait]
impl InstanceController for MockInstances {
    async fn get(&self, name: &str) -> EtherealResult<Option<ManagedInstance>> {
        let mut st = lock(&self.state);
        st.calls.push(InstanceCall::Get(name.to_string()));
        if let Some(e) = st.fail_get.get(name).cloned() {
            return Err(e);
        }
        Ok(st.instances.get(name).cloned())
    }

    async fn create(&self, name: &str, image: &str) -> EtherealResult<CreateOutcome> {
        let mut st = lock(&self.state);
        st.calls.push(InstanceCall::Create { name: name.to_string(), image: image.to_string() });
        if let Some(e) = st.fail_create.get(name).cloned() {
            return Err(e);
        }
        if st.instances.contains_key(name) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        st.instances.insert(
            name.to_string(),
            ManagedInstance { name: name.to_string(), image: Some(image.to_string()), phase: Some("Pending".into()) },
        );
        Ok(CreateOutcome::Created)
    }

    async fn delete(&self, name: &str) -> EtherealResult<DeleteOutcome> {
        let mut st = lock(&self.state);
        st.calls.push(InstanceCall::Delete(name.to_string()));
        if let Some(e) = st.fail_delete.get(name).cloned() {
            return Err(e);
        }
        match st.instances.remove(name) {
            Some(_) => Ok(DeleteOutcome::Deleted),
            None => Ok(DeleteOutcome::AlreadyGone),
        }
    }
}
