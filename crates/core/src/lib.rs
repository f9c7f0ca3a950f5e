//! Ethereal core types: desired records, managed instances and the
//! collaborator traits the reconciler drives.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use config::{InstanceTemplate, OperatorConfig, ProbeSettings, StorageSettings};
pub use error::{EtherealError, EtherealResult};

/// Prefix joining a record name to the name of the instance it owns.
pub const INSTANCE_PREFIX: &str = "real-";
/// Label marking instances created by this operator.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "ethereal-operator";
/// Label carrying the owning record name on every managed instance.
pub const RECORD_LABEL: &str = "sunday.com/ethereal-pod";

/// Derive the managed instance name for a record.
pub fn instance_name(record_name: &str) -> String {
    format!("{}{}", INSTANCE_PREFIX, record_name)
}

/// Inverse of [`instance_name`]. `None` for names outside the managed scheme.
pub fn record_name(instance_name: &str) -> Option<&str> {
    instance_name.strip_prefix(INSTANCE_PREFIX).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordSpec {
    /// Payload image; `None` (or empty) means the operator default.
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordStatus {
    /// Number of corrective actions taken. Absent until first observed.
    pub resurrections: Option<u64>,
}

/// One declared workload, validated at the store boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DesiredRecord {
    pub name: String,
    /// Version token as of the last read; guards status writes.
    pub resource_version: Option<String>,
    pub spec: RecordSpec,
    #[serde(default)]
    pub status: RecordStatus,
}

impl DesiredRecord {
    pub fn new(name: impl Into<String>, image: Option<&str>) -> Self {
        Self {
            name: name.into(),
            resource_version: None,
            spec: RecordSpec { image: image.map(|s| s.to_string()) },
            status: RecordStatus::default(),
        }
    }

    pub fn instance_name(&self) -> String {
        instance_name(&self.name)
    }

    pub fn resurrections(&self) -> Option<u64> {
        self.status.resurrections
    }

    /// Image the instance should run, after defaulting.
    pub fn effective_image<'a>(&'a self, default_image: &'a str) -> &'a str {
        match self.spec.image.as_deref().map(str::trim) {
            Some(img) if !img.is_empty() => img,
            _ => default_image,
        }
    }
}

/// Observed runtime instance owned by a record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManagedInstance {
    pub name: String,
    /// Image of the primary container, if the instance has one.
    pub image: Option<String>,
    /// Control-plane phase (informational only).
    pub phase: Option<String>,
}

/// Result of looking up the instance for a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceLookup {
    Missing,
    Found(ManagedInstance),
    Failed(EtherealError),
}

impl From<EtherealResult<Option<ManagedInstance>>> for InstanceLookup {
    fn from(res: EtherealResult<Option<ManagedInstance>>) -> Self {
        match res {
            Ok(Some(inst)) => InstanceLookup::Found(inst),
            Ok(None) | Err(EtherealError::NotFound(_)) => InstanceLookup::Missing,
            Err(e) => InstanceLookup::Failed(e),
        }
    }
}

/// Corrective action decided for one record in one cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    NoOp,
    Create,
    /// Delete now; the next cycle observes absence and creates.
    Recreate,
}

impl ReconcileAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileAction::NoOp => "noop",
            ReconcileAction::Create => "create",
            ReconcileAction::Recreate => "recreate",
        }
    }

    pub fn is_corrective(&self) -> bool {
        !matches!(self, ReconcileAction::NoOp)
    }
}

impl std::fmt::Display for ReconcileAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// Someone else created it first; counts as success.
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyGone,
}

/// Read/write access to desired records and their status.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// List every record in the managed scope. An error here is distinct from an empty scope.
    async fn list(&self) -> EtherealResult<Vec<DesiredRecord>>;

    async fn get(&self, name: &str) -> EtherealResult<Option<DesiredRecord>>;

    /// Write `status` for `record`, failing with `Conflict` when the stored
    /// record no longer carries `record.resource_version`. Status fields this
    /// type does not know about are preserved.
    async fn patch_status(&self, record: &DesiredRecord, status: &RecordStatus) -> EtherealResult<DesiredRecord>;
}

/// Lifecycle of single managed instances, addressed by derived name.
#[async_trait]
pub trait InstanceController: Send + Sync {
    async fn get(&self, name: &str) -> EtherealResult<Option<ManagedInstance>>;
    async fn create(&self, name: &str, image: &str) -> EtherealResult<CreateOutcome>;
    async fn delete(&self, name: &str) -> EtherealResult<DeleteOutcome>;
}

pub mod prelude {
    pub use super::{
        instance_name, record_name, CreateOutcome, DeleteOutcome, DesiredRecord, EtherealError, EtherealResult,
        InstanceController, InstanceLookup, ManagedInstance, ReconcileAction, RecordSpec, RecordStatus, StateStore,
    };
}
