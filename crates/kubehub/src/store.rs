//! EtherealPod records backed by the API server.

use async_trait::async_trait;
use ethereal_core::{DesiredRecord, EtherealError, EtherealResult, RecordStatus, StateStore};
use kube::{
    api::{Api, ListParams, Patch, PatchParams},
    core::{ApiResource, DynamicObject},
    Client,
};
use metrics::counter;
use serde_json::{json, Map, Value as Json};
use tracing::{debug, warn};

use crate::{classify, EtherealPod, FIELD_MANAGER};

pub struct KubeStateStore {
    /// Untyped listing so one malformed record cannot fail the whole list.
    dynamic: Api<DynamicObject>,
    typed: Api<EtherealPod>,
    namespace: String,
}

impl KubeStateStore {
    pub fn new(client: Client, namespace: &str) -> Self {
        let ar = ApiResource::erase::<EtherealPod>(&());
        Self {
            dynamic: Api::namespaced_with(client.clone(), namespace, &ar),
            typed: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }
}

/// Validate one listed object into a typed record.
pub fn parse_record(obj: DynamicObject) -> EtherealResult<DesiredRecord> {
    let name = obj.metadata.name.clone().unwrap_or_else(|| "<unnamed>".to_string());
    let ep: EtherealPod = obj
        .try_parse()
        .map_err(|e| EtherealError::Invalid(format!("EtherealPod {}: {}", name, e)))?;
    DesiredRecord::try_from(ep)
}

/// Merge patch for the status subresource. The resourceVersion makes the
/// API server reject the write with 409 if the record moved since it was read;
/// status keys not named here are left untouched.
pub fn status_patch(resource_version: &str, status: &RecordStatus) -> Json {
    let mut fields = Map::new();
    if let Some(n) = status.resurrections {
        fields.insert("resurrections".into(), json!(n));
    }
    json!({
        "metadata": { "resourceVersion": resource_version },
        "status": Json::Object(fields),
    })
}

#[async_trait]
impl StateStore for KubeStateStore {
    async fn list(&self) -> EtherealResult<Vec<DesiredRecord>> {
        let list = self.dynamic.list(&ListParams::default()).await.map_err(classify)?;
        let mut out = Vec::with_capacity(list.items.len());
        for obj in list.items {
            match parse_record(obj) {
                Ok(r) => out.push(r),
                Err(e) => {
                    counter!("ethereal_records_rejected_total", 1u64);
                    warn!(ns = %self.namespace, error = %e, "skipping malformed record");
                }
            }
        }
        debug!(ns = %self.namespace, count = out.len(), "records listed");
        Ok(out)
    }

    async fn get(&self, name: &str) -> EtherealResult<Option<DesiredRecord>> {
        match self.typed.get_opt(name).await.map_err(classify)? {
            Some(ep) => Ok(Some(DesiredRecord::try_from(ep)?)),
            None => Ok(None),
        }
    }

    async fn patch_status(&self, record: &DesiredRecord, status: &RecordStatus) -> EtherealResult<DesiredRecord> {
        let rv = record
            .resource_version
            .as_deref()
            .ok_or_else(|| EtherealError::Invalid(format!("record {} has no resourceVersion", record.name)))?;
        let patch = status_patch(rv, status);
        let pp = PatchParams { field_manager: Some(FIELD_MANAGER.to_string()), ..Default::default() };
        let updated = self
            .typed
            .patch_status(&record.name, &pp, &Patch::Merge(&patch))
            .await
            .map_err(classify)?;
        DesiredRecord::try_from(updated)
    }
}
