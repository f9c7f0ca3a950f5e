//! EtherealPod custom resource and its mapping onto core records.

use ethereal_core::{DesiredRecord, EtherealError, EtherealResult, RecordSpec, RecordStatus};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "sunday.com",
    version = "v1",
    kind = "EtherealPod",
    plural = "etherealpods",
    shortname = "epod",
    namespaced,
    status = "EtherealPodStatus",
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#,
    printcolumn = r#"{"name":"Resurrections","type":"integer","jsonPath":".status.resurrections"}"#
)]
pub struct EtherealPodSpec {
    /// Payload image; the operator default applies when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct EtherealPodStatus {
    /// Corrective actions taken so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resurrections: Option<u64>,
}

impl TryFrom<EtherealPod> for DesiredRecord {
    type Error = EtherealError;

    fn try_from(ep: EtherealPod) -> EtherealResult<Self> {
        let name = ep.metadata.name.clone().filter(|n| !n.is_empty());
        let name = name.ok_or_else(|| EtherealError::Invalid("EtherealPod without metadata.name".into()))?;
        Ok(DesiredRecord {
            resource_version: ep.resource_version(),
            spec: RecordSpec { image: ep.spec.image },
            status: RecordStatus { resurrections: ep.status.and_then(|s| s.resurrections) },
            name,
        })
    }
}
