//! Managed pod lifecycle: the only place runtime instances are mutated.

use std::collections::BTreeMap;

use async_trait::async_trait;
use ethereal_core::{
    record_name, CreateOutcome, DeleteOutcome, EtherealError, EtherealResult, InstanceController, InstanceTemplate,
    ManagedInstance, MANAGED_BY_LABEL, MANAGED_BY_VALUE, RECORD_LABEL,
};
use k8s_openapi::api::core::v1::{
    Container, HTTPGetAction, HostPathVolumeSource, Pod, PodSpec, Probe, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::{apis::meta::v1::ObjectMeta, util::intstr::IntOrString};
use kube::{
    api::{Api, DeleteParams, PostParams},
    Client,
};
use tracing::{debug, info};

use crate::{classify, is_already_exists, FIELD_MANAGER};

pub struct KubePodController {
    api: Api<Pod>,
    template: InstanceTemplate,
}

impl KubePodController {
    pub fn new(client: Client, namespace: &str, template: InstanceTemplate) -> Self {
        Self { api: Api::namespaced(client, namespace), template }
    }
}

/// Reject names the naming rule did not produce.
fn owned_record(name: &str) -> EtherealResult<&str> {
    record_name(name).ok_or_else(|| EtherealError::Invalid(format!("{} is outside the managed naming scheme", name)))
}

/// Render the pod for a managed instance.
pub fn build_pod(name: &str, record: &str, image: &str, template: &InstanceTemplate) -> Pod {
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), template.app_label.clone());
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());
    labels.insert(RECORD_LABEL.to_string(), record.to_string());

    let probe = Probe {
        http_get: Some(HTTPGetAction {
            path: Some(template.probe.path.clone()),
            port: IntOrString::Int(template.probe.port),
            ..Default::default()
        }),
        initial_delay_seconds: Some(template.probe.initial_delay_secs),
        period_seconds: Some(template.probe.period_secs),
        ..Default::default()
    };

    let (volumes, mounts) = match &template.storage {
        Some(s) => (
            Some(vec![Volume {
                name: s.volume_name.clone(),
                host_path: Some(HostPathVolumeSource {
                    path: s.host_path.clone(),
                    type_: Some("DirectoryOrCreate".to_string()),
                }),
                ..Default::default()
            }]),
            Some(vec![VolumeMount {
                name: s.volume_name.clone(),
                mount_path: s.mount_path.clone(),
                ..Default::default()
            }]),
        ),
        None => (None, None),
    };

    Pod {
        metadata: ObjectMeta { name: Some(name.to_string()), labels: Some(labels), ..Default::default() },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: template.container_name.clone(),
                image: Some(image.to_string()),
                image_pull_policy: Some(template.image_pull_policy.clone()),
                liveness_probe: Some(probe),
                volume_mounts: mounts,
                ..Default::default()
            }],
            volumes,
            restart_policy: Some("Never".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Observed view of a pod: primary container image and phase.
pub fn instance_from(pod: &Pod) -> ManagedInstance {
    let image = pod
        .spec
        .as_ref()
        .and_then(|s| s.containers.first())
        .and_then(|c| c.image.clone());
    let phase = pod.status.as_ref().and_then(|s| s.phase.clone());
    ManagedInstance { name: pod.metadata.name.clone().unwrap_or_default(), image, phase }
}

/// A delete that finds nothing is as good as one that removed the pod.
pub fn delete_outcome<T>(res: Result<T, kube::Error>) -> EtherealResult<DeleteOutcome> {
    match res {
        Ok(_) => Ok(DeleteOutcome::Deleted),
        Err(e) => match classify(e) {
            EtherealError::NotFound(_) => Ok(DeleteOutcome::AlreadyGone),
            other => Err(other),
        },
    }
}

#[async_trait]
impl InstanceController for KubePodController {
    async fn get(&self, name: &str) -> EtherealResult<Option<ManagedInstance>> {
        let pod = self.api.get_opt(name).await.map_err(classify)?;
        Ok(pod.as_ref().map(instance_from))
    }

    async fn create(&self, name: &str, image: &str) -> EtherealResult<CreateOutcome> {
        let record = owned_record(name)?;
        let pod = build_pod(name, record, image, &self.template);
        let pp = PostParams { field_manager: Some(FIELD_MANAGER.to_string()), ..Default::default() };
        match self.api.create(&pp, &pod).await {
            Ok(_) => {
                info!(instance = %name, image = %image, "pod created");
                Ok(CreateOutcome::Created)
            }
            Err(e) if is_already_exists(&e) => {
                debug!(instance = %name, "pod already exists");
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(e) => Err(classify(e)),
        }
    }

    async fn delete(&self, name: &str) -> EtherealResult<DeleteOutcome> {
        owned_record(name)?;
        let outcome = delete_outcome(self.api.delete(name, &DeleteParams::default()).await)?;
        match outcome {
            DeleteOutcome::Deleted => info!(instance = %name, "pod deleted"),
            DeleteOutcome::AlreadyGone => debug!(instance = %name, "pod already gone"),
        }
        Ok(outcome)
    }
}
