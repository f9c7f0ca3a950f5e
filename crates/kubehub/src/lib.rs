//! Ethereal kubehub: client wiring and the kube-backed collaborators.

#![forbid(unsafe_code)]

pub mod crd;
pub mod pods;
pub mod store;

use ethereal_core::{EtherealError, EtherealResult, OperatorConfig};
use kube::Client;
use tracing::info;

pub use crd::{EtherealPod, EtherealPodSpec, EtherealPodStatus};
pub use pods::KubePodController;
pub use store::KubeStateStore;

/// Field manager used for every write.
pub const FIELD_MANAGER: &str = "ethereal-operator";

/// Build a client from kubeconfig / in-cluster env and check the API server answers.
pub async fn get_kube_client() -> EtherealResult<Client> {
    let client = Client::try_default()
        .await
        .map_err(|e| EtherealError::FatalConfig(format!("building kube client: {}", e)))?;
    let version = client
        .apiserver_version()
        .await
        .map_err(|e| EtherealError::FatalConfig(format!("contacting API server: {}", e)))?;
    info!(server = %version.git_version, "connected to API server");
    Ok(client)
}

/// Store and controller scoped to the configured namespace.
pub async fn connect(cfg: &OperatorConfig) -> EtherealResult<(KubeStateStore, KubePodController)> {
    let client = get_kube_client().await?;
    let store = KubeStateStore::new(client.clone(), &cfg.namespace);
    let pods = KubePodController::new(client, &cfg.namespace, cfg.template.clone());
    Ok((store, pods))
}

/// Map a kube error onto the reconcile taxonomy.
pub fn classify(err: kube::Error) -> EtherealError {
    match err {
        kube::Error::Api(ae) => match ae.code {
            404 => EtherealError::NotFound(ae.message),
            409 => EtherealError::Conflict(ae.message),
            _ => EtherealError::Transient(format!("{} ({}): {}", ae.reason, ae.code, ae.message)),
        },
        other => EtherealError::Transient(other.to_string()),
    }
}

/// True for the 409 a create gets when the name is taken.
pub(crate) fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists")
}

#[cfg(test)]
pub(crate) fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".into(),
        message: format!("{} happened", reason),
        reason: reason.into(),
        code,
    })
}
