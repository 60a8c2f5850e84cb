//! Built-in provider targets and their storage profiles.
//!
//! [`provider_for`] is the single place a [`ProviderKind`] is turned into
//! behaviour; everything downstream asks the resulting [`Provider`].

mod claim;
mod digitalocean;
mod eks;
mod gke;
mod k3d;
mod volume;

use std::sync::Arc;

use tracing::debug;

use kubegen_core::domain::{DomainResult, Provider, ProviderKind};

pub use claim::BasicClaimProfile;
pub use digitalocean::DigitalOceanTarget;
pub use eks::EksTarget;
pub use gke::GkeTarget;
pub use k3d::K3dTarget;
pub use volume::{
    AwsElasticBlockStoreProfile, DigitalOceanCsiProfile, GcePersistentDiskProfile,
    HostPathProfile,
};

/// A provider for `kind` with its default profiles registered.
pub fn provider_for(kind: ProviderKind) -> DomainResult<Arc<Provider>> {
    provider_with_cluster(kind, None)
}

/// Like [`provider_for`]; `cluster_name` names the local cluster in setup
/// hints for targets that print one.
pub fn provider_with_cluster(
    kind: ProviderKind,
    cluster_name: Option<&str>,
) -> DomainResult<Arc<Provider>> {
    debug!(provider = %kind, "Selecting provider target");
    match kind {
        ProviderKind::K3d => Provider::for_target(
            cluster_name.map(K3dTarget::new).unwrap_or_default(),
        ),
        ProviderKind::GoogleGke => Provider::for_target(GkeTarget),
        ProviderKind::AmazonEks => Provider::for_target(EksTarget),
        ProviderKind::DigitalOceanKubernetes => Provider::for_target(DigitalOceanTarget),
    }
}
