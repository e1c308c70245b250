//! Kubernetes resource reconciliation.
//!
//! Every resource is reconciled with create-or-patch semantics: the live
//! listing decides whether the desired body is created or patched over the
//! existing object. Nothing is diffed field by field.

pub mod api;
pub mod bodies;
pub mod client;
pub mod compose;
pub mod locator;
pub mod upsert;

use std::fmt;

use k8s_openapi::api::{
	apps::v1::Deployment,
	core::v1::{Namespace, Secret, Service},
};
use kube::discovery::ApiResource;

/// Kubernetes API resource scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceScope {
	/// Resource is namespaced (e.g., Deployment, Secret).
	Namespaced,

	/// Resource is cluster-wide (e.g., Namespace).
	ClusterWide,
}

/// Resource kinds a deploy run reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
	Namespace,
	Secret,
	Service,
	Deployment,
}

impl ResourceKind {
	pub fn scope(self) -> ResourceScope {
		match self {
			ResourceKind::Namespace => ResourceScope::ClusterWide,
			ResourceKind::Secret | ResourceKind::Service | ResourceKind::Deployment => {
				ResourceScope::Namespaced
			}
		}
	}

	/// API group, version and plural used to address this kind.
	pub fn api_resource(self) -> ApiResource {
		match self {
			ResourceKind::Namespace => ApiResource::erase::<Namespace>(&()),
			ResourceKind::Secret => ApiResource::erase::<Secret>(&()),
			ResourceKind::Service => ApiResource::erase::<Service>(&()),
			ResourceKind::Deployment => ApiResource::erase::<Deployment>(&()),
		}
	}
}

impl fmt::Display for ResourceKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ResourceKind::Namespace => write!(f, "namespace"),
			ResourceKind::Secret => write!(f, "secret"),
			ResourceKind::Service => write!(f, "service"),
			ResourceKind::Deployment => write!(f, "deployment"),
		}
	}
}

/// The (kind, name, namespace) triple a single upsert targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceIdentity {
	pub kind: ResourceKind,
	pub name: String,
	/// `None` for cluster-wide kinds.
	pub namespace: Option<String>,
}

impl ResourceIdentity {
	pub fn namespaced(
		kind: ResourceKind,
		name: impl Into<String>,
		namespace: impl Into<String>,
	) -> Self {
		Self {
			kind,
			name: name.into(),
			namespace: Some(namespace.into()),
		}
	}

	pub fn namespace(name: impl Into<String>) -> Self {
		Self {
			kind: ResourceKind::Namespace,
			name: name.into(),
			namespace: None,
		}
	}
}

impl fmt::Display for ResourceIdentity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.namespace {
			Some(namespace) => write!(f, "{}/{}/{}", self.kind, namespace, self.name),
			None => write!(f, "{}/{}", self.kind, self.name),
		}
	}
}
