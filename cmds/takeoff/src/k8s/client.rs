//! Kubernetes cluster connection management.

use std::{path::Path, time::Duration};

use k8s_openapi::apimachinery::pkg::version::Info;
use kube::{
	config::{KubeConfigOptions, Kubeconfig, KubeconfigError},
	Client, Config,
};
use thiserror::Error;
use tracing::instrument;

/// Default timeout for Kubernetes API requests.
const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ConnectionError {
	#[error("no context named `{0}` was found in the kubeconfig")]
	ContextNotFound(String),

	#[error(transparent)]
	Kubeconfig(#[from] KubeconfigError),

	#[error(transparent)]
	Kube(#[from] kube::Error),
}

/// A connection to the cluster resources are reconciled into.
#[derive(Clone)]
pub struct ClusterConnection {
	client: Client,
	server_version: Info,
}

impl std::fmt::Debug for ClusterConnection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ClusterConnection")
			.field("server_version", &self.server_version)
			.finish_non_exhaustive()
	}
}

impl ClusterConnection {
	/// Connect using `$KUBECONFIG` or `~/.kube/config`.
	#[instrument(skip_all)]
	pub async fn from_default(context: Option<String>) -> Result<Self, ConnectionError> {
		let kubeconfig = Kubeconfig::read()?;
		Self::from_kubeconfig(kubeconfig, context).await
	}

	/// Connect using the kubeconfig file at `path`.
	#[instrument(skip_all, fields(path = %path.display()))]
	pub async fn from_path(path: &Path, context: Option<String>) -> Result<Self, ConnectionError> {
		let kubeconfig = Kubeconfig::read_from(path)?;
		Self::from_kubeconfig(kubeconfig, context).await
	}

	/// Connect using `context` of `kubeconfig`, or its current context.
	#[instrument(skip_all)]
	pub async fn from_kubeconfig(
		kubeconfig: Kubeconfig,
		context: Option<String>,
	) -> Result<Self, ConnectionError> {
		if let Some(name) = &context {
			if !kubeconfig.contexts.iter().any(|c| &c.name == name) {
				return Err(ConnectionError::ContextNotFound(name.clone()));
			}
		}

		let mut config = Config::from_custom_kubeconfig(
			kubeconfig,
			&KubeConfigOptions {
				context,
				..Default::default()
			},
		)
		.await?;
		config.read_timeout = Some(DEFAULT_API_TIMEOUT);
		let client = Client::try_from(config)?;

		let server_version = client.apiserver_version().await?;
		tracing::debug!(version = %server_version.git_version, "connected to cluster");

		Ok(Self {
			client,
			server_version,
		})
	}

	pub fn client(&self) -> &Client {
		&self.client
	}

	pub fn server_version(&self) -> &Info {
		&self.server_version
	}
}
