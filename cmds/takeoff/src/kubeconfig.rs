//! Materializing cluster credentials as the local kubeconfig.

use std::{
	fs::{self, File},
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum KubeconfigError {
	#[error("cluster credentials contain no kubeconfig")]
	NoKubeconfig,

	#[error("kubeconfig is not valid UTF-8")]
	NotUtf8(#[source] std::str::Utf8Error),

	#[error("creating {}", path.display())]
	CreateDir {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("writing {}", path.display())]
	Write {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("reading cluster credentials from {}", path.display())]
	ReadCredentials {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

/// A single credential payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialValue {
	pub value: Vec<u8>,
}

/// Cluster credentials as returned by the cloud provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialResult {
	pub kubeconfigs: Vec<CredentialValue>,
}

/// Source of cluster credentials.
pub trait ClusterCredentialSource {
	fn cluster_credentials(&self) -> Result<CredentialResult, KubeconfigError>;
}

/// Credentials stored as a kubeconfig file, e.g. mounted by the pipeline.
#[derive(Debug, Clone)]
pub struct FileClusterCredentials {
	path: PathBuf,
}

impl FileClusterCredentials {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}
}

impl ClusterCredentialSource for FileClusterCredentials {
	fn cluster_credentials(&self) -> Result<CredentialResult, KubeconfigError> {
		let value = fs::read(&self.path).map_err(|source| KubeconfigError::ReadCredentials {
			path: self.path.clone(),
			source,
		})?;
		Ok(CredentialResult {
			kubeconfigs: vec![CredentialValue { value }],
		})
	}
}

/// Path of the kubeconfig under `home`.
pub fn kube_config_path(home: &Path) -> PathBuf {
	home.join(".kube").join("config")
}

/// Write the first kubeconfig in `credentials` to `{home}/.kube/config`.
///
/// `{home}/.kube` is created when missing; an existing config file is
/// overwritten. Returns the path written.
#[instrument(skip(credentials))]
pub fn write_kube_config(
	credentials: &CredentialResult,
	home: &Path,
) -> Result<PathBuf, KubeconfigError> {
	let payload = credentials
		.kubeconfigs
		.first()
		.ok_or(KubeconfigError::NoKubeconfig)?;
	let content = std::str::from_utf8(&payload.value).map_err(KubeconfigError::NotUtf8)?;

	let kube_dir = home.join(".kube");
	match fs::create_dir(&kube_dir) {
		Err(e) if e.kind() != ErrorKind::AlreadyExists => {
			return Err(KubeconfigError::CreateDir {
				path: kube_dir,
				source: e,
			});
		}
		_ => {}
	}

	let path = kube_config_path(home);
	let write_error = |source: std::io::Error| KubeconfigError::Write {
		path: path.clone(),
		source,
	};
	let mut file = File::create(&path).map_err(write_error)?;
	file.write_all(content.as_bytes()).map_err(write_error)?;

	debug!(path = %path.display(), "wrote kubeconfig");
	Ok(path)
}
