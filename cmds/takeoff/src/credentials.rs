//! Credential lookups: vault secrets and container registry logins.
//!
//! The vault itself lives outside this crate. [`SecretSource`] is the seam a
//! vault client plugs into; [`FileSecretSource`] serves the same data from a
//! local YAML file, laid out as `{environment: {scope: {key: value}}}`.

use std::{
	collections::BTreeMap,
	fmt, fs,
	path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::debug;

use crate::{config::DeployConfig, context::Environment};

/// Vault scope holding credentials shared by every application.
pub const COMMON_SCOPE: &str = "common";

/// Errors raised while resolving credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
	#[error("could not find required key `{0}`")]
	MissingKey(String),

	#[error("secret `{0}` is not valid UTF-8")]
	NotUtf8(String),

	#[error("failed to read secrets file: {}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse secrets file: {}", path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_yaml::Error,
	},
}

/// A key/value pair fetched from the vault.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
	pub key: String,
	pub value: Vec<u8>,
}

impl Secret {
	pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
		Self {
			key: key.into(),
			value: value.into(),
		}
	}

	fn text(&self) -> Result<&str, CredentialError> {
		std::str::from_utf8(&self.value).map_err(|_| CredentialError::NotUtf8(self.key.clone()))
	}
}

impl fmt::Debug for Secret {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Secret")
			.field("key", &self.key)
			.finish_non_exhaustive()
	}
}

/// Source of vault secrets for an environment.
pub trait SecretSource {
	/// Fetch every secret stored under `scope` for `environment`.
	fn secrets(&self, environment: Environment, scope: &str)
		-> Result<Vec<Secret>, CredentialError>;
}

/// [`SecretSource`] reading a YAML file.
#[derive(Debug, Clone)]
pub struct FileSecretSource {
	path: PathBuf,
}

type SecretsFile = BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>;

impl FileSecretSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

impl SecretSource for FileSecretSource {
	fn secrets(
		&self,
		environment: Environment,
		scope: &str,
	) -> Result<Vec<Secret>, CredentialError> {
		let content = fs::read_to_string(&self.path).map_err(|source| CredentialError::Read {
			path: self.path.clone(),
			source,
		})?;
		let mut file: SecretsFile =
			serde_yaml::from_str(&content).map_err(|source| CredentialError::Parse {
				path: self.path.clone(),
				source,
			})?;

		let secrets: Vec<_> = file
			.remove(environment.tag())
			.and_then(|mut scopes| scopes.remove(scope))
			.unwrap_or_default()
			.into_iter()
			.map(|(key, value)| Secret::new(key, value))
			.collect();

		debug!(%environment, scope, count = secrets.len(), "loaded secrets");
		Ok(secrets)
	}
}

/// Shared credentials a deploy may require from the `common` scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CommonCredential {
	RegistryUsername,
	RegistryPassword,
}

impl CommonCredential {
	/// Key of this credential in the vault.
	pub fn key(self) -> &'static str {
		match self {
			CommonCredential::RegistryUsername => "registry_username",
			CommonCredential::RegistryPassword => "registry_password",
		}
	}
}

/// Pick `key` out of a vault response, failing when it is absent.
pub fn find_secret<'a>(key: &str, secrets: &'a [Secret]) -> Result<&'a Secret, CredentialError> {
	secrets
		.iter()
		.rev()
		.find(|secret| secret.key == key)
		.ok_or_else(|| CredentialError::MissingKey(key.to_string()))
}

/// Fetch the `common` scope and require every credential in `required`.
pub fn common_credentials<S: SecretSource>(
	source: &S,
	environment: Environment,
	required: &[CommonCredential],
) -> Result<BTreeMap<CommonCredential, Secret>, CredentialError> {
	let secrets = source.secrets(environment, COMMON_SCOPE)?;
	required
		.iter()
		.map(|credential| Ok((*credential, find_secret(credential.key(), &secrets)?.clone())))
		.collect()
}

/// Login for a container registry.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
	pub registry: String,
	pub username: String,
	pub password: String,
}

impl fmt::Debug for RegistryCredentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RegistryCredentials")
			.field("registry", &self.registry)
			.field("username", &self.username)
			.finish_non_exhaustive()
	}
}

/// Source of the registry login for a deploy.
pub trait RegistryCredentialSource {
	fn credentials(
		&self,
		config: &DeployConfig,
		environment: Environment,
	) -> Result<RegistryCredentials, CredentialError>;
}

/// Registry login built from the configured registry host and the vault's
/// common `registry_username` / `registry_password`.
pub struct VaultRegistryCredentials<'a, S> {
	vault: &'a S,
}

impl<'a, S: SecretSource> VaultRegistryCredentials<'a, S> {
	pub fn new(vault: &'a S) -> Self {
		Self { vault }
	}
}

impl<S: SecretSource> RegistryCredentialSource for VaultRegistryCredentials<'_, S> {
	fn credentials(
		&self,
		config: &DeployConfig,
		environment: Environment,
	) -> Result<RegistryCredentials, CredentialError> {
		let common = common_credentials(
			self.vault,
			environment,
			&[
				CommonCredential::RegistryUsername,
				CommonCredential::RegistryPassword,
			],
		)?;

		Ok(RegistryCredentials {
			registry: config.registry().to_string(),
			username: common[&CommonCredential::RegistryUsername].text()?.to_string(),
			password: common[&CommonCredential::RegistryPassword].text()?.to_string(),
		})
	}
}
