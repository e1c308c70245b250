//! Deploy configuration.
//!
//! `takeoff.yml` is deserialized into [`RawConfig`] as-is, then validated into
//! a [`DeployConfig`] before any cluster call is made. Validation fails fast on
//! the first invalid or missing field.

use std::{
	collections::BTreeMap,
	fs,
	net::{AddrParseError, IpAddr},
	path::{Path, PathBuf},
};

use bon::bon;
use serde::Deserialize;
use thiserror::Error;

use crate::context::{Environment, UnknownEnvironment};

/// The name of the config file takeoff reads by default
pub const CONFIG_FILE_NAME: &str = "takeoff.yml";

/// Placeholder substituted with the environment tag in namespace names.
pub const ENV_PLACEHOLDER: &str = "{env}";

/// Errors raised while loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read config file: {}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse config file: {}", path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_yaml::Error,
	},

	#[error("missing required field `{0}`")]
	Missing(&'static str),

	#[error("field `{0}` must not be empty")]
	Empty(&'static str),

	#[error("kubernetes_naming `{0}` must contain the `{{env}}` placeholder")]
	NamingWithoutPlaceholder(String),

	#[error("service_ips: {0}")]
	UnknownEnvironment(#[from] UnknownEnvironment),

	#[error("service_ips.{environment}: `{value}` is not an IP address")]
	InvalidServiceIp {
		environment: Environment,
		value: String,
		#[source]
		source: AddrParseError,
	},
}

/// `takeoff.yml` as written on disk.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
	pub application_name: Option<String>,
	pub registry: Option<String>,
	pub kubernetes_naming: Option<String>,
	pub deployment_config_path: Option<PathBuf>,
	pub service_config_path: Option<PathBuf>,
	#[serde(default)]
	pub service_ips: BTreeMap<String, String>,
	#[serde(default)]
	pub application_secrets: bool,
	pub vault_path: Option<PathBuf>,
	pub kubeconfig_path: Option<PathBuf>,
}

impl RawConfig {
	/// Load config from a specific file path
	pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
		let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})
	}
}

/// Namespace naming pattern, e.g. `app-{env}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingTemplate(String);

impl NamingTemplate {
	pub fn parse(pattern: &str) -> Result<Self, ConfigError> {
		if !pattern.contains(ENV_PLACEHOLDER) {
			return Err(ConfigError::NamingWithoutPlaceholder(pattern.to_string()));
		}
		Ok(Self(pattern.to_string()))
	}

	/// Substitute every placeholder with the tag of `environment`.
	pub fn render(&self, environment: Environment) -> String {
		self.0.replace(ENV_PLACEHOLDER, environment.tag())
	}
}

impl Default for NamingTemplate {
	fn default() -> Self {
		Self(ENV_PLACEHOLDER.to_string())
	}
}

/// Validated deploy configuration.
#[derive(Debug, Clone)]
pub struct DeployConfig {
	application_name: String,
	registry: String,
	kubernetes_naming: NamingTemplate,
	deployment_config_path: PathBuf,
	service_config_path: PathBuf,
	service_ips: BTreeMap<Environment, IpAddr>,
	application_secrets: bool,
	vault_path: PathBuf,
	kubeconfig_path: Option<PathBuf>,
}

#[bon]
impl DeployConfig {
	#[builder]
	pub fn new(
		#[builder(into)] application_name: String,
		#[builder(into)] registry: String,
		#[builder(into)] kubernetes_naming: Option<String>,
		#[builder(into)] deployment_config_path: PathBuf,
		#[builder(into)] service_config_path: PathBuf,
		#[builder(into)] vault_path: PathBuf,
		#[builder(into)] kubeconfig_path: Option<PathBuf>,
		#[builder(default)] service_ips: BTreeMap<String, String>,
		#[builder(default)] application_secrets: bool,
	) -> Result<Self, ConfigError> {
		if application_name.trim().is_empty() {
			return Err(ConfigError::Empty("application_name"));
		}
		if registry.trim().is_empty() {
			return Err(ConfigError::Empty("registry"));
		}

		let kubernetes_naming = match kubernetes_naming {
			Some(pattern) => NamingTemplate::parse(&pattern)?,
			None => NamingTemplate::default(),
		};

		let service_ips = service_ips
			.into_iter()
			.map(|(environment, value)| -> Result<(Environment, IpAddr), ConfigError> {
				let environment: Environment = environment.parse()?;
				let ip = value
					.parse()
					.map_err(|source| ConfigError::InvalidServiceIp {
						environment,
						value,
						source,
					})?;
				Ok((environment, ip))
			})
			.collect::<Result<_, _>>()?;

		Ok(Self {
			application_name,
			registry,
			kubernetes_naming,
			deployment_config_path,
			service_config_path,
			service_ips,
			application_secrets,
			vault_path,
			kubeconfig_path,
		})
	}

	/// Validate a config file, reporting the first missing required field.
	pub fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
		DeployConfig::builder()
			.application_name(
				raw.application_name
					.ok_or(ConfigError::Missing("application_name"))?,
			)
			.registry(raw.registry.ok_or(ConfigError::Missing("registry"))?)
			.maybe_kubernetes_naming(raw.kubernetes_naming)
			.deployment_config_path(
				raw.deployment_config_path
					.ok_or(ConfigError::Missing("deployment_config_path"))?,
			)
			.service_config_path(
				raw.service_config_path
					.ok_or(ConfigError::Missing("service_config_path"))?,
			)
			.vault_path(raw.vault_path.ok_or(ConfigError::Missing("vault_path"))?)
			.maybe_kubeconfig_path(raw.kubeconfig_path)
			.service_ips(raw.service_ips)
			.application_secrets(raw.application_secrets)
			.build()
	}

	/// Load and validate a config file.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		Self::from_raw(RawConfig::load_from_file(path)?)
	}

	pub fn application_name(&self) -> &str {
		&self.application_name
	}

	/// Container registry host images are pulled from.
	pub fn registry(&self) -> &str {
		&self.registry
	}

	/// Namespace all resources of `environment` are reconciled into.
	pub fn namespace(&self, environment: Environment) -> String {
		self.kubernetes_naming.render(environment)
	}

	pub fn deployment_config_path(&self) -> &Path {
		&self.deployment_config_path
	}

	pub fn service_config_path(&self) -> &Path {
		&self.service_config_path
	}

	pub fn service_ip(&self, environment: Environment) -> Option<IpAddr> {
		self.service_ips.get(&environment).copied()
	}

	/// Whether the application's own vault secrets are published as a secret.
	pub fn application_secrets(&self) -> bool {
		self.application_secrets
	}

	pub fn vault_path(&self) -> &Path {
		&self.vault_path
	}

	/// File holding cluster credentials to install as the local kubeconfig.
	pub fn kubeconfig_path(&self) -> Option<&Path> {
		self.kubeconfig_path.as_deref()
	}
}
