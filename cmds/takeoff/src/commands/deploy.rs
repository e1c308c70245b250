//! Deploy command handler.
//!
//! Reconciles everything an application needs in its environment's namespace,
//! in a fixed order: namespace, application secrets, registry pull secret,
//! deployment, service. The first failure aborts the run; resources
//! reconciled before it stay in place.

use std::{
	fmt,
	io::Write,
	path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use crate::{
	config::{DeployConfig, CONFIG_FILE_NAME},
	context::{ApplicationVersion, Environment, RunContext},
	credentials::{
		CredentialError, FileSecretSource, RegistryCredentialSource, SecretSource,
		VaultRegistryCredentials,
	},
	k8s::{
		api::{KubeResourceApi, ResourceApi},
		bodies::{
			application_secret_name, build_registry_secret_body, build_secret_body,
			REGISTRY_SECRET_NAME,
		},
		client::ClusterConnection,
		compose::{ComposeError, Composer},
		upsert::{UpsertEngine, UpsertError, UpsertOutcome},
		ResourceIdentity, ResourceKind,
	},
	kubeconfig::{write_kube_config, ClusterCredentialSource, FileClusterCredentials},
};

#[derive(Args)]
pub struct DeployArgs {
	/// Path to the deploy configuration
	#[arg(long, default_value = CONFIG_FILE_NAME)]
	pub config: PathBuf,

	/// Environment to deploy to (dev, tst, acp, prd)
	#[arg(long)]
	pub env: Environment,

	/// Version of the application being deployed
	#[arg(long)]
	pub version: String,

	/// Branch the version was built from
	#[arg(long)]
	pub branch: String,

	/// Identifier of the pipeline build, exposed to templates
	#[arg(long)]
	pub build_id: Option<String>,

	/// Kubeconfig context to use instead of the current one
	#[arg(long)]
	pub context: Option<String>,

	/// Home directory the kubeconfig is installed under, needed only when
	/// `kubeconfig_path` is configured
	#[arg(long, env = "HOME")]
	pub home: Option<PathBuf>,
}

/// Errors that abort a deploy run.
#[derive(Debug, Error)]
pub enum DeployError {
	#[error(transparent)]
	Credentials(#[from] CredentialError),

	#[error(transparent)]
	Upsert(#[from] UpsertError),

	#[error(transparent)]
	Compose(#[from] ComposeError),

	#[error("encoding {kind} body")]
	Encode {
		kind: ResourceKind,
		#[source]
		source: serde_json::Error,
	},
}

/// One reconciled resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
	pub identity: ResourceIdentity,
	pub outcome: UpsertOutcome,
}

/// Resources reconciled by a deploy run, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployReport {
	pub reconciled: Vec<Reconciled>,
}

impl DeployReport {
	fn push(&mut self, identity: ResourceIdentity, outcome: UpsertOutcome) {
		info!(resource = %identity, %outcome, "reconciled");
		self.reconciled.push(Reconciled { identity, outcome });
	}
}

impl fmt::Display for DeployReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for Reconciled { identity, outcome } in &self.reconciled {
			writeln!(f, "{identity} {outcome}")?;
		}
		Ok(())
	}
}

fn encode<T: Serialize>(kind: ResourceKind, body: &T) -> Result<serde_json::Value, DeployError> {
	serde_json::to_value(body).map_err(|source| DeployError::Encode { kind, source })
}

/// Reconcile every resource of the application described by `ctx` and `config`.
#[instrument(skip_all, fields(
	application = %ctx.application_name(),
	environment = %ctx.environment(),
))]
pub async fn deploy_application<A, S, R>(
	ctx: &RunContext,
	config: &DeployConfig,
	vault: &S,
	registry: &R,
	engine: &UpsertEngine<A>,
) -> Result<DeployReport, DeployError>
where
	A: ResourceApi,
	S: SecretSource,
	R: RegistryCredentialSource,
{
	let composer = Composer::new(ctx, config);
	let namespace = composer.namespace().to_string();
	let mut report = DeployReport::default();

	// Broken templates must not leave a half-deployed namespace behind.
	let deployment = composer.render_deployment()?;
	let service = composer.render_service()?;

	let outcome = engine.ensure_namespace(&namespace).await?;
	report.push(ResourceIdentity::namespace(&namespace), outcome);

	if config.application_secrets() {
		let secrets = vault.secrets(ctx.environment(), ctx.application_name())?;
		let name = application_secret_name(ctx.application_name());
		let body = encode(
			ResourceKind::Secret,
			&build_secret_body(ctx.application_name(), &secrets),
		)?;
		let outcome = engine
			.upsert(ResourceKind::Secret, &name, &namespace, &body)
			.await?;
		report.push(
			ResourceIdentity::namespaced(ResourceKind::Secret, name, &namespace),
			outcome,
		);
	}

	let credentials = registry.credentials(config, ctx.environment())?;
	let registry_secret =
		build_registry_secret_body(&credentials).map_err(|source| DeployError::Encode {
			kind: ResourceKind::Secret,
			source,
		})?;
	let body = encode(ResourceKind::Secret, &registry_secret)?;
	let outcome = engine
		.upsert(ResourceKind::Secret, REGISTRY_SECRET_NAME, &namespace, &body)
		.await?;
	report.push(
		ResourceIdentity::namespaced(ResourceKind::Secret, REGISTRY_SECRET_NAME, &namespace),
		outcome,
	);

	let (identity, outcome) = composer.upsert_deployment(engine, deployment).await?;
	report.push(identity, outcome);

	let (identity, outcome) = composer.upsert_service(engine, service).await?;
	report.push(identity, outcome);

	Ok(report)
}

/// Install the configured cluster credentials as `{home}/.kube/config`.
fn install_kubeconfig(source: &Path, home: Option<&Path>) -> Result<PathBuf> {
	let home = home.context("--home or $HOME is required to install the kubeconfig")?;
	let credentials = FileClusterCredentials::new(source).cluster_credentials()?;
	Ok(write_kube_config(&credentials, home)?)
}

/// Run the deploy command.
pub fn run<W: Write>(args: DeployArgs, writer: W) -> Result<()> {
	let runtime = tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.context("creating tokio runtime")?;

	runtime.block_on(run_async(args, writer))
}

async fn run_async<W: Write>(args: DeployArgs, mut writer: W) -> Result<()> {
	let config = DeployConfig::load(&args.config)
		.with_context(|| format!("loading {}", args.config.display()))?;

	let ctx = RunContext::builder()
		.application_name(config.application_name())
		.maybe_build_id(args.build_id)
		.version(ApplicationVersion::new(args.env, args.version, args.branch))
		.build();

	let connection = match config.kubeconfig_path() {
		Some(path) => {
			let kubeconfig = install_kubeconfig(path, args.home.as_deref())?;
			ClusterConnection::from_path(&kubeconfig, args.context).await?
		}
		None => ClusterConnection::from_default(args.context).await?,
	};
	info!(
		version = %connection.server_version().git_version,
		"connected to cluster"
	);

	let vault = FileSecretSource::new(config.vault_path());
	let registry = VaultRegistryCredentials::new(&vault);
	let engine = UpsertEngine::new(KubeResourceApi::new(connection.client().clone()));

	let report = deploy_application(&ctx, &config, &vault, &registry, &engine)
		.await
		.with_context(|| format!("deploying {}", ctx.application_name()))?;

	write!(writer, "{report}")?;
	Ok(())
}
