//! Integration tests for a full deploy run against the HTTP mock server.

use std::{fs, path::Path};

use assert_matches::assert_matches;
use indoc::indoc;
use k8s_mock::{HttpMockK8sServer, InjectedFailure, RunningHttpMockK8sServer};
use k8s_openapi::apimachinery::pkg::version::Info;
use serde_json::json;
use takeoff::{
	commands::deploy::{deploy_application, DeployError},
	config::DeployConfig,
	context::{ApplicationVersion, Environment, RunContext},
	credentials::{CredentialError, FileSecretSource, VaultRegistryCredentials},
	k8s::{
		api::KubeResourceApi,
		client::ClusterConnection,
		upsert::{UpsertEngine, UpsertError, UpsertOutcome},
		ResourceKind,
	},
	kubeconfig::{write_kube_config, CredentialResult, CredentialValue},
};
use tempfile::TempDir;

/// Write templates and a vault file, returning the validated config.
fn project(dir: &Path, application_secrets: bool) -> DeployConfig {
	fs::write(
		dir.join("deployment.yaml.tmpl"),
		indoc! {r#"
			apiVersion: apps/v1
			kind: Deployment
			metadata:
			  name: {{ .application_name }}
			  labels:
			    version: "{{ .version }}"
			spec:
			  template:
			    spec:
			      containers:
			        - name: {{ .application_name }}
			          image: "{{ .image }}"
			      imagePullSecrets:
			        - name: acr-auth
		"#},
	)
	.unwrap();
	fs::write(
		dir.join("service.yaml.tmpl"),
		indoc! {r#"
			apiVersion: v1
			kind: Service
			metadata:
			  name: {{ .application_name }}-service
			spec:
			  loadBalancerIP: "{{ .service_ip }}"
		"#},
	)
	.unwrap();
	fs::write(
		dir.join("secrets.yml"),
		indoc! {"
			dev:
			  common:
			    registry_username: my-username
			    registry_password: my-password
			  my-app:
			    jack: the-ripper
		"},
	)
	.unwrap();

	DeployConfig::builder()
		.application_name("my-app")
		.registry("my-registry")
		.kubernetes_naming("apps-{env}")
		.deployment_config_path(dir.join("deployment.yaml.tmpl"))
		.service_config_path(dir.join("service.yaml.tmpl"))
		.vault_path(dir.join("secrets.yml"))
		.service_ips([("dev".to_string(), "10.0.0.42".to_string())].into())
		.application_secrets(application_secrets)
		.build()
		.unwrap()
}

fn ctx(version: &str) -> RunContext {
	RunContext::builder()
		.application_name("my-app")
		.build_id("42")
		.version(ApplicationVersion::new(Environment::Dev, version, "main"))
		.build()
}

async fn engine(server: &RunningHttpMockK8sServer) -> UpsertEngine<KubeResourceApi> {
	let connection = ClusterConnection::from_kubeconfig(server.kubeconfig(), None)
		.await
		.expect("failed to create connection");
	UpsertEngine::new(KubeResourceApi::new(connection.client().clone()))
}

async fn mutations(server: &RunningHttpMockK8sServer) -> Vec<(String, String)> {
	server
		.received_requests()
		.await
		.into_iter()
		.filter(|req| req.method != "GET")
		.map(|req| (req.method, req.path))
		.collect()
}

fn request(method: &str, path: &str) -> (String, String) {
	(method.to_string(), path.to_string())
}

#[tokio::test]
async fn test_first_deploy_creates_resources_in_order() {
	let dir = TempDir::new().unwrap();
	let config = project(dir.path(), true);
	let server = HttpMockK8sServer::builder().build().start().await;
	let vault = FileSecretSource::new(config.vault_path());

	let report = deploy_application(
		&ctx("1.0.0"),
		&config,
		&vault,
		&VaultRegistryCredentials::new(&vault),
		&engine(&server).await,
	)
	.await
	.unwrap();

	assert!(report
		.reconciled
		.iter()
		.all(|r| r.outcome == UpsertOutcome::Created));
	assert_eq!(
		mutations(&server).await,
		vec![
			request("POST", "/api/v1/namespaces"),
			request("POST", "/api/v1/namespaces/apps-dev/secrets"),
			request("POST", "/api/v1/namespaces/apps-dev/secrets"),
			request("POST", "/apis/apps/v1/namespaces/apps-dev/deployments"),
			request("POST", "/api/v1/namespaces/apps-dev/services"),
		]
	);

	let secret = server
		.resource("/api/v1/namespaces/apps-dev/secrets", "my-app-secret")
		.unwrap();
	assert_eq!(secret["type"], json!("Opaque"));
	assert_eq!(secret["data"], json!({ "jack": "dGhlLXJpcHBlcg==" }));

	let registry = server
		.resource("/api/v1/namespaces/apps-dev/secrets", "acr-auth")
		.unwrap();
	assert_eq!(registry["type"], json!("kubernetes.io/dockerconfigjson"));

	let deployment = server
		.resource("/apis/apps/v1/namespaces/apps-dev/deployments", "my-app")
		.unwrap();
	assert_eq!(
		deployment.pointer("/spec/template/spec/containers/0/image"),
		Some(&json!("my-registry/my-app:1.0.0"))
	);

	let service = server
		.resource("/api/v1/namespaces/apps-dev/services", "my-app-service")
		.unwrap();
	assert_eq!(service["spec"]["loadBalancerIP"], json!("10.0.0.42"));
}

#[tokio::test]
async fn test_second_deploy_patches_everything() {
	let dir = TempDir::new().unwrap();
	let config = project(dir.path(), true);
	let server = HttpMockK8sServer::builder().build().start().await;
	let vault = FileSecretSource::new(config.vault_path());
	let registry = VaultRegistryCredentials::new(&vault);
	let engine = engine(&server).await;

	deploy_application(&ctx("1.0.0"), &config, &vault, &registry, &engine)
		.await
		.unwrap();
	let report = deploy_application(&ctx("1.1.0"), &config, &vault, &registry, &engine)
		.await
		.unwrap();

	let outcomes: Vec<_> = report
		.reconciled
		.iter()
		.map(|r| (r.identity.kind, r.outcome))
		.collect();
	assert_eq!(
		outcomes,
		vec![
			(ResourceKind::Namespace, UpsertOutcome::AlreadyExists),
			(ResourceKind::Secret, UpsertOutcome::Patched),
			(ResourceKind::Secret, UpsertOutcome::Patched),
			(ResourceKind::Deployment, UpsertOutcome::Patched),
			(ResourceKind::Service, UpsertOutcome::Patched),
		]
	);
	assert_eq!(server.count_method("POST").await, 5);
	assert_eq!(server.count_method("PATCH").await, 4);

	let deployment = server
		.resource("/apis/apps/v1/namespaces/apps-dev/deployments", "my-app")
		.unwrap();
	assert_eq!(deployment["metadata"]["labels"]["version"], json!("1.1.0"));
}

#[tokio::test]
async fn test_deploy_without_application_secrets() {
	let dir = TempDir::new().unwrap();
	let config = project(dir.path(), false);
	let server = HttpMockK8sServer::builder().build().start().await;
	let vault = FileSecretSource::new(config.vault_path());

	deploy_application(
		&ctx("1.0.0"),
		&config,
		&vault,
		&VaultRegistryCredentials::new(&vault),
		&engine(&server).await,
	)
	.await
	.unwrap();

	assert_eq!(
		server
			.count("POST", "/api/v1/namespaces/apps-dev/secrets")
			.await,
		1
	);
	assert!(server
		.resource("/api/v1/namespaces/apps-dev/secrets", "my-app-secret")
		.is_none());
}

#[tokio::test]
async fn test_failed_deployment_aborts_before_service() {
	let dir = TempDir::new().unwrap();
	let config = project(dir.path(), false);
	let server = HttpMockK8sServer::builder()
		.failures(vec![InjectedFailure::new(
			"POST",
			"/apis/apps/v1/namespaces/apps-dev/deployments",
		)])
		.build()
		.start()
		.await;
	let vault = FileSecretSource::new(config.vault_path());

	let result = deploy_application(
		&ctx("1.0.0"),
		&config,
		&vault,
		&VaultRegistryCredentials::new(&vault),
		&engine(&server).await,
	)
	.await;

	assert_matches!(
		result,
		Err(DeployError::Upsert(UpsertError::Create {
			kind: ResourceKind::Deployment,
			..
		}))
	);
	assert!(server
		.received_requests()
		.await
		.iter()
		.all(|req| !req.path.ends_with("/services")));
	assert!(server
		.resource("/api/v1/namespaces/apps-dev/secrets", "acr-auth")
		.is_some());
}

#[tokio::test]
async fn test_missing_registry_password_aborts_before_registry_secret() {
	let dir = TempDir::new().unwrap();
	let config = project(dir.path(), false);
	fs::write(
		config.vault_path(),
		indoc! {"
			dev:
			  common:
			    registry_username: my-username
		"},
	)
	.unwrap();
	let server = HttpMockK8sServer::builder().build().start().await;
	let vault = FileSecretSource::new(config.vault_path());

	let result = deploy_application(
		&ctx("1.0.0"),
		&config,
		&vault,
		&VaultRegistryCredentials::new(&vault),
		&engine(&server).await,
	)
	.await;

	assert_matches!(
		result,
		Err(DeployError::Credentials(CredentialError::MissingKey(key))) if key == "registry_password"
	);
	assert_eq!(
		mutations(&server).await,
		vec![request("POST", "/api/v1/namespaces")]
	);
}

#[tokio::test]
async fn test_unnamed_service_is_created_under_fallback_name() {
	let dir = TempDir::new().unwrap();
	let config = project(dir.path(), false);
	fs::write(
		config.service_config_path(),
		indoc! {r#"
			apiVersion: v1
			kind: Service
			metadata:
			  labels:
			    app: {{ .application_name }}
			spec:
			  loadBalancerIP: "{{ .service_ip }}"
		"#},
	)
	.unwrap();
	let server = HttpMockK8sServer::builder().build().start().await;
	let vault = FileSecretSource::new(config.vault_path());

	let report = deploy_application(
		&ctx("1.0.0"),
		&config,
		&vault,
		&VaultRegistryCredentials::new(&vault),
		&engine(&server).await,
	)
	.await
	.unwrap();

	let service = report.reconciled.last().unwrap();
	assert_eq!(service.identity.name, "my-app-service");
	assert_eq!(service.outcome, UpsertOutcome::Created);
	let stored = server
		.resource("/api/v1/namespaces/apps-dev/services", "my-app-service")
		.unwrap();
	assert_eq!(stored["metadata"]["labels"]["app"], json!("my-app"));
}

#[tokio::test]
async fn test_connect_through_written_kubeconfig() {
	let server = HttpMockK8sServer::builder().build().start().await;
	let home = TempDir::new().unwrap();
	let kubeconfig = serde_yaml::to_string(&server.kubeconfig()).unwrap();
	let credentials = CredentialResult {
		kubeconfigs: vec![CredentialValue {
			value: kubeconfig.into_bytes(),
		}],
	};

	let path = write_kube_config(&credentials, home.path()).unwrap();
	let connection = ClusterConnection::from_path(&path, Some("mock-context".to_string()))
		.await
		.unwrap();

	assert_eq!(
		*connection.server_version(),
		Info {
			major: "1".to_string(),
			minor: "28".to_string(),
			git_version: "v1.28.0".to_string(),
			git_commit: "fake".to_string(),
			git_tree_state: "clean".to_string(),
			build_date: "2024-01-01T00:00:00Z".to_string(),
			go_version: "go1.21.0".to_string(),
			compiler: "gc".to_string(),
			platform: "linux/amd64".to_string(),
		}
	);
}
