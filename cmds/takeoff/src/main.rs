use anyhow::Result;
use clap::{Parser, Subcommand};
use takeoff::{commands, commands::util::BrokenPipeGuard, telemetry};

#[derive(Parser)]
#[command(name = "takeoff")]
#[command(about = "Deploy an application to its Kubernetes namespace", long_about = None)]
#[command(version = env!("TAKEOFF_VERSION"))]
struct Cli {
	/// Log level (trace, debug, info, warn, error). Overrides RUST_LOG.
	#[arg(long, global = true)]
	log_level: Option<tracing::Level>,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Reconcile the application's namespace, secrets, deployment and service
	Deploy(commands::deploy::DeployArgs),

	/// Install cluster credentials as the local kubeconfig
	WriteKubeconfig(commands::kubeconfig::WriteKubeconfigArgs),
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	telemetry::init(cli.log_level)?;

	let stdout = BrokenPipeGuard::new(std::io::stdout());

	match cli.command {
		Commands::Deploy(args) => commands::deploy::run(args, stdout),
		Commands::WriteKubeconfig(args) => commands::kubeconfig::run(args, stdout),
	}
}
