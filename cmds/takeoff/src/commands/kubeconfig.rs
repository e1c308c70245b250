//! Write-kubeconfig command handler.

use std::{io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use crate::kubeconfig::{write_kube_config, ClusterCredentialSource, FileClusterCredentials};

#[derive(Args)]
pub struct WriteKubeconfigArgs {
	/// File holding the cluster credentials
	#[arg(long = "from")]
	pub source: PathBuf,

	/// Home directory the kubeconfig is installed under
	#[arg(long, env = "HOME")]
	pub home: PathBuf,
}

/// Run the write-kubeconfig command.
pub fn run<W: Write>(args: WriteKubeconfigArgs, mut writer: W) -> Result<()> {
	let credentials = FileClusterCredentials::new(&args.source)
		.cluster_credentials()
		.with_context(|| format!("loading cluster credentials from {}", args.source.display()))?;
	let path = write_kube_config(&credentials, &args.home)?;

	writeln!(writer, "{}", path.display())?;
	Ok(())
}
