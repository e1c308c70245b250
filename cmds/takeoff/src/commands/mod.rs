pub mod deploy;
pub mod kubeconfig;

pub mod util;
