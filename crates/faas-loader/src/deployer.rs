//! Deployment of the trace functions onto the target platform.
use std::path::Path;

use log::info;

use crate::config::LoaderConfiguration;
use crate::error::Result;
use crate::function::Function;

/// Makes the functions invocable, returning them with their endpoints filled in.
///
/// A failure makes the experiment impossible and is returned as [`crate::error::LoaderError::Deploy`].
pub trait Deployer: Send + Sync {
    fn deploy(
        &self,
        configuration: &LoaderConfiguration,
        functions: &[Function],
        manifest_path: &Path,
    ) -> Result<Vec<Function>>;
}

/// For functions that already run on the target and only need their endpoints to be known.
pub struct PreDeployedFunctions {}

impl Deployer for PreDeployedFunctions {
    fn deploy(
        &self,
        _configuration: &LoaderConfiguration,
        functions: &[Function],
        _manifest_path: &Path,
    ) -> Result<Vec<Function>> {
        info!("Using {} pre-deployed functions", functions.len());
        Ok(functions
            .iter()
            .map(|f| {
                let mut f = f.clone();
                if f.endpoint.is_empty() {
                    f.endpoint = format!("{}.default.svc.cluster.local", f.name);
                }
                f
            })
            .collect())
    }
}
