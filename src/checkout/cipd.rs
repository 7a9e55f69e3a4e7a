//! CIPD package installs.

use std::path::Path;

use tokio::process::Command;
use tracing::info;

use crate::constants::CIPD_INSTALL_TIMEOUT;
use crate::core::GsyncError;
use crate::utils::platform::cipd_command;

/// Install `package` at `version` under `<root>/<install_root>`.
pub async fn install(
    root: &Path,
    node: &str,
    package: &str,
    version: &str,
    install_root: &str,
) -> Result<(), GsyncError> {
    let checkout_error = |reason: String| GsyncError::Checkout {
        node: node.to_string(),
        operation: "cipd install".to_string(),
        reason,
    };
    let cipd = cipd_command()
        .ok_or_else(|| checkout_error("cipd client not found on PATH".to_string()))?;
    let target = root.join(install_root);
    tokio::fs::create_dir_all(&target)
        .await
        .map_err(|e| checkout_error(format!("cannot create {}: {e}", target.display())))?;

    info!(target: "cipd", "Installing {package}@{version} into {install_root}");
    let mut command = Command::new(cipd);
    command
        .arg("install")
        .arg("-root")
        .arg(&target)
        .arg(package)
        .arg(version)
        .kill_on_drop(true);

    let output = tokio::time::timeout(CIPD_INSTALL_TIMEOUT, command.output())
        .await
        .map_err(|_| checkout_error("timed out".to_string()))?
        .map_err(|e| checkout_error(format!("failed to run cipd: {e}")))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(checkout_error(String::from_utf8_lossy(&output.stderr).trim().to_string()))
    }
}
