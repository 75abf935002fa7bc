//! Writes the four artifacts an orchestration run produces to disk.

use crate::action_plan::ActionPlan;
use crate::error::AutoError;
use crate::lock::SpecLock;
use crate::plan::Plan;
use crate::spec::ProductSpec;
use std::path::Path;
use tokio::fs;
use tracing::info;

#[cfg(unix)]
async fn restrict_to_owner(path: &Path) -> Result<(), AutoError> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o600);
    fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_to_owner(_path: &Path) -> Result<(), AutoError> {
    Ok(())
}

/// Write `spec.yaml`, `spec.lock.json` (mode 0600), `plan.json`, and
/// `action-plan.json` into `dir`, creating it if necessary.
pub async fn write_artifacts(
    dir: &Path,
    spec: &ProductSpec,
    lock: &SpecLock,
    plan: &Plan,
    action_plan: &ActionPlan,
) -> Result<(), AutoError> {
    fs::create_dir_all(dir).await?;

    let spec_path = dir.join("spec.yaml");
    fs::write(&spec_path, serde_yaml::to_string(spec)?).await?;

    let lock_path = dir.join("spec.lock.json");
    fs::write(&lock_path, serde_json::to_vec_pretty(lock)?).await?;
    restrict_to_owner(&lock_path).await?;

    let plan_path = dir.join("plan.json");
    fs::write(&plan_path, serde_json::to_vec_pretty(plan)?).await?;

    let action_plan_path = dir.join("action-plan.json");
    fs::write(&action_plan_path, serde_json::to_vec_pretty(action_plan)?).await?;

    info!(dir = %dir.display(), "wrote orchestration artifacts");
    Ok(())
}
