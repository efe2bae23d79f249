//! Container identity derivation and resolution.
//!
//! A container identity is a pure function of (workspace path, slot): no
//! registry, no state. Exclusivity is delegated to the runtime's name
//! collision behavior, so concurrent invocations can race the slot scan
//! safely.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::runtime::ContainerRuntime;

/// Hex digits of the workspace digest kept in container names.
const DIGEST_LEN: usize = 12;

/// Upper bound for the slot scan. Slots are allocated from 1 upward; hitting
/// this bound means something is leaking containers.
pub const MAX_SLOTS: u32 = 99;

/// Derive the container identity for (workspace, slot).
///
/// Deterministic and collision-resistant: the name embeds a truncated SHA-256
/// digest of the workspace path, so identical inputs always map to the same
/// name and distinct workspaces practically never collide.
pub fn derive_identity(prefix: &str, workspace: &Path, slot: u32) -> String {
    format!("{}{slot}", identity_prefix(prefix, workspace))
}

/// The shared name prefix of every slot for a workspace, ending in `-`.
///
/// Used to query the runtime for all containers belonging to a workspace.
pub fn identity_prefix(prefix: &str, workspace: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(workspace.as_os_str().as_encoded_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{prefix}-{}-", &digest[..DIGEST_LEN])
}

/// Validate an explicit slot argument.
pub fn validate_slot(slot: u32) -> Result<u32> {
    if slot == 0 {
        return Err(Error::validation("slot must be a positive integer"));
    }
    Ok(slot)
}

/// Find the first slot whose derived identity has no container, scanning
/// from 1 upward.
///
/// The scan is advisory: two racing invocations may pick the same slot, and
/// the loser finds out when the runtime rejects the duplicate name at launch.
pub async fn allocate_slot(
    runtime: &dyn ContainerRuntime,
    prefix: &str,
    workspace: &Path,
) -> Result<(u32, String)> {
    for slot in 1..=MAX_SLOTS {
        let name = derive_identity(prefix, workspace, slot);
        if !runtime.exists(&name).await? {
            return Ok((slot, name));
        }
    }

    Err(Error::invalid_state(format!(
        "all {MAX_SLOTS} slots for this workspace have containers; clean some up first"
    )))
}

/// Resolve the concrete container identity for a command.
///
/// Precedence: explicit `--container` flag, then the `COI_CONTAINER`
/// environment variable, then an explicit slot via derivation, then
/// auto-resolution against the runtime (exactly one container for the
/// workspace, otherwise an error telling the caller how to disambiguate).
pub async fn resolve_identity(
    runtime: &dyn ContainerRuntime,
    prefix: &str,
    workspace: &Path,
    explicit: Option<&str>,
    env_container: Option<&str>,
    slot: Option<u32>,
) -> Result<String> {
    if let Some(name) = explicit {
        if !runtime.exists(name).await? {
            return Err(Error::not_found(format!("container '{name}' not found")));
        }
        return Ok(name.to_string());
    }

    if let Some(name) = env_container {
        if !runtime.exists(name).await? {
            return Err(Error::not_found(format!(
                "container '{name}' from COI_CONTAINER not found"
            )));
        }
        return Ok(name.to_string());
    }

    if let Some(slot) = slot {
        let slot = validate_slot(slot)?;
        return Ok(derive_identity(prefix, workspace, slot));
    }

    let candidates = runtime.list(&identity_prefix(prefix, workspace)).await?;

    match candidates.len() {
        0 => Err(Error::not_found(
            "no containers found for this workspace - use --container to specify",
        )),
        1 => Ok(candidates[0].name.clone()),
        _ => {
            let names: Vec<&str> = candidates.iter().map(|i| i.name.as_str()).collect();
            Err(Error::AmbiguousResolution(format!(
                "multiple containers found for this workspace, use --container to specify: {}",
                names.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn derivation_is_deterministic() {
        let workspace = PathBuf::from("/home/dev/project");
        let a = derive_identity("coi", &workspace, 1);
        let b = derive_identity("coi", &workspace, 1);
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_slots_yield_distinct_identities() {
        let workspace = PathBuf::from("/home/dev/project");
        let one = derive_identity("coi", &workspace, 1);
        let two = derive_identity("coi", &workspace, 2);
        assert_ne!(one, two);
        assert!(one.starts_with(&identity_prefix("coi", &workspace)));
        assert!(two.starts_with(&identity_prefix("coi", &workspace)));
    }

    #[test]
    fn distinct_workspaces_yield_distinct_identities() {
        let a = derive_identity("coi", &PathBuf::from("/home/dev/alpha"), 1);
        let b = derive_identity("coi", &PathBuf::from("/home/dev/beta"), 1);
        assert_ne!(a, b);
    }

    #[test]
    fn identity_is_a_valid_container_name() {
        let workspace = PathBuf::from("/home/dev/project");
        let name = derive_identity("coi", &workspace, 7);
        crate::runtime::validate_container_name(&name).unwrap();
        assert!(name.ends_with("-7"));
    }

    #[test]
    fn slot_zero_is_rejected() {
        assert!(validate_slot(0).is_err());
        assert_eq!(validate_slot(3).unwrap(), 3);
    }
}
