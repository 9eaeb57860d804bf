//! Interfaces shipped with the crate
//!
//! The AMR base and SLAM stack manifests under `interfaces/` are embedded at
//! compile time and loaded as one batch.

use include_dir::{include_dir, Dir};

use crate::error::{InterfaceError, Result};
use crate::manifest::{InterfaceManifest, InterfaceSet};

static BUNDLED: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/interfaces");

/// Parse every embedded manifest, in path order
pub fn manifests() -> Result<Vec<InterfaceManifest>> {
    let mut files: Vec<_> = BUNDLED
        .files()
        .filter(|f| f.path().extension().map(|e| e == "json").unwrap_or(false))
        .collect();
    files.sort_by(|a, b| a.path().cmp(b.path()));

    files
        .into_iter()
        .map(|file| {
            let text = file.contents_utf8().ok_or_else(|| InterfaceError::InvalidManifest {
                path: file.path().display().to_string(),
                reason: "not UTF-8".to_string(),
            })?;
            serde_json::from_str(text).map_err(|e| InterfaceError::InvalidManifest {
                path: file.path().display().to_string(),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Register the bundled interfaces into a fresh set
pub fn load() -> Result<InterfaceSet> {
    InterfaceSet::load(&manifests()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_manifests_parse() {
        let manifests = manifests().unwrap();
        let packages: Vec<&str> = manifests.iter().map(|m| m.package.as_str()).collect();
        assert_eq!(packages, vec!["amr_interfaces", "slam_interfaces"]);
    }

    #[test]
    fn test_bundled_set_registers() {
        let set = load().unwrap();
        assert!(set.registry.lookup("amr_interfaces/msg/BatteryInfo").is_some());
        assert!(set.service("slam_interfaces/srv/Mapping").is_some());
        assert!(set.action("slam_interfaces/action/NavigateToPose").is_some());
    }
}
