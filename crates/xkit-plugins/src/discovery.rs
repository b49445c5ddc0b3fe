//! Filesystem discovery of plugin manifests.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::PluginResult;
use crate::manifest::PluginManifest;

/// The manifest filename looked for directly under each plugin root.
const MANIFEST_FILE_NAME: &str = "plugin.toml";

/// One manifest found on disk, alongside the directory it lives in.
#[derive(Debug, Clone)]
pub struct DiscoveredPlugin {
    /// The plugin's own directory.
    pub root: PathBuf,
    /// The parsed manifest.
    pub manifest: PluginManifest,
}

/// Scan `roots` for immediate subdirectories containing a `plugin.toml`.
///
/// A root itself carrying a manifest is also accepted, so a single plugin
/// directory can be listed directly. Unreadable entries are logged and
/// skipped rather than aborting the whole scan; a malformed manifest is
/// surfaced as an error since it usually indicates an install mistake
/// worth the caller's attention.
///
/// # Errors
///
/// Returns the first [`crate::error::PluginError::ManifestParse`]
/// encountered.
pub fn discover(roots: &[PathBuf]) -> PluginResult<Vec<DiscoveredPlugin>> {
    let mut found = Vec::new();
    for root in roots {
        if has_manifest(root) {
            found.push(load_manifest(root)?);
            continue;
        }
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(root = %root.display(), %err, "could not scan plugin root");
                continue;
            },
        };
        for entry in entries {
            let Ok(entry) = entry else { continue };
            let path = entry.path();
            if path.is_dir() && has_manifest(&path) {
                found.push(load_manifest(&path)?);
            }
        }
    }
    Ok(found)
}

fn has_manifest(dir: &Path) -> bool {
    dir.join(MANIFEST_FILE_NAME).is_file()
}

fn load_manifest(dir: &Path) -> PluginResult<DiscoveredPlugin> {
    let manifest_path = dir.join(MANIFEST_FILE_NAME);
    let text = std::fs::read_to_string(&manifest_path).map_err(|err| {
        crate::error::PluginError::ManifestParse {
            path: manifest_path.display().to_string(),
            message: err.to_string(),
        }
    })?;
    let manifest = PluginManifest::parse(&manifest_path, &text)?;
    Ok(DiscoveredPlugin {
        root: dir.to_path_buf(),
        manifest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn discovers_a_plugin_in_a_subdirectory() {
        let tmp = tempfile::tempdir().unwrap();
        let plugin_dir = tmp.path().join("greeter");
        fs::create_dir(&plugin_dir).unwrap();
        fs::write(
            plugin_dir.join("plugin.toml"),
            r#"
                name = "greeter"
                version = "0.1.0"
                entry_point = "greeter"
            "#,
        )
        .unwrap();

        let found = discover(&[tmp.path().to_path_buf()]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].manifest.name.as_str(), "greeter");
    }

    #[test]
    fn accepts_a_root_that_is_itself_a_plugin_directory() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("plugin.toml"),
            r#"
                name = "solo"
                version = "0.1.0"
                entry_point = "solo"
            "#,
        )
        .unwrap();

        let found = discover(&[tmp.path().to_path_buf()]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].manifest.name.as_str(), "solo");
    }

    #[test]
    fn skips_subdirectories_without_a_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("not-a-plugin")).unwrap();

        let found = discover(&[tmp.path().to_path_buf()]).unwrap();
        assert!(found.is_empty());
    }
}
