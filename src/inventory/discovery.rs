// Inventory file discovery over files and directory trees

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use walkdir::WalkDir;

use super::InventoryFile;
use crate::output::errors::ForgeError;

/// Extension of inventory source files
pub const INVENTORY_EXTENSION: &str = "hcl";

fn is_inventory_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(INVENTORY_EXTENSION)
}

fn read_file(path: &Path) -> Result<InventoryFile, ForgeError> {
    let content = std::fs::read_to_string(path).map_err(|source| ForgeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(InventoryFile::new(path, content))
}

/// Collect inventory files from the given paths.
///
/// Files are taken as given, whatever their extension. Directories are
/// walked recursively in file-name order for `*.hcl` files. A file reached
/// twice is returned once, at its first position.
pub fn discover_inventory_files<P: AsRef<Path>>(
    paths: &[P],
) -> Result<Vec<InventoryFile>, ForgeError> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut files = Vec::new();

    for path in paths {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|source| ForgeError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if !metadata.is_dir() {
            if seen.insert(path.to_path_buf()) {
                files.push(read_file(path)?);
            }
            continue;
        }

        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.map_err(|e| ForgeError::Discovery {
                path: e.path().unwrap_or(path).to_path_buf(),
                message: e.to_string(),
            })?;
            let file = entry.path();
            if !entry.file_type().is_file() || !is_inventory_file(file) {
                trace!(path = %file.display(), "skipping");
                continue;
            }
            if seen.insert(file.to_path_buf()) {
                files.push(read_file(file)?);
            }
        }
    }

    debug!(files = files.len(), "discovered inventory files");
    Ok(files)
}
