//! Entry path resolution under the destination root

use crate::error::{ExtractError, Result};
use std::path::{Component, Path, PathBuf};

/// Join an archive entry path under `root`.
///
/// `.` components and a leading `/` are dropped. Parent references and
/// platform prefixes are refused so nothing lands outside `root`.
pub fn resolve_entry_path(root: &Path, entry: &Path) -> Result<PathBuf> {
    let mut relative = PathBuf::new();

    for component in entry.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir | Component::Prefix(_) => {
                return Err(ExtractError::UnsafePath(entry.to_path_buf()));
            }
        }
    }

    Ok(root.join(relative))
}
