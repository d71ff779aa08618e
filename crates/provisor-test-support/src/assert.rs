//! Assertions over directory trees.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use walkdir::WalkDir;

#[derive(Debug, PartialEq, Eq)]
enum Node {
    Dir,
    File(Vec<u8>),
}

fn snapshot(root: &Path) -> Result<BTreeMap<PathBuf, Node>> {
    let mut nodes = BTreeMap::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        let relative = entry.path().strip_prefix(root)?.to_path_buf();
        let node = if entry.file_type().is_dir() {
            Node::Dir
        } else {
            Node::File(
                fs::read(entry.path())
                    .with_context(|| format!("failed to read {}", entry.path().display()))?,
            )
        };
        nodes.insert(relative, node);
    }
    Ok(nodes)
}

/// Fail unless `left` and `right` contain the same paths with byte-identical files.
///
/// # Errors
///
/// Returns an error describing the first difference found.
pub fn assert_trees_identical(left: &Path, right: &Path) -> Result<()> {
    let left_nodes = snapshot(left)?;
    let right_nodes = snapshot(right)?;
    for (path, node) in &left_nodes {
        match right_nodes.get(path) {
            None => bail!("{} missing from {}", path.display(), right.display()),
            Some(other) if other != node => bail!("{} differs", path.display()),
            Some(_) => {}
        }
    }
    if let Some(extra) = right_nodes.keys().find(|path| !left_nodes.contains_key(*path)) {
        bail!("{} only present in {}", extra.display(), right.display());
    }
    Ok(())
}
