//! Path-derived context for ingest requests.

use std::collections::BTreeMap;
use std::path::{Component, Path};

/// Derive upload context from a file's position under the watch root.
///
/// Returns the ordered directory components between the root and the file
/// plus a `dir_N`-indexed mapping of the same components. A file directly
/// under the root yields empty context.
///
/// Example: root `/data`, path `/data/cam1/2023/img.jpg` ->
/// (`["cam1", "2023"]`, `{"dir_0": "cam1", "dir_1": "2023"}`).
pub fn extract_path_context(root: &Path, path: &Path) -> (Vec<String>, BTreeMap<String, String>) {
    let mut context = Vec::new();
    let mut metadata = BTreeMap::new();

    let rel = match path.strip_prefix(root) {
        Ok(rel) => rel,
        Err(_) => return (context, metadata),
    };
    let Some(dir) = rel.parent() else {
        return (context, metadata);
    };

    for component in dir.components() {
        if let Component::Normal(part) = component {
            let part = part.to_string_lossy().into_owned();
            metadata.insert(format!("dir_{}", context.len()), part.clone());
            context.push(part);
        }
    }

    (context, metadata)
}
