use std::path::{Path, PathBuf};

use glob::Pattern;

use crate::SourceErr;

/// Finds the files under `root` whose name matches `pattern`, sorted by path.
///
/// # Errors
/// `SourceErr::Pattern` if `pattern` is not a valid glob, `SourceErr::Io` if a matching entry
/// can't be read and `SourceErr::NoShards` if nothing matches.
pub fn discover_shards(root: &Path, pattern: &str) -> Result<Vec<PathBuf>, SourceErr> {
    let full = format!(
        "{}/{pattern}",
        Pattern::escape(&root.to_string_lossy()).trim_end_matches('/')
    );

    let mut shards = glob::glob(&full)?
        .map(|entry| {
            entry.map_err(|e| SourceErr::Io {
                path: e.path().to_path_buf(),
                source: e.into_error(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if shards.is_empty() {
        return Err(SourceErr::NoShards {
            root: root.to_path_buf(),
            pattern: pattern.to_string(),
        });
    }

    shards.sort();
    Ok(shards)
}
