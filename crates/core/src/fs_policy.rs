//! Workspace path containment.
//!
//! Provides lexical validation of caller-supplied paths before any
//! filesystem access happens, preventing traversal out of a sandbox's
//! workspace directory.

use crate::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Normalize a caller-supplied workspace path to a safe relative path.
///
/// Agents address files both as `sub/file.txt` and as `/workspace/sub/file.txt`;
/// this function accepts either form:
/// 1. Leading `/` and `\` separators are stripped.
/// 2. A literal leading `workspace/` segment (or an exact `workspace`) is
///    stripped, so paths echoed back from inside the container resolve to the
///    same host file.
/// 3. Components are normalized lexically; any `..` that would climb above
///    the workspace root fails with `Error::PathEscape` before any
///    filesystem access occurs.
pub fn clean_workspace_rel(input: &str) -> Result<PathBuf> {
    let trimmed = input.trim_start_matches(['/', '\\']);
    let trimmed = if trimmed == "workspace" {
        ""
    } else {
        trimmed.strip_prefix("workspace/").unwrap_or(trimmed)
    };

    // Reject Windows-style absolute paths on any OS
    if trimmed.len() >= 2
        && trimmed.as_bytes()[1] == b':'
        && trimmed.as_bytes()[0].is_ascii_alphabetic()
    {
        return Err(Error::path_escape(format!(
            "absolute paths are not allowed: {}",
            input
        )));
    }

    let mut normalized = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(Error::path_escape(format!(
                        "path traversal detected: {}",
                        input
                    )));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::path_escape(format!(
                    "absolute paths are not allowed: {}",
                    input
                )));
            }
            Component::CurDir => {}
        }
    }

    Ok(normalized)
}
