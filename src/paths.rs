//! Translation between IDE-relative and server-relative file paths.
//!
//! All functions are pure. Prefixes only match on whole `/`-separated
//! segments: prefix `src` matches `src` and `src/Foo.java`, never `src2/Foo.java`.

use crate::models::ProjectBinding;

/// Strip `prefix` from `path` at a segment boundary.
///
/// Returns the remainder without its leading `/`, or `None` if `path` does not
/// start with the whole prefix. An empty prefix matches every path.
fn strip_segment_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix('/')
    }
}

/// Join a prefix and a relative path, inserting `/` only when both are non-empty.
fn join(prefix: &str, rest: &str) -> String {
    match (prefix.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{}/{}", prefix, rest),
    }
}

/// Map an IDE-relative path to the server-relative path of the same file.
pub fn ide_to_server_path(binding: &ProjectBinding, ide_path: &str) -> Option<String> {
    let rest = strip_segment_prefix(ide_path, &binding.ide_path_prefix)?;
    Some(join(&binding.server_path_prefix, rest))
}

/// Map a server-relative path back to the IDE-relative path of the same file.
pub fn server_to_ide_path(binding: &ProjectBinding, server_path: &str) -> Option<String> {
    let rest = strip_segment_prefix(server_path, &binding.server_path_prefix)?;
    Some(join(&binding.ide_path_prefix, rest))
}

/// Component key of a file on the server: `<projectKey>:<serverPath>`.
pub fn file_key_for(binding: &ProjectBinding, server_path: &str) -> String {
    format!("{}:{}", binding.project_key, server_path)
}
