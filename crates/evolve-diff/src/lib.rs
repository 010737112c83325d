//! Patch parsing and the two ways of materializing a patch onto disk:
//! `git apply` for unified diffs and in-process SEARCH/REPLACE blocks.

mod git;
mod search_replace;

pub use git::{ApplyReport, GitApplier};
pub use search_replace::{
    HEADER_REPLACE, HEADER_SEARCH, MalformedBlock, SEPARATOR, SearchReplaceBlock,
    apply_search_replace, parse_block, splice,
};

/// Files whose quality a unified diff is judged on, in first-seen order.
///
/// `diff --git a/<path> b/...` lines win; a patch without them falls back to
/// its `--- a/<path>` headers. Never fails: an unrecognizable patch simply
/// yields no paths.
pub fn target_files(patch: &str) -> Vec<String> {
    let mut files = Vec::new();
    for line in patch.lines() {
        if let Some(path) = git_header_path(line) {
            push_unique(&mut files, path);
        }
    }
    if !files.is_empty() {
        return files;
    }
    for line in patch.lines() {
        if let Some(raw) = line.strip_prefix("--- a/")
            && let Some(path) = clean_header_path(raw)
        {
            push_unique(&mut files, path);
        }
    }
    files
}

/// Every path the patch may create, modify or delete: the target files plus
/// new-side headers and rename/copy destinations.
pub fn touched_files(patch: &str) -> Vec<String> {
    let mut files = target_files(patch);
    let lines: Vec<&str> = patch.lines().collect();
    // Only a `---` line directly followed by `+++` is a file header; hunk
    // bodies can contain either prefix on their own.
    for pair in lines.windows(2) {
        if let (Some(old), Some(new)) = (pair[0].strip_prefix("--- "), pair[1].strip_prefix("+++ "))
        {
            for raw in [old, new] {
                if let Some(path) = parse_patch_path(raw) {
                    push_unique(&mut files, path);
                }
            }
        }
    }
    for line in &lines {
        if let Some(raw) = line
            .strip_prefix("rename to ")
            .or_else(|| line.strip_prefix("copy to "))
            && let Some(path) = clean_header_path(raw)
        {
            push_unique(&mut files, path);
        }
    }
    files
}

fn git_header_path(line: &str) -> Option<String> {
    let rest = line.strip_prefix("diff --git a/")?;
    let end = rest.find(" b/")?;
    clean_header_path(&rest[..end])
}

fn parse_patch_path(raw: &str) -> Option<String> {
    let raw = strip_timestamp(raw);
    if raw == "/dev/null" {
        return None;
    }
    let normalized = raw
        .strip_prefix("a/")
        .or_else(|| raw.strip_prefix("b/"))
        .unwrap_or(raw);
    clean_header_path(normalized)
}

fn clean_header_path(raw: &str) -> Option<String> {
    let path = strip_timestamp(raw).trim();
    if path.is_empty() || path == "/dev/null" {
        return None;
    }
    Some(path.to_string())
}

// `--- a/file.py\t2024-01-01 00:00:00` style headers carry a tab-separated date.
fn strip_timestamp(raw: &str) -> &str {
    raw.split('\t').next().unwrap_or(raw)
}

fn push_unique(files: &mut Vec<String>, path: String) {
    if !files.contains(&path) {
        files.push(path);
    }
}
