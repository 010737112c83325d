use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

pub const HEADER_SEARCH: &str = "<<<<<<< SEARCH";
pub const SEPARATOR: &str = "=======";
pub const HEADER_REPLACE: &str = ">>>>>>> REPLACE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchReplaceBlock {
    pub search: String,
    pub replace: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedBlock {
    #[error("Header '<<<<<<< SEARCH' not found")]
    MissingSearchHeader,
    #[error("Separator '=======' not found")]
    MissingSeparator,
    #[error("Footer '>>>>>>> REPLACE' not found")]
    MissingReplaceFooter,
    #[error("marker '{0}' appears more than once")]
    DuplicateMarker(&'static str),
    #[error("markers must appear as SEARCH, separator, REPLACE")]
    MarkersOutOfOrder,
}

/// Split a SEARCH/REPLACE block into its two halves.
///
/// Marker lines are compared after trimming trailing whitespace. Each half is
/// the lines strictly between its markers joined with `\n`, so a lone blank
/// line stands for an empty block.
pub fn parse_block(diff: &str) -> Result<SearchReplaceBlock, MalformedBlock> {
    let lines: Vec<&str> = diff.lines().collect();
    let header = find_marker(&lines, HEADER_SEARCH)?.ok_or(MalformedBlock::MissingSearchHeader)?;
    let separator = find_marker(&lines, SEPARATOR)?.ok_or(MalformedBlock::MissingSeparator)?;
    let footer = find_marker(&lines, HEADER_REPLACE)?.ok_or(MalformedBlock::MissingReplaceFooter)?;
    if !(header < separator && separator < footer) {
        return Err(MalformedBlock::MarkersOutOfOrder);
    }
    Ok(SearchReplaceBlock {
        search: lines[header + 1..separator].join("\n"),
        replace: lines[separator + 1..footer].join("\n"),
    })
}

fn find_marker(lines: &[&str], marker: &'static str) -> Result<Option<usize>, MalformedBlock> {
    let mut hits = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.trim_end() == marker)
        .map(|(idx, _)| idx);
    let first = hits.next();
    if hits.next().is_some() {
        return Err(MalformedBlock::DuplicateMarker(marker));
    }
    Ok(first)
}

/// Apply `block` to `content`, returning the new content or `None` when the
/// block cannot be placed.
///
/// An empty search block is only accepted against empty content; anywhere
/// else the insertion point would be a guess.
pub fn splice(content: &str, block: &SearchReplaceBlock) -> Option<String> {
    if block.search.is_empty() {
        return content.is_empty().then(|| block.replace.clone());
    }
    if !content.contains(&block.search) {
        return None;
    }
    Some(content.replacen(&block.search, &block.replace, 1))
}

/// Apply a SEARCH/REPLACE block to the file at `path`.
///
/// Returns `Ok(false)` when the block does not fit the file (or there is
/// nothing to apply), leaving the file untouched. Malformed markers are a
/// [`MalformedBlock`] error. A missing file reads as empty content.
pub fn apply_search_replace(path: &Path, diff: &str) -> Result<bool> {
    if diff.trim().is_empty() {
        return Ok(false);
    }
    let block = parse_block(diff)?;

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };

    let Some(updated) = splice(&content, &block) else {
        if block.search.is_empty() {
            warn!(path = %path.display(), "empty SEARCH block against a non-empty file");
        } else {
            warn!(path = %path.display(), "SEARCH block not found verbatim");
        }
        return Ok(false);
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, updated).with_context(|| format!("failed to write {}", path.display()))?;
    debug!(path = %path.display(), "search/replace block applied");
    Ok(true)
}
