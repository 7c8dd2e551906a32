//! Collision-free name allocation for collection directories and file
//! basenames

use std::path::Path;

use crate::error::ExportError;
use crate::gateway::FsGateway;

/// Basename cap applied after sanitization
pub const MAX_BASENAME_LEN: usize = 255;

/// Make a candidate safe to use as a single path component.
///
/// Path separators and control characters become `_`, trailing dots and
/// spaces are trimmed, and the result is capped at [`MAX_BASENAME_LEN`]
/// bytes on a char boundary. An empty result degrades to `"_"`.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    while out.ends_with('.') || out.ends_with(' ') {
        out.pop();
    }

    if out.len() > MAX_BASENAME_LEN {
        let mut cut = MAX_BASENAME_LEN;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
    }

    if out.is_empty() {
        out.push('_');
    }
    out
}

/// Strip a trailing `(k)` collision suffix, if present.
///
/// A recorded name that carries a suffix must compare equal to a rename
/// target whose bare name matches, so renamed-collection detection calls
/// this before comparing.
#[must_use]
pub fn strip_copy_suffix(name: &str) -> &str {
    let Some(body) = name.strip_suffix(')') else {
        return name;
    };
    match body.rfind('(') {
        Some(open) if open > 0 && body[open + 1..].chars().all(|c| c.is_ascii_digit())
            && !body[open + 1..].is_empty() =>
        {
            &name[..open]
        }
        _ => name,
    }
}

/// Split `name` into a stem and an optional `.ext` tail (dot included).
///
/// A leading dot is part of the stem, so `".hidden"` has no extension.
#[must_use]
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name, ""),
    }
}

/// Allocate a name under `parent` that does not currently exist on disk.
///
/// The desired name is sanitized first; on collision, `stem(k).ext` is
/// probed for `k = 1, 2, …`. Races with external processes are tolerated at
/// the detected-collision level; no locking happens here.
///
/// # Errors
/// Propagates gateway failures from the existence probes.
pub async fn allocate(
    fs: &dyn FsGateway,
    parent: &Path,
    desired: &str,
) -> Result<String, ExportError> {
    allocate_excluding(fs, parent, desired, &[]).await
}

/// Like [`allocate`], additionally avoiding names in `reserved` that are
/// about to be written but are not on disk yet (the second leg of a live
/// photo).
pub async fn allocate_excluding(
    fs: &dyn FsGateway,
    parent: &Path,
    desired: &str,
    reserved: &[&str],
) -> Result<String, ExportError> {
    let candidate = sanitize_name(desired);
    let (stem, ext) = split_extension(&candidate);

    if !reserved.contains(&candidate.as_str()) && !fs.exists(&parent.join(&candidate)).await {
        return Ok(candidate);
    }

    for k in 1u32.. {
        let next = format!("{stem}({k}){ext}");
        if !reserved.contains(&next.as_str()) && !fs.exists(&parent.join(&next)).await {
            return Ok(next);
        }
    }
    unreachable!("name probing is unbounded")
}
