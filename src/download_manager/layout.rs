//! On-disk layout of archives: directory names, page file names, sizes.
//!
//! An archive lives in `<root>/<directory>/` with `cover.<ext>` at its top
//! and pages at `<episode order>/<3-digit page index>.<ext>`.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Image extensions recognised as pages or covers.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];
const DEFAULT_EXTENSION: &str = "jpg";

const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const MAX_NAME_BYTES: usize = 255;
const FALLBACK_NAME: &str = "untitled";

/// Replaces characters that are invalid in directory names with spaces, trims
/// the result and caps it at 255 bytes without splitting a character.
pub fn sanitize_folder_name(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| if FORBIDDEN_CHARS.contains(&c) { ' ' } else { c })
        .collect();
    let mut name = replaced.trim().to_string();

    while name.len() > MAX_NAME_BYTES {
        name.pop();
    }
    let name = name.trim_end().to_string();

    if name.is_empty() || name == "." || name == ".." {
        FALLBACK_NAME.to_string()
    } else {
        name
    }
}

/// Creates a fresh directory for `title` under `root`, probing `name`,
/// `name_2`, `name_3`, … until a name is found that neither exists on disk
/// nor appears in `reserved`. Returns the chosen name and its full path.
pub fn allocate_directory(
    root: &Path,
    title: &str,
    reserved: &HashSet<String>,
) -> io::Result<(String, PathBuf)> {
    let base = sanitize_folder_name(title);
    let mut candidate = base.clone();
    let mut counter = 1;
    loop {
        if !reserved.contains(&candidate) {
            let path = root.join(&candidate);
            // create_dir fails on an existing entry, which makes the probe atomic
            match std::fs::create_dir(&path) {
                Ok(()) => return Ok((candidate, path)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e),
            }
        }
        counter += 1;
        candidate = format!("{}_{}", base, counter);
    }
}

/// Image extension taken from the path of `url`, falling back to `jpg`.
pub fn extension_from_url(url: &str) -> &'static str {
    let path = url.split(|c| c == '?' || c == '#').next().unwrap_or(url);
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let ext = match file_name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return DEFAULT_EXTENSION,
    };
    match ext.as_str() {
        "png" => "png",
        "webp" => "webp",
        "gif" => "gif",
        _ => DEFAULT_EXTENSION,
    }
}

/// File name of the 1-based `page` within an episode directory.
pub fn page_file_name(page: usize, extension: &str) -> String {
    format!("{:03}.{}", page, extension)
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Total size in bytes of all files below `path`. Unreadable entries are
/// skipped.
pub fn directory_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}
