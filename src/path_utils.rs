//! Path utilities for entry names and output locations.
//!
//! Source entries come from folders and archives with arbitrary names; these helpers turn them
//! into safe relative output paths and give them a stable, number-aware ordering.

use std::cmp::Ordering;
use std::path::{Component, Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Splits a name into runs of digits and runs of everything else.
    static ref NAME_CHUNK_REGEX: Regex = Regex::new(r"\d+|\D+").unwrap();
    /// Default pattern for the page number of an entry name. Matches "001", "1", "1.5" etc.
    pub static ref DEFAULT_NUMBER_REGEX: Regex = Regex::new(r"\d+\.?\d*").unwrap();
}

/// File extensions accepted as source pages.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "tif", "tiff"];

/// Converts a path to a string with fallback to lossy conversion.
pub fn path_to_string_lossy(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Gets the file name from a path with fallback to lossy conversion.
///
/// # Returns
///
/// * `String` - The file name, or `"unknown"` for paths without one
pub fn get_file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Checks if a filename starts with a dot (hidden file).
pub fn is_hidden_file(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

/// Checks whether the extension of `path` is one of [`IMAGE_EXTENSIONS`].
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Sanitizes a single filename by replacing invalid characters with safe alternatives.
///
/// # Arguments
///
/// * `filename` - The filename to sanitize
///
/// # Returns
///
/// * `String` - The sanitized filename
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | '"' | '|' | '?' | '*' => '-',
            ':' => '-',
            '/' | '\\' => '-',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Turns an entry name such as `chapter 1/page.jpg` into a relative path that cannot leave the
/// output directory.
///
/// Root, prefix and `..` components are dropped and every remaining component is sanitized.
/// Backslashes are treated as separators.
pub fn sanitize_relative_path(name: &str) -> PathBuf {
    let normalized = name.replace('\\', "/");
    Path::new(&normalized)
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(sanitize_filename(&part.to_string_lossy())),
            _ => None,
        })
        .filter(|part| !part.is_empty())
        .collect()
}

/// Extracts the last number of a filename.
///
/// # Arguments
///
/// * `path` - The path to extract numbers from
/// * `regex` - The regex pattern to use for extraction; group 1 wins over the whole match
///
/// # Returns
///
/// * `Option<f64>` - The extracted number, or None if not found or conversion failed
pub fn extract_number_from_filename(path: &Path, regex: &Regex) -> Option<f64> {
    let file_name = get_file_name_lossy(path);

    regex.captures_iter(&file_name).last().and_then(|cap| {
        let capture = cap.get(1).or_else(|| cap.get(0))?.as_str();
        capture.parse::<f64>().ok()
    })
}

/// Compares two names chunk by chunk, numeric runs by value.
///
/// `page2` sorts before `page10`; ties between equal values such as `01` and `1` are broken by
/// the plain string order so the result is total.
pub fn compare_names_naturally(a: &str, b: &str) -> Ordering {
    let mut left = NAME_CHUNK_REGEX.find_iter(a);
    let mut right = NAME_CHUNK_REGEX.find_iter(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let (l, r) = (l.as_str(), r.as_str());
                let order = match (l.parse::<u128>(), r.parse::<u128>()) {
                    (Ok(ln), Ok(rn)) => ln.cmp(&rn),
                    _ => l.to_lowercase().cmp(&r.to_lowercase()),
                };
                if order != Ordering::Equal {
                    return order;
                }
            }
        }
    }
}

/// Orders two entry names by the number matched with `regex`, then naturally.
pub fn compare_paths_by_number(a: &Path, b: &Path, regex: &Regex) -> Ordering {
    let a_num = extract_number_from_filename(a, regex);
    let b_num = extract_number_from_filename(b, regex);

    match a_num.partial_cmp(&b_num) {
        Some(Ordering::Equal) | None => {
            compare_names_naturally(&path_to_string_lossy(a), &path_to_string_lossy(b))
        }
        Some(order) => order,
    }
}
