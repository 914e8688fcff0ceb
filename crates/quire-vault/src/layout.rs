//! On-disk naming: `[NN.]name[.md]`, the directory document, and the
//! reserved prefix.

pub use quire_core::document::validate_name;

/// Extension of leaf files.
pub const LEAF_EXTENSION: &str = "md";

/// Hidden file holding a directory's own metadata and body.
pub const DIRECTORY_DOCUMENT: &str = ".node.md";

/// Entries starting with this are never documents.
pub const RESERVED_PREFIX: char = '.';

/// Version-control directory, kept across saves.
pub const VCS_DIR: &str = ".git";

pub fn is_reserved(file_name: &str) -> bool {
    file_name.starts_with(RESERVED_PREFIX)
}

/// Stem of a leaf file name, `None` when the extension is not ours.
pub fn leaf_stem(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(LEAF_EXTENSION)
        .and_then(|rest| rest.strip_suffix('.'))
        .filter(|stem| !stem.is_empty())
}

/// Split a path segment into `(index, name)`.
///
/// With `indexed` set, a leading integer segment followed by `.` and a
/// non-empty rest is the order prefix. Anything else is all name.
pub fn decode_name(segment: &str, indexed: bool) -> (i32, String) {
    if indexed {
        if let Some((prefix, rest)) = segment.split_once('.') {
            if let (Ok(index), false) = (prefix.parse::<i32>(), rest.is_empty()) {
                return (index, rest.to_string());
            }
        }
    }
    (0, segment.to_string())
}

/// Path segment for a document, without the leaf extension.
pub fn encode_name(name: &str, index: i32, indexed: bool) -> String {
    if indexed {
        format!("{index:02}.{name}")
    } else {
        name.to_string()
    }
}

/// File name of a leaf.
pub fn leaf_file_name(name: &str, index: i32, indexed: bool) -> String {
    format!("{}.{LEAF_EXTENSION}", encode_name(name, index, indexed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_prefix_only_when_indexed() {
        assert_eq!(decode_name("04.dave", true), (4, "dave".into()));
        assert_eq!(decode_name("04.dave", false), (0, "04.dave".into()));
        assert_eq!(decode_name("03", false), (0, "03".into()));
        assert_eq!(decode_name("03", true), (0, "03".into()));
        assert_eq!(decode_name("notes", true), (0, "notes".into()));
        assert_eq!(decode_name("v1.2", true), (0, "v1.2".into()));
        assert_eq!(decode_name("05.3.x", true), (5, "3.x".into()));
    }

    #[test]
    fn encodes_two_digit_prefix() {
        assert_eq!(leaf_file_name("dave", 4, true), "04.dave.md");
        assert_eq!(leaf_file_name("dave", 4, false), "dave.md");
        assert_eq!(encode_name("chars", 3, true), "03.chars");
        assert_eq!(encode_name("big", 123, true), "123.big");
    }

    #[test]
    fn leaf_stem_requires_extension() {
        assert_eq!(leaf_stem("04.dave.md"), Some("04.dave"));
        assert_eq!(leaf_stem("readme.txt"), None);
        assert_eq!(leaf_stem(".md"), None);
        assert_eq!(leaf_stem("md"), None);
    }
}
