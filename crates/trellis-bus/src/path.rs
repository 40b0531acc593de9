//! Path segmentation.
//!
//! Topic paths resemble file paths: identifiers separated by a
//! separator character (`/` by default). Leading, trailing and
//! repeated separators carry no meaning (`"//a/b//c/"` names the same
//! topic as `"a/b/c"`), so iteration silently skips empty segments.

/// Iterator over the non-empty segments of a path.
///
/// # Example
///
/// ```
/// use trellis_bus::path::Segments;
///
/// let parts: Vec<&str> = Segments::new("//a/b//c/").collect();
/// assert_eq!(parts, ["a", "b", "c"]);
/// ```
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    rest: &'a str,
    separator: char,
}

impl<'a> Segments<'a> {
    /// Iterates `path` with the default `/` separator.
    #[must_use]
    pub fn new(path: &'a str) -> Segments<'a> {
        Segments::with_separator(path, '/')
    }

    /// Iterates `path` with an explicit separator.
    #[must_use]
    pub fn with_separator(path: &'a str, separator: char) -> Segments<'a> {
        Segments {
            rest: path,
            separator,
        }
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let trimmed = self.rest.trim_start_matches(self.separator);
        if trimmed.is_empty() {
            self.rest = trimmed;
            return None;
        }
        match trimmed.find(self.separator) {
            Some(end) => {
                self.rest = &trimmed[end..];
                Some(&trimmed[..end])
            }
            None => {
                self.rest = "";
                Some(trimmed)
            }
        }
    }
}

/// Returns `true` if the path begins with the separator.
///
/// The distinction is informational only; all topics resolve against
/// the same root either way.
#[must_use]
pub fn is_absolute(path: &str, separator: char) -> bool {
    path.starts_with(separator)
}

/// Returns the last non-empty segment, or `""` for an empty path.
#[must_use]
pub fn last_segment(path: &str, separator: char) -> &str {
    Segments::with_separator(path, separator)
        .last()
        .unwrap_or("")
}

/// Returns the path with its last segment removed.
///
/// Trailing separators may remain; segment iteration ignores them.
#[must_use]
pub fn parent_of(path: &str, separator: char) -> &str {
    let mut start = 0;
    for segment in Segments::with_separator(path, separator) {
        start = segment.as_ptr() as usize - path.as_ptr() as usize;
    }
    &path[..start]
}

/// Appends the segments of `sub` to `base`, canonically separated.
pub fn join_into(base: &mut String, sub: &str, separator: char) {
    for segment in Segments::with_separator(sub, separator) {
        if !base.is_empty() {
            base.push(separator);
        }
        base.push_str(segment);
    }
}
