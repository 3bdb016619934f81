//! Path joining for source paths and external keys.

/// Join segments with `/`, then collapse `//` into `/` (one left-to-right pass).
///
/// `join(&["a/b", "/c"])` is `"a/b/c"`; `join::<&str>(&[])` is `""`.
pub fn join<S: AsRef<str>>(segments: &[S]) -> String {
    let joined = segments
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<&str>>()
        .join("/");
    joined.replace("//", "/")
}

/// Last non-empty segment of a slash-separated path, or the path itself.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').find(|s| !s.is_empty()).unwrap_or(path)
}
