use std::path::Path;

/// Looks up a `Content-Type` for `path` by extension, falling back to
/// `application/octet-stream` for anything unrecognized. Treated as an external collaborator
/// per the spec's non-goals; `mime_guess` is the corpus's own answer for this lookup (seen in
/// the retrieved `multipart` crate's dependency tree).
pub fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
