//! Small shared helpers for XML and path handling.

/// Extract the local name from a potentially namespaced XML name
/// (`col:module` -> `module`).
pub fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

/// Decode bytes as UTF-8, substituting replacement characters for
/// malformed ranges. Handles a leading BOM. Returns the text together with
/// a flag indicating whether any range was malformed.
pub fn decode_text(bytes: &[u8]) -> (String, bool) {
    let (text, _, malformed) = encoding_rs::UTF_8.decode(bytes);
    (text.into_owned(), malformed)
}

/// Collapse whitespace runs (including newlines from pretty-printed XML)
/// into single spaces and trim the ends.
pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Join a relative reference onto a base directory within the archive,
/// resolving `.` and `..` segments. A reference starting with `/` resolves
/// from the archive root.
pub fn join_path(base: &str, rel: &str) -> String {
    let (mut parts, rel): (Vec<&str>, &str) = if let Some(stripped) = rel.strip_prefix('/') {
        (Vec::new(), stripped)
    } else if base.is_empty() {
        (Vec::new(), rel)
    } else {
        (base.split('/').collect(), rel)
    };
    for seg in rel.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

/// Expand an XML general-entity reference to its text. Named entities
/// beyond the XML built-ins expand to nothing.
pub fn expand_entity(name: &str) -> String {
    match name {
        "apos" => "'".into(),
        "quot" => "\"".into(),
        "lt" => "<".into(),
        "gt" => ">".into(),
        "amp" => "&".into(),
        _ => {
            if let Some(num) = name.strip_prefix('#') {
                let code = if let Some(hex) = num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                    u32::from_str_radix(hex, 16).ok()
                } else {
                    num.parse().ok()
                };
                if let Some(c) = code.and_then(char::from_u32) {
                    return c.to_string();
                }
            }
            String::new()
        }
    }
}

/// True when a reference points outside the archive (remote URL or inline
/// data). Such references are left untouched by asset resolution.
pub fn is_external_ref(src: &str) -> bool {
    src.starts_with("http://") || src.starts_with("https://") || src.starts_with("data:")
}
