use once_cell::sync::Lazy;
use regex::Regex;

/// Characters Windows refuses in path components, plus ASCII control codes.
static RESERVED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).expect("reserved-character pattern is valid"));

/// Replaces every reserved character with `_` so the result can be used as a
/// single directory name on any host.
pub fn sanitize(name: &str) -> String {
    RESERVED.replace_all(name, "_").into_owned()
}
