use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Matches `${name}` where name contains no `$`, `{` or `}`.
static FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^${}]+)\}").expect("valid placeholder regex"));

/// Upper bound on substitution passes; a value that keeps producing
/// placeholders stops here.
const MAX_PASSES: usize = 64;

/// Substitute `${name}` placeholders from `vars`, unknown names becoming "".
///
/// Each pass takes the first placeholder in the string and replaces every
/// occurrence of that exact text, so substituted values are themselves
/// expanded on later passes.
pub fn expand(value: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = value.to_string();
    for _ in 0..MAX_PASSES {
        let (pattern, name) = match FIELD.captures(&out) {
            Some(caps) => (caps[0].to_string(), caps[1].to_string()),
            None => return out,
        };
        let replacement = vars.get(name.as_str()).map(String::as_str).unwrap_or("");
        debug!("Replace {} with {}", pattern, replacement);
        out = out.replace(&pattern, replacement);
    }
    if FIELD.is_match(&out) {
        warn!("Template still has placeholders after {} passes: {}", MAX_PASSES, value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&'static str, &str)]) -> HashMap<&'static str, String> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn test_plain_text_unchanged() {
        let m = vars(&[("a", "x")]);
        for s in ["", "hello", "$a", "{a}", "$ {a}", "${}", "cost: $5 {approx}"] {
            assert_eq!(expand(s, &m), s);
        }
    }

    #[test]
    fn test_repeated_placeholder() {
        assert_eq!(expand("${a}${a}", &vars(&[("a", "x")])), "xx");
    }

    #[test]
    fn test_missing_name_is_empty() {
        assert_eq!(expand("${missing}", &HashMap::new()), "");
        assert_eq!(expand("a${missing}b", &HashMap::new()), "ab");
    }

    #[test]
    fn test_dotted_names() {
        let m = vars(&[("feed.name", "Rust Blog"), ("item.link", "https://x/1")]);
        assert_eq!(
            expand("${feed.name}: ${item.link}", &m),
            "Rust Blog: https://x/1"
        );
    }

    #[test]
    fn test_icon_url() {
        let m = vars(&[("baseurl", "bots.example.com"), ("port", "8065")]);
        assert_eq!(
            expand("http://${baseurl}:${port}/static/icon.png", &m),
            "http://bots.example.com:8065/static/icon.png"
        );
    }

    #[test]
    fn test_values_are_expanded_again() {
        let m = vars(&[("a", "${b}!"), ("b", "done")]);
        assert_eq!(expand("${a}", &m), "done!");
    }

    #[test]
    fn test_self_reference_terminates() {
        let m = vars(&[("a", "<${a}>")]);
        let out = expand("${a}", &m);
        assert!(out.contains("${a}"));
        assert!(out.starts_with("<<<"));
    }
}
