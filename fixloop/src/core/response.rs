//! Replacement source extraction from free-form agent replies.

use std::sync::LazyLock;

use regex::Regex;

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^(?P<indent>[ \t]*)```(?P<info>[^\n]*)\n(?P<body>(?s:.*?))^[ \t]*```[ \t]*\r?$",
    )
    .expect("fence regex is valid")
});

/// Pull the replacement source out of an agent reply.
///
/// Fenced blocks whose info string starts with `rust` or `rs` (any case,
/// attributes like `rust,ignore` allowed) or is empty are candidates; the
/// longest one wins. Fences may be indented, e.g. inside a list item; the
/// opening fence's indentation is stripped from the body. Blocks tagged with
/// another language (`text`, `diff`, ...) are ignored.
///
/// A reply without any fence is taken verbatim. A reply that has fences but
/// no usable block yields `None`, as does a blank result. The result always
/// ends with exactly one newline.
pub fn extract_source(response: &str) -> Option<String> {
    let fenced = FENCE_RE
        .captures_iter(response)
        .filter(|caps| is_rust_info(&caps["info"]))
        .map(|caps| dedent(&caps["body"], &caps["indent"]))
        .max_by_key(String::len);

    let body = match fenced {
        Some(body) => body.trim_start_matches(['\r', '\n']).trim_end().to_string(),
        None if response.contains("```") => return None,
        None => response.trim().to_string(),
    };
    if body.trim().is_empty() {
        return None;
    }
    Some(format!("{body}\n"))
}

fn is_rust_info(info: &str) -> bool {
    let lang = info
        .trim()
        .split(|c: char| c == ',' || c == '{' || c.is_whitespace())
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    matches!(lang.as_str(), "" | "rust" | "rs")
}

fn dedent(body: &str, indent: &str) -> String {
    if indent.is_empty() {
        return body.to_string();
    }
    body.lines()
        .map(|line| {
            line.strip_prefix(indent)
                .unwrap_or_else(|| line.trim_start_matches([' ', '\t']))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
