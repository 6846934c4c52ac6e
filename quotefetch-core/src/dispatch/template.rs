//! URL template rendering.
//!
//! Templates use `{name}` placeholders; `{{` and `}}` are literal braces.
//! Substituted values are percent-encoded as single path segments.

use crate::error::{PipelineError, Result};
use crate::record::Params;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Everything except RFC 3986 unreserved characters.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

/// Substitute every placeholder in `template` from `params`.
pub fn render(template: &str, params: &Params) -> Result<String> {
    let fail = |reason: String| PipelineError::Template {
        template: template.to_string(),
        reason,
    };

    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let rest = &template[i + 1..];
                let end = rest
                    .find('}')
                    .ok_or_else(|| fail(format!("unclosed placeholder at byte {i}")))?;
                let name = &rest[..end];
                if name.is_empty() || name.contains('{') {
                    return Err(fail(format!("malformed placeholder at byte {i}")));
                }
                let value = params
                    .get(name)
                    .ok_or_else(|| fail(format!("no parameter for placeholder '{name}'")))?;
                out.push_str(&encode_component(value));
                for _ in 0..=name.chars().count() {
                    chars.next();
                }
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    out.push('}');
                } else {
                    return Err(fail(format!("unmatched '}}' at byte {i}")));
                }
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

/// Join base URL and path with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Append `query` as an encoded query string (keys in sorted order).
pub fn append_query(url: &str, query: &Params) -> String {
    if query.is_empty() {
        return url.to_string();
    }
    let pairs: Vec<String> = query
        .iter()
        .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
        .collect();
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}{}", pairs.join("&"))
}
