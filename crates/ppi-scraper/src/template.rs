//! `{key}` placeholder substitution for `goto` URL templates.
//!
//! `{{` and `}}` produce literal braces. Every placeholder must name a known
//! key, and an unpaired brace of either kind is an error.

use std::collections::BTreeMap;

use crate::error::FlowError;

/// Substitute `{key}` placeholders in `template` from `vars`.
///
/// # Errors
///
/// Returns [`FlowError::Template`] when a placeholder names a missing key,
/// a brace is left unclosed or a `}` has no opening brace.
pub fn render_template(
    template: &str,
    vars: &BTreeMap<String, String>,
) -> Result<String, FlowError> {
    let template_error = |key: &str| FlowError::Template {
        template: template.to_owned(),
        key: key.to_owned(),
    };

    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(template_error("}")),
            '{' => {
                let mut key = String::new();
                let mut closed = false;
                for k in chars.by_ref() {
                    if k == '}' {
                        closed = true;
                        break;
                    }
                    key.push(k);
                }
                if !closed {
                    return Err(template_error(&key));
                }
                let value = vars.get(key.trim()).ok_or_else(|| template_error(&key))?;
                out.push_str(value);
            }
            other => out.push(other),
        }
    }

    Ok(out)
}
