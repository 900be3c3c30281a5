//! Rendering of description templates.
//!
//! Placeholders are `{}` (next positional argument), `{N}` (positional
//! argument N) and `{name}` (named value), each optionally followed by
//! `[key]` or `.key` selectors that reach into nested values, e.g. `{1[0]}` or
//! `{2.sin_port}`. `{{` and `}}` produce literal braces. A trailing conversion
//! (`!r`) or format spec (`:>10`) is accepted and ignored.

use crate::trace::Val;
use crate::{Result, VoiceTraceError};
use indexmap::IndexMap;

/// Render `template` with positional and named values.
///
/// Fails when the template refers to a positional argument the line did not
/// have, an unknown name, or has unbalanced braces.
pub fn render(template: &str, positional: &[Val], named: &IndexMap<String, Val>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut next_auto = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut field = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    field.push(c);
                }
                if !closed {
                    return Err(template_error(format!("unclosed '{{' in {:?}", template)));
                }
                let value = resolve(&field, positional, named, &mut next_auto)?;
                out.push_str(&value.to_string());
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                    out.push('}');
                } else {
                    return Err(template_error(format!("single '}}' in {:?}", template)));
                }
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

fn template_error(msg: String) -> VoiceTraceError {
    VoiceTraceError::TemplateError(msg)
}

fn resolve<'v>(
    field: &str,
    positional: &'v [Val],
    named: &'v IndexMap<String, Val>,
    next_auto: &mut usize,
) -> Result<&'v Val> {
    let field = strip_conversion(field);
    let head_end = field.find(['[', '.']).unwrap_or(field.len());
    let (head, mut selectors) = field.split_at(head_end);

    let mut value = if head.is_empty() {
        let idx = *next_auto;
        *next_auto += 1;
        positional_arg(positional, idx)?
    } else if head.bytes().all(|b| b.is_ascii_digit()) {
        let idx = head
            .parse::<usize>()
            .map_err(|e| template_error(format!("bad argument index {:?}: {}", head, e)))?;
        positional_arg(positional, idx)?
    } else {
        named
            .get(head)
            .ok_or_else(|| template_error(format!("unknown placeholder {{{}}}", head)))?
    };

    while !selectors.is_empty() {
        if let Some(rest) = selectors.strip_prefix('[') {
            let end = rest
                .find(']')
                .ok_or_else(|| template_error(format!("missing ']' in {{{}}}", field)))?;
            value = value.lookup(&rest[..end]);
            selectors = &rest[end + 1..];
        } else if let Some(rest) = selectors.strip_prefix('.') {
            let end = rest.find(['[', '.']).unwrap_or(rest.len());
            value = value.lookup(&rest[..end]);
            selectors = &rest[end..];
        } else {
            return Err(template_error(format!("unexpected text in {{{}}}", field)));
        }
    }
    Ok(value)
}

fn positional_arg(positional: &[Val], idx: usize) -> Result<&Val> {
    positional.get(idx).ok_or_else(|| {
        template_error(format!(
            "template needs argument {} but the line has {}",
            idx,
            positional.len()
        ))
    })
}

/// Drop a `!conversion` or `:format` suffix that is not inside `[...]`.
fn strip_conversion(field: &str) -> &str {
    let mut depth = 0usize;
    for (i, c) in field.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '!' | ':' if depth == 0 => return &field[..i],
            _ => {}
        }
    }
    field
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<Val> {
        items.iter().map(|i| Val::from(*i)).collect()
    }

    fn named(pairs: &[(&str, &str)]) -> IndexMap<String, Val> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Val::from(*v)))
            .collect()
    }

    #[test]
    fn test_positional_and_named() {
        let out = render(
            "opened {0} with flags {2}, {succeeded}",
            &args(&["AT_FDCWD", "/etc/passwd", "O_RDONLY"]),
            &named(&[("succeeded", "succeeded")]),
        )
        .unwrap();
        assert_eq!(out, "opened AT_FDCWD with flags O_RDONLY, succeeded");
    }

    #[test]
    fn test_auto_numbering() {
        let out = render("{} then {}", &args(&["a", "b"]), &IndexMap::new()).unwrap();
        assert_eq!(out, "a then b");
    }

    #[test]
    fn test_escaped_braces_and_ignored_format_suffix() {
        let out = render("{{{0!s:>4}}}", &args(&["x"]), &IndexMap::new()).unwrap();
        assert_eq!(out, "{x}");
    }

    #[test]
    fn test_selectors_reach_into_nested_values() {
        let mut addr = IndexMap::new();
        addr.insert("sin_port".to_string(), Val::List(vec![Val::from("htons"), Val::from("80")]));
        let positional = vec![Val::from("3"), Val::Map(addr)];
        let out = render("fd {0} port {1[sin_port][1]} {1.missing}.", &positional, &IndexMap::new())
            .unwrap();
        assert_eq!(out, "fd 3 port 80 .");
    }

    #[test]
    fn test_too_few_arguments_is_an_error() {
        let err = render("{0} {3}", &args(&["a"]), &IndexMap::new()).unwrap_err();
        assert!(matches!(err, VoiceTraceError::TemplateError(_)));
    }

    #[test]
    fn test_unknown_name_and_bad_braces_are_errors() {
        assert!(render("{nope}", &[], &IndexMap::new()).is_err());
        assert!(render("open {0", &args(&["a"]), &IndexMap::new()).is_err());
        assert!(render("close }", &[], &IndexMap::new()).is_err());
        assert!(render("{0[1}", &args(&["a"]), &IndexMap::new()).is_err());
    }
}
