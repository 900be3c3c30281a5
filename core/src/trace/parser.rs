//! Best-effort recursive-descent parser for strace's default line format.
//!
//! ```text
//! expr   := string | array | struct-or-array | bare
//! string := '"' (escaped-char | char)* '"'
//! array  := '[' (expr (',' expr)*)? ']'
//! struct := '{' field (',' field)* '}'
//! field  := ident '=' expr
//! bare   := token-until(terminators), optionally followed by '(' args ')'
//! ```
//!
//! Every rule receives the set of characters that ends it. Rules stop in front
//! of a terminator without consuming it, and anything they do not understand
//! is skipped up to the next terminator. Parsing never fails; a malformed line
//! produces an approximate value instead.

use super::stream::{Stream, WHITESPACE};
use super::val::Val;
use indexmap::IndexMap;

const STRUCT_SYNC: &str = ",}";
const CLOSERS: &str = ")]}";
/// Nesting deeper than this is kept as plain text.
const MAX_DEPTH: usize = 256;

/// One syscall line broken into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCall {
    pub name: String,
    /// Always a `Val::List`.
    pub args: Val,
    /// Return value token, empty when the line has no `=`.
    pub ret: String,
    /// Free text after the return value (errno name, annotations).
    pub err: String,
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Leading identifier of a line that looks like a call (`name(`), if any.
pub fn syscall_name(line: &str) -> Option<&str> {
    let mut s = Stream::new(line);
    s.start_token();
    if s.eat_while_matching(is_ident_char) == 0 {
        return None;
    }
    let name = s.current_token();
    s.skip_whitespace();
    if s.eat("(") {
        Some(name)
    } else {
        None
    }
}

/// Parse a complete `name(args...) = ret err` line.
///
/// Returns `None` for lines that are not calls at all (signal notices, exit
/// messages, resumed fragments).
pub fn parse_call(line: &str) -> Option<ParsedCall> {
    let line = line.trim_end_matches(['\n', '\r']);
    let mut s = Stream::new(line);
    s.start_token();
    if s.eat_while_matching(is_ident_char) == 0 {
        return None;
    }
    let name = s.current_token().to_string();
    if !s.eat_token("(") {
        return None;
    }

    let args = parse_list(&mut s, ')');

    s.eat_until("=");
    if !s.eat("=") {
        return Some(ParsedCall {
            name,
            args,
            ret: String::new(),
            err: String::new(),
        });
    }

    s.start_token();
    s.eat_until(WHITESPACE);
    let ret = s.current_token().to_string();
    s.skip_whitespace();
    let err = s.rest().trim_end().to_string();

    Some(ParsedCall {
        name,
        args,
        ret,
        err,
    })
}

/// Parse any expression, stopping in front of a character from `term`.
pub fn parse_expr(s: &mut Stream<'_>, term: &str) -> Val {
    parse_expr_at(s, term, 0)
}

fn parse_expr_at(s: &mut Stream<'_>, term: &str, depth: usize) -> Val {
    s.skip_whitespace();
    if depth >= MAX_DEPTH {
        // Too deep to follow: keep the text and let the enclosing levels close.
        s.start_token();
        s.eat_until(&format!("{}{}", term, CLOSERS));
        return Val::Scalar(s.current_token().trim_end().to_string());
    }
    let val = match s.peek() {
        Some('"') => parse_string(s),
        Some('[') => {
            s.advance();
            parse_list_at(s, ']', depth + 1)
        }
        Some('{') => {
            s.advance();
            parse_struct_or_array(s, depth + 1)
        }
        _ => return parse_bare(s, term, depth),
    };
    // Trailing noise such as the `...` after a truncated string.
    skip_noise(s, term);
    val
}

/// Parse a quoted string starting at the opening `"`.
///
/// The result holds the unescaped contents: `\"` and `\\` become `"` and `\`,
/// other escape sequences are kept as written. An unterminated string runs to
/// the end of the line.
pub fn parse_string(s: &mut Stream<'_>) -> Val {
    if !s.eat("\"") {
        return Val::scalar("");
    }
    let mut out = String::new();
    let mut escaped = false;
    while let Some(c) = s.advance() {
        if escaped {
            if c != '"' && c != '\\' {
                out.push('\\');
            }
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            return Val::Scalar(out);
        } else {
            out.push(c);
        }
    }
    if escaped {
        out.push('\\');
    }
    Val::Scalar(out)
}

/// Inverse of the unescaping done by [`parse_string`].
pub fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Parse comma-separated expressions up to and including `close`.
pub fn parse_list(s: &mut Stream<'_>, close: char) -> Val {
    parse_list_at(s, close, 0)
}

fn parse_list_at(s: &mut Stream<'_>, close: char, depth: usize) -> Val {
    let mut close_buf = [0u8; 4];
    let close_set: &str = close.encode_utf8(&mut close_buf);
    let term = format!(",{}", close);

    let mut items = Vec::new();
    loop {
        s.skip_whitespace();
        if s.at_end() || s.eat(close_set) {
            break;
        }
        items.push(parse_expr_at(s, &term, depth));
        s.skip_whitespace();
        if s.eat(",") {
            continue;
        }
        if s.eat(close_set) || s.at_end() || at_closer(s) {
            break;
        }
        // Not reachable through parse_expr, which always stops on `term`,
        // but guarantees progress.
        s.advance();
    }
    Val::List(items)
}

/// After a `{`: a struct if the first entry looks like `name=value`,
/// otherwise a list closed by `}`.
fn parse_struct_or_array(s: &mut Stream<'_>, depth: usize) -> Val {
    if starts_with_field(*s) {
        parse_struct(s, depth)
    } else {
        parse_list_at(s, '}', depth)
    }
}

fn starts_with_field(mut s: Stream<'_>) -> bool {
    s.skip_whitespace();
    s.eat_while_matching(is_ident_char) > 0 && s.eat_token("=")
}

fn parse_field(s: &mut Stream<'_>, term: &str, depth: usize) -> Option<(String, Val)> {
    s.start_token();
    if s.eat_while_matching(is_ident_char) == 0 {
        return None;
    }
    let name = s.current_token().to_string();
    if !s.eat_token("=") {
        return None;
    }
    Some((name, parse_expr_at(s, term, depth)))
}

/// Fields up to and including the closing `}`. Entries that are not
/// `name=value` (strace's `...` among them) are skipped.
fn parse_struct(s: &mut Stream<'_>, depth: usize) -> Val {
    let mut fields = IndexMap::new();
    loop {
        s.skip_whitespace();
        if s.at_end() || s.eat("}") {
            break;
        }
        let mark = *s;
        match parse_field(s, STRUCT_SYNC, depth) {
            Some((name, value)) => {
                fields.insert(name, value);
            }
            None => {
                *s = mark;
                parse_expr_at(s, STRUCT_SYNC, depth);
            }
        }
        s.skip_whitespace();
        if s.eat(",") {
            continue;
        }
        if s.eat("}") || s.at_end() || at_closer(s) {
            break;
        }
        s.advance();
    }
    Val::Map(fields)
}

/// Unquoted text up to a terminator. Text directly followed by `(` is a
/// nested call and becomes a list of the callee name and its arguments.
fn parse_bare(s: &mut Stream<'_>, term: &str, depth: usize) -> Val {
    let stop = format!("{}(", term);
    s.start_token();
    s.eat_until(&stop);
    let text = s.current_token().trim_end().to_string();
    if !s.eat("(") {
        return Val::Scalar(text);
    }

    let mut call = vec![Val::Scalar(text)];
    call.extend(parse_list_at(s, ')', depth + 1).into_items());
    skip_noise(s, term);
    Val::List(call)
}

/// Skip to the next terminator, stopping early at a bracket that closes an
/// enclosing level.
fn skip_noise(s: &mut Stream<'_>, term: &str) {
    s.eat_until(&format!("{}{}", term, CLOSERS));
}

/// A closing bracket that belongs to an enclosing level.
fn at_closer(s: &Stream<'_>) -> bool {
    matches!(s.peek(), Some(c) if CLOSERS.contains(c))
}
