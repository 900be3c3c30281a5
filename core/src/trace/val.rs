//! Uniform value type for parsed syscall arguments.

use indexmap::IndexMap;
use std::fmt;
use std::ops::Index;

/// Empty scalar, the result of any failed lookup.
static EMPTY: Val = Val::Scalar(String::new());

/// A parsed argument: plain text, an ordered list, or a record of named fields.
///
/// Indexing never fails. A missing list slot, an absent map key, or any index
/// into a scalar yields an empty scalar, so templates can reach into nested
/// arguments without caring whether the line was fully understood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Val {
    Scalar(String),
    List(Vec<Val>),
    Map(IndexMap<String, Val>),
}

impl Val {
    pub fn scalar(text: impl Into<String>) -> Self {
        Val::Scalar(text.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Val::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Element `idx` of a list.
    pub fn item(&self, idx: usize) -> &Val {
        match self {
            Val::List(items) => items.get(idx).unwrap_or(&EMPTY),
            _ => &EMPTY,
        }
    }

    /// Field `key` of a map.
    pub fn field(&self, key: &str) -> &Val {
        match self {
            Val::Map(fields) => fields.get(key).unwrap_or(&EMPTY),
            _ => &EMPTY,
        }
    }

    /// Index by a textual key: digits select a list element, anything else a
    /// map field.
    pub fn lookup(&self, key: &str) -> &Val {
        match self {
            Val::List(_) => key.parse::<usize>().map_or(&EMPTY, |idx| self.item(idx)),
            Val::Map(_) => self.field(key),
            Val::Scalar(_) => &EMPTY,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Val::Scalar(_) => 0,
            Val::List(items) => items.len(),
            Val::Map(fields) => fields.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Val::Scalar(s) => s.is_empty(),
            other => other.len() == 0,
        }
    }

    /// Take the elements of a list; anything else becomes a single element.
    pub fn into_items(self) -> Vec<Val> {
        match self {
            Val::List(items) => items,
            other => vec![other],
        }
    }
}

impl Index<usize> for Val {
    type Output = Val;

    fn index(&self, idx: usize) -> &Val {
        self.item(idx)
    }
}

impl Index<&str> for Val {
    type Output = Val;

    fn index(&self, key: &str) -> &Val {
        self.lookup(key)
    }
}

impl From<&str> for Val {
    fn from(s: &str) -> Self {
        Val::Scalar(s.to_string())
    }
}

impl From<String> for Val {
    fn from(s: String) -> Self {
        Val::Scalar(s)
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Scalar(s) => f.write_str(s),
            Val::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Val::Map(fields) => {
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} {}", key, value)?;
                }
                Ok(())
            }
        }
    }
}
