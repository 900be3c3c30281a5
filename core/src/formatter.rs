//! Turns one raw trace line into the sentence to be spoken.

use crate::handlers::{HandlerState, SpecialHandler};
use crate::lookup::DescriptionLookup;
use crate::template;
use crate::trace::{parse_call, syscall_name, Val};
use crate::Result;
use indexmap::IndexMap;
use tracing::trace;

/// Describe success or failure from the return value and trailing text.
///
/// `-1` is a failure, reported with the trailing errno text when there is
/// one. Anything else counts as success, with the trailing text as detail.
pub fn describe_outcome(ret: &str, err: &str) -> String {
    let err = err.trim();
    if ret == "-1" {
        if err.is_empty() {
            "failed with unknown error".to_string()
        } else {
            format!("failed with error {}", err)
        }
    } else if err.is_empty() {
        "succeeded".to_string()
    } else {
        format!("succeeded ({})", err)
    }
}

/// Formats trace lines for one watch session.
///
/// Holds the handler state (open sockets), so a fresh `Formatter` is needed
/// for each independent trace.
#[derive(Debug, Default)]
pub struct Formatter {
    state: HandlerState,
}

impl Formatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler_state(&self) -> &HandlerState {
        &self.state
    }

    /// Format `line` using the templates from `lookup`.
    ///
    /// `Ok(None)` means there is nothing to say: not a call, no template and
    /// no handler, or a handler vetoed it. An error means the line could not
    /// be rendered (template/argument mismatch) and should be skipped.
    pub fn format_line(
        &mut self,
        line: &str,
        lookup: &dyn DescriptionLookup,
    ) -> Result<Option<String>> {
        let Some(name) = syscall_name(line) else {
            return Ok(None);
        };
        let template = lookup.lookup(name);
        let handler = SpecialHandler::for_syscall(name);
        if template.is_none() && handler.is_none() {
            trace!(target: "formatter", syscall = name, "No description; ignoring");
            return Ok(None);
        }

        let Some(call) = parse_call(line) else {
            return Ok(None);
        };

        let mut extras = IndexMap::new();
        if let Some(handler) = handler {
            if !handler.invoke(&mut self.state, &call, &mut extras) {
                trace!(target: "formatter", syscall = %call.name, "Vetoed by handler");
                return Ok(None);
            }
        }
        let Some(template) = template else {
            return Ok(None);
        };

        let mut named = IndexMap::with_capacity(extras.len() + 2);
        named.insert("ret".to_string(), Val::from(call.ret.as_str()));
        named.insert(
            "succeeded".to_string(),
            Val::from(describe_outcome(&call.ret, &call.err)),
        );
        named.extend(extras);

        let positional = call.args.into_items();
        template::render(&template, &positional, &named).map(Some)
    }
}
