//! Per-syscall hooks that can suppress narration or add named template values.

use crate::trace::{ParsedCall, Val};
use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::trace;

/// State shared by handlers across the lines of one watch session.
///
/// Owned by the [`Formatter`](crate::Formatter), so it is only ever touched
/// from the thread that formats lines.
#[derive(Debug, Default, Clone)]
pub struct HandlerState {
    open_sockets: HashSet<String>,
}

impl HandlerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open_socket(&self, fd: &str) -> bool {
        self.open_sockets.contains(fd)
    }

    pub fn open_socket_count(&self) -> usize {
        self.open_sockets.len()
    }
}

/// Syscalls that need special treatment before they are narrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialHandler {
    /// `socket`: remember the returned descriptor.
    Socket,
    /// `accept`/`accept4`: the returned connection is a socket too.
    Accept,
    /// `close`: only narrated when it closes a tracked socket.
    Close,
}

impl SpecialHandler {
    pub fn for_syscall(name: &str) -> Option<Self> {
        match name {
            "socket" => Some(SpecialHandler::Socket),
            "accept" | "accept4" => Some(SpecialHandler::Accept),
            "close" => Some(SpecialHandler::Close),
            _ => None,
        }
    }

    /// Run the hook. Returns `false` to suppress narration of this call.
    pub fn invoke(
        self,
        state: &mut HandlerState,
        call: &ParsedCall,
        extras: &mut IndexMap<String, Val>,
    ) -> bool {
        match self {
            SpecialHandler::Socket | SpecialHandler::Accept => {
                if succeeded(call) {
                    trace!(target: "handlers", fd = %call.ret, "Tracking open socket");
                    state.open_sockets.insert(call.ret.clone());
                }
                true
            }
            SpecialHandler::Close => {
                let fd = call.args[0].to_string();
                if succeeded(call) && state.open_sockets.remove(&fd) {
                    extras.insert("type".to_string(), Val::from("socket"));
                    true
                } else {
                    false
                }
            }
        }
    }
}

fn succeeded(call: &ParsedCall) -> bool {
    !call.ret.is_empty() && call.ret != "-1"
}
