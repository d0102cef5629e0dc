use crate::common::ContextId;
use core::fmt;

/// Recoverable per-command failures, converted to wire replies by the
/// dispatcher. Anything not representable here (a vanished peer, a violated
/// session invariant) is not a command error: the former detaches the
/// session, the latter is a bug in the embedding simulator and panics.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum CmdError {
    /// Malformed arguments or an out-of-range request (`E01`).
    BadRequest,
    /// Memory access refused by the port's access predicate or by
    /// functional memory (`E01`).
    AccessFault,
    /// Unknown qXfer annex (`E00`).
    BadAnnex,
    /// Recognized command with an unsupported sub-form (empty reply).
    Unsupported,
}

impl CmdError {
    /// The reply payload this error maps to.
    pub fn reply(&self) -> &'static str {
        match self {
            CmdError::BadRequest | CmdError::AccessFault => "E01",
            CmdError::BadAnnex => "E00",
            CmdError::Unsupported => "",
        }
    }
}

impl fmt::Display for CmdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmdError::BadRequest => f.write_str("malformed or out-of-range request"),
            CmdError::AccessFault => f.write_str("memory access refused"),
            CmdError::BadAnnex => f.write_str("no such annex"),
            CmdError::Unsupported => f.write_str("unsupported command form"),
        }
    }
}

/// Thread-registry misuse by the embedding simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// A context with this id is already registered.
    DuplicateContext(ContextId),
    /// No context with this id is registered.
    UnknownContext(ContextId),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateContext(id) => {
                write!(f, "thread context {} is already registered", id)
            }
            RegistryError::UnknownContext(id) => {
                write!(f, "no thread context {} is registered", id)
            }
        }
    }
}

impl std::error::Error for RegistryError {}
