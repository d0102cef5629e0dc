//! Types shared between the wire protocol, the session, and the simulator
//! contracts.

mod signal;

pub use signal::Signal;

/// Simulation time, in ticks of the embedding simulator's event queue.
pub type Tick = u64;

/// Stable non-negative identifier of a thread context within a session.
///
/// Wire-level thread ids are `ContextId + 1`: RSP ids are 1-based, with 0
/// reserved for "any thread" and -1 for "all threads".
pub type ContextId = usize;
