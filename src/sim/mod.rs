//! Contracts between the stub and the embedding simulator.
//!
//! The stub runs entirely on the simulator's event-queue thread: while the
//! simulator is halted it blocks inside the packet loop, and while the
//! simulator runs it is re-entered from poll callbacks and from trap
//! events. The simulator reaches into the stub through
//! [`GdbStub::trap`](crate::GdbStub::trap) and
//! [`GdbStub::process_trap`](crate::GdbStub::process_trap); the stub
//! reaches back out through the traits defined here.

use crate::common::ContextId;
use crate::common::Signal;
use crate::common::Tick;

/// A single-use trap record.
///
/// Armed by [`GdbStub::trap`](crate::GdbStub::trap) when a PC hook fires,
/// an instruction-commit event lands, or the client interrupts; consumed by
/// [`GdbStub::process_trap`](crate::GdbStub::process_trap) on the tick the
/// event queue re-enters the stub. At most one trap is pending at a time -
/// later traps arriving before delivery are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapEvent {
    /// The context that stopped.
    pub id: ContextId,
    /// Why it stopped.
    pub signal: Signal,
}

/// Hook into the simulator's event queue and run control.
///
/// `schedule_trap` is the zero-delay re-entry primitive: it must arrange
/// for [`GdbStub::process_trap`](crate::GdbStub::process_trap) to be
/// invoked at the *current* tick, once the simulator event that is
/// currently executing unwinds back to the queue. This is what pins stop
/// replies to a well-defined simulation tick, deterministically ordered
/// against other simulator events.
pub trait EventQueue {
    /// Current simulation tick.
    fn now(&self) -> Tick;

    /// Schedule a zero-delay call to
    /// [`GdbStub::process_trap`](crate::GdbStub::process_trap).
    fn schedule_trap(&mut self);

    /// Stop dispatching simulated-CPU work. Called on attach and on every
    /// trap delivery, before the stub starts blocking on the socket.
    fn halt(&mut self);

    /// Resume free-running simulation. Called when the client continues,
    /// steps, or detaches.
    fn resume(&mut self);
}

/// A functional memory access was refused by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemFault;

/// Simulator-side handle to one architectural thread: its register state,
/// its memory view, and the debug hooks of the CPU executing it.
///
/// Implementations are typically cheap handles (an index, or a shared
/// pointer) into simulator-owned state.
pub trait ThreadContext {
    /// Stable non-negative identifier of this context. On the wire this id
    /// appears as `context_id() + 1`.
    fn context_id(&self) -> ContextId;

    /// Current program counter.
    fn pc(&self) -> u64;

    /// Redirect execution, as requested by `c <addr>` / `s <addr>`.
    fn set_pc(&mut self, pc: u64);

    /// Functional (non-timing) read of `buf.len()` bytes of virtual
    /// memory.
    ///
    /// Only called after the port's access predicate admitted the range; a
    /// failure here still produces an error reply, with the request having
    /// no effect.
    fn read_mem(&self, addr: u64, buf: &mut [u8]) -> Result<(), MemFault>;

    /// Functional write of `data` to virtual memory. All-or-nothing: on
    /// failure no byte may have been written.
    fn write_mem(&mut self, addr: u64, data: &[u8]) -> Result<(), MemFault>;

    /// Install an instruction-address hook: when this context is about to
    /// execute the instruction at `addr`, the simulator must call
    /// [`GdbStub::trap`](crate::GdbStub::trap) with `SIGTRAP`.
    ///
    /// Hooks are keyed by address. Returns false if a hook was already
    /// installed at `addr` - the stub never double-installs, so this is
    /// purely informational.
    fn install_pc_hook(&mut self, addr: u64) -> bool;

    /// Remove a previously installed instruction-address hook. Returns
    /// false if no hook was installed at `addr`.
    fn remove_pc_hook(&mut self, addr: u64) -> bool;

    /// Arrange for a `SIGTRAP` trap after `insts` further instruction
    /// commits on this context. Used with `insts == 1` to single-step.
    fn schedule_inst_commit_event(&mut self, insts: u64);

    /// Cancel a pending instruction-commit trap, if any.
    fn deschedule_inst_commit_event(&mut self);
}
