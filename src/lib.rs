//! An implementation of the target side of the GDB Remote Serial Protocol
//! (RSP), designed to be embedded in event-driven CPU simulators.
//!
//! Unlike a general-purpose stub library, `simgdb` assumes the execution
//! model of a cycle-level simulator: everything runs on the simulator's
//! single event-queue thread, the target is "halted" whenever the stub is
//! blocking on the socket, and stops are reported by bouncing a trap
//! through the simulator's own event queue so that every stop reply lands
//! on a well-defined simulation tick.
//!
//! # Integration points
//!
//! An embedder provides three things:
//!
//! - a [`target::Target`] - the architecture port: register layout,
//!   memory-access validity, target-description XML;
//! - [`sim::ThreadContext`] handles - one per simulated architectural
//!   thread, giving the stub access to the PC, functional memory, and the
//!   CPU's instruction-address / instruction-commit debug hooks;
//! - a [`sim::EventQueue`] handle - run control plus the zero-delay
//!   `schedule_trap` re-entry primitive.
//!
//! and wires four calls into its event loop:
//!
//! - [`GdbStub::connect`] from the listener's accept-ready poll event;
//! - [`GdbStub::on_data_ready`] from the connection's data-ready poll
//!   event, so `Ctrl-C` is noticed while the simulation runs;
//! - [`GdbStub::trap`] from PC-hook and instruction-commit callbacks;
//! - [`GdbStub::process_trap`] from the event the queue schedules in
//!   response to [`sim::EventQueue::schedule_trap`].
//!
//! # Protocol surface
//!
//! The stub speaks the all-stop protocol: `?`, `g`/`G`, `m`/`M`/`X`,
//! `c`/`s` and `vCont`, `H`, `z`/`Z` (software and hardware breakpoints),
//! `D`/`k`, and the `qSupported` / `qXfer:features:read` / `qC` /
//! `qfThreadInfo`/`qsThreadInfo` / `qAttached` queries. Everything else
//! receives the empty `$#00` reply, which clients understand as "not
//! supported". Multi-process syntax, tracepoints, file I/O, reverse
//! execution, and non-stop mode are deliberately not spoken.

pub mod common;
pub mod conn;
mod protocol;
pub mod sim;
pub mod target;
mod stub;

pub use common::ContextId;
pub use common::Signal;
pub use common::Tick;
pub use stub::GdbStub;
pub use stub::RegistryError;
