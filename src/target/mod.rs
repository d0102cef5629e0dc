//! The architecture-port contract: everything the stub cannot know about
//! the simulated machine.
//!
//! A port supplies the flat register layout GDB expects for this
//! architecture, the address-validity predicate guarding memory access, and
//! the feature strings / target-description XML advertised during
//! handshake. One port instance serves one session.

use crate::sim::ThreadContext;

/// Byte-buffer view of a thread's register file, in the flat little-endian
/// layout GDB expects for `g`/`G` packets.
///
/// A port with multiple execution modes (e.g: an AArch64 core that may be
/// running AArch32 code) typically makes this an enum of mode-specific
/// caches and picks the variant in [`Target::gdb_regs`]; the stub discards
/// the cache whenever the current thread changes, so a stale-mode buffer
/// never leaks across a switch.
pub trait RegCache<Tc: ThreadContext> {
    /// The raw register buffer.
    fn data(&mut self) -> &mut [u8];

    /// Size of the buffer in bytes. `g` replies encode exactly
    /// `2 * size()` hex digits.
    fn size(&self) -> usize;

    /// Repopulate the buffer from `tc`.
    fn get_regs(&mut self, tc: &Tc);

    /// Write the buffer back into `tc`.
    fn set_regs(&self, tc: &mut Tc);
}

/// The architecture port.
pub trait Target {
    /// Simulator handle type for one architectural thread.
    type ThreadContext: ThreadContext;

    /// Register marshalling buffer for this architecture.
    type RegCache: RegCache<Self::ThreadContext>;

    /// Width of one machine instruction, in bytes. The default breakpoint
    /// length check admits exactly this length.
    const INST_SIZE: u64;

    /// Fresh register cache matching `tc`'s current execution mode.
    fn gdb_regs(&self, tc: &Self::ThreadContext) -> Self::RegCache;

    /// Access-validity predicate for `[addr, addr + len)` - typically a
    /// page-table walk. Memory commands touching a range this refuses
    /// reply `E01` without side effects.
    fn acc(&self, tc: &Self::ThreadContext, addr: u64, len: u64) -> bool;

    /// Feature strings to add to the `qSupported` reply (e.g:
    /// `"qRelocInsn-"`). `PacketSize` and `qXfer:features:read+` are
    /// handled by the stub itself.
    fn available_features(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Target-description XML for `annex` (`target.xml` at minimum), or
    /// `None` when the annex does not exist. Returning `None` for every
    /// annex disables `qXfer:features:read` advertisement entirely.
    fn xfer_features_read(&self, annex: &str) -> Option<&str> {
        let _ = annex;
        None
    }

    /// Breakpoint length check, overridable by ports whose instructions
    /// come in more than one width.
    fn check_bp_len(&self, len: u64) -> bool {
        len == Self::INST_SIZE
    }
}
