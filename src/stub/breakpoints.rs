//! The breakpoint manager and the `z`/`Z` packet handlers.

use std::collections::BTreeMap;

use log::debug;

use crate::common::ContextId;
use crate::conn::ConnectionExt;
use crate::protocol::common::hex::decode_hex;
use crate::sim::EventQueue;
use crate::sim::ThreadContext;
use crate::target::Target;

use super::dispatch::Context;
use super::error::CmdError;
use super::GdbStub;

/// A software breakpoint, realized as an instruction-address hook on the
/// CPU that was current when the client planted it.
#[derive(Debug)]
struct SwBreakpoint {
    len: u64,
    ctx: ContextId,
}

/// A hardware breakpoint. A distinct type so that ports with architectural
/// breakpoint resources can tell the two apart in future; the default
/// mechanics are the same instruction-address hook.
#[derive(Debug)]
struct HardBreakpoint {
    len: u64,
    ctx: ContextId,
}

#[derive(Default)]
pub(crate) struct BreakpointTable {
    sw: BTreeMap<u64, SwBreakpoint>,
    hw: BTreeMap<u64, HardBreakpoint>,
}

impl BreakpointTable {
    // The underlying hook registry is keyed by address, so an address
    // carrying both a software and a hardware breakpoint on the same
    // context shares one hook. `other_holds` guards install/remove against
    // disturbing the sibling entry.
    fn insert_hook<Tc: ThreadContext>(
        threads: &mut BTreeMap<ContextId, Tc>,
        ctx: ContextId,
        addr: u64,
        other_holds: bool,
    ) {
        if other_holds {
            return;
        }
        let tc = threads.get_mut(&ctx).expect("current thread context not registered");
        tc.install_pc_hook(addr);
    }

    fn remove_hook<Tc: ThreadContext>(
        threads: &mut BTreeMap<ContextId, Tc>,
        ctx: ContextId,
        addr: u64,
        other_holds: bool,
    ) {
        if other_holds {
            return;
        }
        if let Some(tc) = threads.get_mut(&ctx) {
            tc.remove_pc_hook(addr);
        }
    }

    pub fn insert_sw<Tc: ThreadContext>(
        &mut self,
        threads: &mut BTreeMap<ContextId, Tc>,
        ctx: ContextId,
        addr: u64,
        len: u64,
    ) {
        if self.sw.contains_key(&addr) {
            debug!("software breakpoint at {:#x} already set", addr);
            return;
        }
        let shared = matches!(self.hw.get(&addr), Some(hw) if hw.ctx == ctx);
        Self::insert_hook(threads, ctx, addr, shared);
        self.sw.insert(addr, SwBreakpoint { len, ctx });
    }

    pub fn remove_sw<Tc: ThreadContext>(
        &mut self,
        threads: &mut BTreeMap<ContextId, Tc>,
        addr: u64,
        len: u64,
    ) -> Result<(), CmdError> {
        match self.sw.get(&addr) {
            Some(bp) if bp.len == len => {}
            _ => return Err(CmdError::BadRequest),
        }
        let bp = self.sw.remove(&addr).unwrap();
        let shared = matches!(self.hw.get(&addr), Some(hw) if hw.ctx == bp.ctx);
        Self::remove_hook(threads, bp.ctx, addr, shared);
        Ok(())
    }

    pub fn insert_hw<Tc: ThreadContext>(
        &mut self,
        threads: &mut BTreeMap<ContextId, Tc>,
        ctx: ContextId,
        addr: u64,
        len: u64,
    ) {
        if self.hw.contains_key(&addr) {
            debug!("hardware breakpoint at {:#x} already set", addr);
            return;
        }
        let shared = matches!(self.sw.get(&addr), Some(sw) if sw.ctx == ctx);
        Self::insert_hook(threads, ctx, addr, shared);
        self.hw.insert(addr, HardBreakpoint { len, ctx });
    }

    pub fn remove_hw<Tc: ThreadContext>(
        &mut self,
        threads: &mut BTreeMap<ContextId, Tc>,
        addr: u64,
        len: u64,
    ) -> Result<(), CmdError> {
        match self.hw.get(&addr) {
            Some(bp) if bp.len == len => {}
            _ => return Err(CmdError::BadRequest),
        }
        let bp = self.hw.remove(&addr).unwrap();
        let shared = matches!(self.sw.get(&addr), Some(sw) if sw.ctx == bp.ctx);
        Self::remove_hook(threads, bp.ctx, addr, shared);
        Ok(())
    }

    pub fn is_sw_break(&self, addr: u64) -> bool {
        self.sw.contains_key(&addr)
    }

    pub fn is_hw_break(&self, addr: u64) -> bool {
        self.hw.contains_key(&addr)
    }

    /// Drop every breakpoint and de-install its hook. Invoked on detach.
    pub fn clear<Tc: ThreadContext>(&mut self, threads: &mut BTreeMap<ContextId, Tc>) {
        for (addr, bp) in core::mem::take(&mut self.sw) {
            let shared = matches!(self.hw.get(&addr), Some(hw) if hw.ctx == bp.ctx);
            Self::remove_hook(threads, bp.ctx, addr, shared);
        }
        for (addr, bp) in core::mem::take(&mut self.hw) {
            Self::remove_hook(threads, bp.ctx, addr, false);
        }
    }
}

impl<T, E, C> GdbStub<T, E, C>
where
    T: Target,
    E: EventQueue,
    C: ConnectionExt,
    C::Error: core::fmt::Debug,
{
    /// `Z<type>,<addr>,<kind>` / `z<type>,<addr>,<kind>` - insert / remove
    /// a breakpoint. Types 0 and 1 (software and hardware breakpoints) are
    /// supported; watchpoint types 2-4 reply empty.
    pub(crate) fn cmd_breakpoint(&mut self, ctx: &mut Context<'_>) -> Result<bool, CmdError> {
        let mut args = ctx.data.split(|b| *b == b',');
        let ty = args.next().ok_or(CmdError::BadRequest)?;
        let addr: u64 = args
            .next()
            .and_then(|b| decode_hex(b).ok())
            .ok_or(CmdError::BadRequest)?;
        let len: u64 = args
            .next()
            .and_then(|b| decode_hex(b).ok())
            .ok_or(CmdError::BadRequest)?;

        let hw = match ty {
            b"0" => false,
            b"1" => true,
            b"2" | b"3" | b"4" => return Err(CmdError::Unsupported),
            _ => return Err(CmdError::BadRequest),
        };

        if !self.target.check_bp_len(len) {
            debug!("rejecting breakpoint of length {}", len);
            return Err(CmdError::BadRequest);
        }

        let cur = self.cur_id();
        match (ctx.cmd, hw) {
            (b'Z', false) => self.bkpts.insert_sw(&mut self.threads, cur, addr, len),
            (b'Z', true) => self.bkpts.insert_hw(&mut self.threads, cur, addr, len),
            (b'z', false) => self.bkpts.remove_sw(&mut self.threads, addr, len)?,
            (b'z', true) => self.bkpts.remove_hw(&mut self.threads, addr, len)?,
            _ => unreachable!("dispatched on first byte"),
        }

        ctx.reply.write_str("OK");
        Ok(true)
    }
}
