//! Handlers for the register, memory, thread-selection, and session
//! commands: `?`, `g`, `G`, `m`, `M`, `X`, `H`, `D`, `k`.

use core::fmt::Debug;

use log::debug;
use log::info;

use crate::conn::ConnectionExt;
use crate::protocol::common::hex::decode_hex;
use crate::protocol::common::hex::decode_hex_buf;
use crate::protocol::common::thread_id::parse_id_selector;
use crate::protocol::common::thread_id::IdSelector;
use crate::protocol::unescape_binary;
use crate::protocol::PeerClosed;
use crate::protocol::ResponseWriter;
use crate::protocol::MAX_PACKET_SIZE;
use crate::sim::EventQueue;
use crate::sim::ThreadContext;
use crate::target::RegCache;
use crate::target::Target;

use super::dispatch::Context;
use super::error::CmdError;
use super::GdbStub;

/// Split `<addr>,<len>` into its two hex fields.
fn parse_addr_len(data: &[u8]) -> Result<(u64, u64), CmdError> {
    let mut args = data.split(|b| *b == b',');
    let addr = args
        .next()
        .and_then(|b| decode_hex(b).ok())
        .ok_or(CmdError::BadRequest)?;
    let len = args
        .next()
        .and_then(|b| decode_hex(b).ok())
        .ok_or(CmdError::BadRequest)?;
    Ok((addr, len))
}

impl<T, E, C> GdbStub<T, E, C>
where
    T: Target,
    E: EventQueue,
    C: ConnectionExt,
    C::Error: Debug,
{
    /// `?` - report the signal the target last stopped with.
    pub(crate) fn cmd_signal(&mut self, ctx: &mut Context<'_>) -> Result<bool, CmdError> {
        ctx.reply.write(b'S');
        ctx.reply.write_hex(self.last_signal.0);
        Ok(true)
    }

    /// `g` - read all registers as one hex blob.
    pub(crate) fn cmd_reg_read(&mut self, ctx: &mut Context<'_>) -> Result<bool, CmdError> {
        let id = self.cur_id();
        let tc = self
            .threads
            .get(&id)
            .expect("current thread context not registered");
        if self.regcache.is_none() {
            self.regcache = Some(self.target.gdb_regs(tc));
        }
        let cache = self.regcache.as_mut().unwrap();
        cache.get_regs(tc);
        ctx.reply.write_hex_buf(cache.data());
        Ok(true)
    }

    /// `G<hex>` - write all registers from one hex blob.
    pub(crate) fn cmd_reg_write(&mut self, ctx: &mut Context<'_>) -> Result<bool, CmdError> {
        let id = self.cur_id();
        if self.regcache.is_none() {
            let tc = self
                .threads
                .get(&id)
                .expect("current thread context not registered");
            self.regcache = Some(self.target.gdb_regs(tc));
        }

        let cache = self.regcache.as_mut().unwrap();
        let bytes = decode_hex_buf(ctx.data).map_err(|_| CmdError::BadRequest)?;
        if bytes.len() != cache.size() {
            debug!(
                "G packet with {} bytes, register file has {}",
                bytes.len(),
                cache.size()
            );
            return Err(CmdError::BadRequest);
        }
        cache.data().copy_from_slice(bytes);

        let cache = self.regcache.as_ref().unwrap();
        cache.set_regs(
            self.threads
                .get_mut(&id)
                .expect("current thread context not registered"),
        );
        ctx.reply.write_str("OK");
        Ok(true)
    }

    /// Access-checked functional read. All-or-nothing: a refused range
    /// reads no bytes.
    fn mem_read(&mut self, addr: u64, len: u64) -> Result<Vec<u8>, CmdError> {
        if len as usize > MAX_PACKET_SIZE {
            return Err(CmdError::BadRequest);
        }
        let id = self.cur_id();
        let tc = self
            .threads
            .get(&id)
            .expect("current thread context not registered");
        if !self.target.acc(tc, addr, len) {
            debug!("rejecting read of {:#x},{}", addr, len);
            return Err(CmdError::AccessFault);
        }
        let mut buf = vec![0; len as usize];
        tc.read_mem(addr, &mut buf).map_err(|_| CmdError::AccessFault)?;
        Ok(buf)
    }

    /// Access-checked functional write. All-or-nothing: a refused range
    /// leaves memory unchanged.
    fn mem_write(&mut self, addr: u64, data: &[u8]) -> Result<(), CmdError> {
        let id = self.cur_id();
        let tc = self
            .threads
            .get_mut(&id)
            .expect("current thread context not registered");
        if !self.target.acc(tc, addr, data.len() as u64) {
            debug!("rejecting write of {:#x},{}", addr, data.len());
            return Err(CmdError::AccessFault);
        }
        tc.write_mem(addr, data).map_err(|_| CmdError::AccessFault)
    }

    /// `m<addr>,<len>` - read memory.
    pub(crate) fn cmd_mem_read(&mut self, ctx: &mut Context<'_>) -> Result<bool, CmdError> {
        let (addr, len) = parse_addr_len(ctx.data)?;
        let buf = self.mem_read(addr, len)?;
        ctx.reply.write_hex_buf(&buf);
        Ok(true)
    }

    /// `M<addr>,<len>:<hex>` - write memory.
    pub(crate) fn cmd_mem_write(&mut self, ctx: &mut Context<'_>) -> Result<bool, CmdError> {
        let colon = ctx
            .data
            .iter()
            .position(|b| *b == b':')
            .ok_or(CmdError::BadRequest)?;
        let (args, payload) = ctx.data.split_at_mut(colon);
        let (addr, len) = parse_addr_len(args)?;
        let bytes = decode_hex_buf(&mut payload[1..]).map_err(|_| CmdError::BadRequest)?;
        if bytes.len() as u64 != len {
            return Err(CmdError::BadRequest);
        }
        let bytes = &*bytes;
        self.mem_write(addr, bytes)?;
        ctx.reply.write_str("OK");
        Ok(true)
    }

    /// `X<addr>,<len>:<binary>` - write memory from escaped binary data.
    /// The zero-length probe GDB uses to detect `X` support replies `OK`
    /// without touching memory.
    pub(crate) fn cmd_mem_write_bin(&mut self, ctx: &mut Context<'_>) -> Result<bool, CmdError> {
        let colon = ctx
            .data
            .iter()
            .position(|b| *b == b':')
            .ok_or(CmdError::BadRequest)?;
        let (args, payload) = ctx.data.split_at_mut(colon);
        let (addr, len) = parse_addr_len(args)?;
        let bytes = unescape_binary(&mut payload[1..]).map_err(|_| CmdError::BadRequest)?;
        if bytes.len() as u64 != len {
            return Err(CmdError::BadRequest);
        }
        if len > 0 {
            let bytes = &*bytes;
            self.mem_write(addr, bytes)?;
        }
        ctx.reply.write_str("OK");
        Ok(true)
    }

    /// `H<op><id>` - set the current thread. `g` selects the context used
    /// by register and memory commands; `c` is accepted and ignored, since
    /// all contexts resume in lock-step anyway.
    pub(crate) fn cmd_set_thread(&mut self, ctx: &mut Context<'_>) -> Result<bool, CmdError> {
        if ctx.data.is_empty() {
            return Err(CmdError::BadRequest);
        }
        let op = ctx.data[0];
        let sel = parse_id_selector(&ctx.data[1..]).ok_or(CmdError::BadRequest)?;

        match (op, sel) {
            (b'c', _) => {}
            (b'g', IdSelector::All) | (b'g', IdSelector::Any) => {}
            (b'g', IdSelector::WithId(wire)) => {
                let prev = self.cur;
                self.select_thread_context(wire - 1)
                    .map_err(|_| CmdError::BadRequest)?;
                if prev != self.cur {
                    self.thread_switching = true;
                }
            }
            _ => return Err(CmdError::Unsupported),
        }

        ctx.reply.write_str("OK");
        Ok(true)
    }

    /// `D` - detach. The `OK` goes out before the connection does.
    pub(crate) fn cmd_detach(&mut self, _ctx: &mut Context<'_>) -> Result<bool, CmdError> {
        let mut res = ResponseWriter::new();
        res.write_str("OK");
        if let Err(PeerClosed(e)) = self.send(res) {
            debug!("peer vanished during detach: {:?}", e);
        }
        self.detach();
        Ok(false)
    }

    /// `k` - kill. Treated exactly like a detach: the simulated machine
    /// outlives its debugger, so there is nothing to kill and no reply to
    /// send.
    pub(crate) fn cmd_kill(&mut self, _ctx: &mut Context<'_>) -> Result<bool, CmdError> {
        info!("kill request treated as detach; the simulator keeps running");
        self.detach();
        Ok(false)
    }
}
