//! Command dispatch: the per-packet handler context, the single-byte
//! command table, and the `q`/`Q` sub-command table.

use core::fmt::Debug;

use log::debug;

use crate::conn::ConnectionExt;
use crate::protocol::PeerClosed;
use crate::protocol::ResponseWriter;
use crate::sim::EventQueue;
use crate::target::Target;

use super::error::CmdError;
use super::GdbStub;

/// Per-packet handler context.
pub(crate) struct Context<'a> {
    /// The command byte (first byte of the payload).
    pub cmd: u8,
    /// The rest of the payload. Handlers may decode hex or binary
    /// arguments in place.
    pub data: &'a mut [u8],
    /// The reply under construction, sent when the handler returns
    /// `Ok(true)`.
    pub reply: ResponseWriter,
}

/// A command handler.
///
/// `Ok(true)` sends the accumulated reply and returns to the packet loop;
/// `Ok(false)` sends nothing and exits the loop - the resume commands and
/// detach use this to hand control back to the simulator. Errors are
/// converted to their wire reply by [`GdbStub::dispatch`].
pub(crate) type Handler<T, E, C> =
    fn(&mut GdbStub<T, E, C>, &mut Context<'_>) -> Result<bool, CmdError>;

/// The single-byte command table.
///
/// Commands absent from this table get the empty `$#00` reply, which is how
/// the protocol spells "not supported".
pub(crate) fn command_handler<T, E, C>(cmd: u8) -> Option<Handler<T, E, C>>
where
    T: Target,
    E: EventQueue,
    C: ConnectionExt,
    C::Error: Debug,
{
    Some(match cmd {
        b'?' => GdbStub::cmd_signal,
        b'c' => GdbStub::cmd_cont,
        b's' => GdbStub::cmd_step,
        b'g' => GdbStub::cmd_reg_read,
        b'G' => GdbStub::cmd_reg_write,
        b'm' => GdbStub::cmd_mem_read,
        b'M' => GdbStub::cmd_mem_write,
        b'X' => GdbStub::cmd_mem_write_bin,
        b'H' => GdbStub::cmd_set_thread,
        b'D' => GdbStub::cmd_detach,
        b'k' => GdbStub::cmd_kill,
        b'q' => GdbStub::cmd_query,
        b'v' => GdbStub::cmd_multi_letter,
        b'z' | b'Z' => GdbStub::cmd_breakpoint,
        _ => return None,
    })
}

/// The `q` sub-command table, keyed by the token before the first
/// separator.
pub(crate) fn query_handler<T, E, C>(name: &[u8]) -> Option<Handler<T, E, C>>
where
    T: Target,
    E: EventQueue,
    C: ConnectionExt,
    C::Error: Debug,
{
    Some(match name {
        b"Supported" => GdbStub::query_supported,
        b"Xfer" => GdbStub::query_xfer,
        b"C" => GdbStub::query_current_thread,
        b"fThreadInfo" => GdbStub::query_thread_info_first,
        b"sThreadInfo" => GdbStub::query_thread_info_next,
        b"Attached" => GdbStub::query_attached,
        _ => return None,
    })
}

impl<T, E, C> GdbStub<T, E, C>
where
    T: Target,
    E: EventQueue,
    C: ConnectionExt,
    C::Error: Debug,
{
    /// Route one decoded payload to its handler and send whatever reply
    /// falls out. Returns `Ok(false)` when the packet loop must exit.
    pub(crate) fn dispatch(&mut self, payload: &mut [u8]) -> Result<bool, PeerClosed<C::Error>> {
        if payload.is_empty() {
            return self.send(ResponseWriter::new()).map(|_| true);
        }

        let (head, data) = payload.split_at_mut(1);
        let mut ctx = Context {
            cmd: head[0],
            data,
            reply: ResponseWriter::new(),
        };

        let status = match command_handler(ctx.cmd) {
            Some(handler) => handler(self, &mut ctx),
            None => {
                debug!("unsupported command {:?}", ctx.cmd as char);
                Ok(true)
            }
        };

        match status {
            Ok(true) => {
                let Context { reply, .. } = ctx;
                self.send(reply)?;
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(e) => {
                debug!("command {:?} failed: {}", ctx.cmd as char, e);
                let mut res = ResponseWriter::new();
                res.write_str(e.reply());
                self.send(res)?;
                Ok(true)
            }
        }
    }
}
