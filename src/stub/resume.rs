//! The execution controller: resume commands (`c`, `s`, `vCont`), the
//! asynchronous interrupt path, and trap delivery from the simulator back
//! into the packet loop.

use core::fmt::Debug;

use log::debug;
use log::warn;

use crate::common::ContextId;
use crate::common::Signal;
use crate::conn::ConnectionExt;
use crate::protocol::common::hex::decode_hex;
use crate::protocol::common::thread_id::parse_id_selector;
use crate::protocol::common::thread_id::IdSelector;
use crate::protocol::PeerClosed;
use crate::protocol::RecvEvent;
use crate::protocol::ResponseWriter;
use crate::sim::EventQueue;
use crate::sim::ThreadContext;
use crate::sim::TrapEvent;
use crate::target::Target;

use super::dispatch::Context;
use super::error::CmdError;
use super::query::ProtocolFeatures;
use super::GdbStub;

fn parse_opt_addr(data: &[u8]) -> Result<Option<u64>, CmdError> {
    if data.is_empty() {
        Ok(None)
    } else {
        decode_hex(data).map(Some).map_err(|_| CmdError::BadRequest)
    }
}

impl<T, E, C> GdbStub<T, E, C>
where
    T: Target,
    E: EventQueue,
    C: ConnectionExt,
    C::Error: Debug,
{
    /// `c [addr]` - continue, optionally from a new program counter.
    pub(crate) fn cmd_cont(&mut self, ctx: &mut Context<'_>) -> Result<bool, CmdError> {
        let addr = parse_opt_addr(ctx.data)?;
        self.resume_execution(false, addr)
    }

    /// `s [addr]` - execute one instruction, optionally from a new program
    /// counter.
    pub(crate) fn cmd_step(&mut self, ctx: &mut Context<'_>) -> Result<bool, CmdError> {
        let addr = parse_opt_addr(ctx.data)?;
        self.resume_execution(true, addr)
    }

    /// `v...` multi-letter commands. `vCont` is the only one spoken;
    /// everything else - `vMustReplyEmpty` in particular - gets the empty
    /// reply.
    pub(crate) fn cmd_multi_letter(&mut self, ctx: &mut Context<'_>) -> Result<bool, CmdError> {
        let data: &[u8] = ctx.data;

        if data == b"Cont?" {
            ctx.reply.write_str("vCont;c;C;s;S");
            return Ok(true);
        }

        if let Some(actions) = data.strip_prefix(b"Cont;") {
            // every context resumes in lock-step, so the first action
            // decides what happens; remaining actions only refine which
            // threads it applies to, which is moot here
            let action = actions.split(|b| *b == b';').next().unwrap();
            let mut parts = action.split(|b| *b == b':');
            let kind = parts.next().unwrap();

            if let Some(tid) = parts.next() {
                if let Some(IdSelector::WithId(wire)) = parse_id_selector(tid) {
                    let prev = self.cur;
                    self.select_thread_context(wire - 1)
                        .map_err(|_| CmdError::BadRequest)?;
                    if prev != self.cur {
                        self.thread_switching = true;
                    }
                }
            }

            return match kind.first().copied() {
                Some(b'c') | Some(b'C') => self.resume_execution(false, None),
                Some(b's') | Some(b'S') => self.resume_execution(true, None),
                _ => Err(CmdError::Unsupported),
            };
        }

        Ok(true)
    }

    /// Exit the packet loop and set the simulator running. A step
    /// schedules the trap one instruction commit ahead; a continue cancels
    /// any commit event a previous step left behind.
    fn resume_execution(&mut self, step: bool, addr: Option<u64>) -> Result<bool, CmdError> {
        let id = self.cur_id();
        let tc = self
            .threads
            .get_mut(&id)
            .expect("current thread context not registered");
        if let Some(addr) = addr {
            tc.set_pc(addr);
        }
        if step {
            tc.schedule_inst_commit_event(1);
            self.single_stepping = true;
        } else if self.single_stepping {
            tc.deschedule_inst_commit_event();
            self.single_stepping = false;
        }
        debug!(
            "resuming simulation at tick {} ({})",
            self.events.now(),
            if step { "single-step" } else { "continue" }
        );
        self.active = false;
        self.events.resume();
        Ok(false)
    }

    /// Entry point for simulator callbacks - PC hooks, instruction-commit
    /// events, interrupt delivery. Records that `id` stopped with `signal`
    /// and requests re-entry from the event queue, so the stop is reported
    /// on a well-defined tick.
    ///
    /// Returns false if the trap was not taken (no client attached, or an
    /// unregistered context).
    pub fn trap(&mut self, id: ContextId, signal: Signal) -> bool {
        if !self.attached {
            return false;
        }
        if !self.threads.contains_key(&id) {
            warn!("trap for unregistered context {}", id);
            return false;
        }
        if let Some(pending) = self.pending_trap {
            debug!(
                "trap ({}) already pending, dropping {} for context {}",
                pending.signal, signal, id
            );
            return true;
        }
        debug!("context {} trapped with {}", id, signal);
        self.pending_trap = Some(TrapEvent { id, signal });
        self.events.schedule_trap();
        true
    }

    /// Deliver the pending trap. The embedder's event queue invokes this
    /// at the tick requested by [`EventQueue::schedule_trap`]; it halts
    /// the simulator, reports the stop, and services packets until the
    /// client resumes or detaches.
    pub fn process_trap(&mut self) {
        let ev = match self.pending_trap.take() {
            Some(ev) => ev,
            None => {
                debug!("spurious trap event");
                return;
            }
        };
        if !self.attached {
            return;
        }

        self.events.halt();
        self.active = true;

        let stepped = self.single_stepping;
        if self.single_stepping {
            self.single_stepping = false;
            let id = self.cur_id();
            if let Some(tc) = self.threads.get_mut(&id) {
                tc.deschedule_inst_commit_event();
            }
        }

        if self.thread_switching {
            // a pending `H` switch wins: the client asked to observe that
            // thread at the next stop
            self.thread_switching = false;
        } else if self.cur != Some(ev.id) {
            self.select_thread_context(ev.id)
                .expect("trapping context not registered");
        }

        self.last_signal = ev.signal;

        let id = self.cur_id();
        let mut res = ResponseWriter::new();
        res.write(b'T');
        res.write_hex(ev.signal.0);
        if ev.signal == Signal::SIGTRAP && !stepped {
            let pc = self
                .threads
                .get(&id)
                .expect("current thread context not registered")
                .pc();
            if self.bkpts.is_sw_break(pc) && self.features.contains(ProtocolFeatures::SWBREAK) {
                res.write_str("swbreak:;");
            } else if self.bkpts.is_hw_break(pc) && self.features.contains(ProtocolFeatures::HWBREAK)
            {
                res.write_str("hwbreak:;");
            }
        }
        res.write_str("thread:");
        res.write_num(id + 1);
        res.write(b';');

        debug!("reporting stop ({}) at tick {}", ev.signal, self.events.now());
        if let Err(PeerClosed(e)) = self.send(res) {
            debug!("connection lost: {:?}", e);
            self.detach();
            return;
        }
        self.process_packets();
    }

    /// Poll-driven entry while the simulator is running: drain whatever
    /// the client sent, honoring `0x03` interrupt requests and noticing a
    /// vanished peer. Never blocks.
    pub fn on_data_ready(&mut self) {
        if !self.attached || self.active {
            return;
        }
        loop {
            let conn = match self.conn.as_mut() {
                Some(conn) => conn,
                None => return,
            };
            let byte = match conn.peek() {
                Ok(Some(_)) => match conn.read() {
                    Ok(byte) => byte,
                    Err(e) => {
                        debug!("connection lost: {:?}", e);
                        self.detach();
                        return;
                    }
                },
                Ok(None) => return,
                Err(e) => {
                    debug!("connection lost: {:?}", e);
                    self.detach();
                    return;
                }
            };
            match self.recv.pump(byte) {
                Some(RecvEvent::Interrupt) => {
                    debug!("asynchronous interrupt from client");
                    let id = self.cur_id();
                    self.trap(id, Signal::SIGINT);
                }
                // all-stop: the client has no business sending commands
                // while the target runs
                Some(RecvEvent::Frame(_)) => warn!("dropping packet received while running"),
                Some(RecvEvent::Oversized) => {
                    warn!("dropping oversized packet received while running")
                }
                None => {}
            }
        }
    }
}
