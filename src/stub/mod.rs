//! The debug session: lifecycle, the packet loop, the thread registry, and
//! the command handlers hanging off it.

mod base;
mod breakpoints;
mod dispatch;
mod error;
mod query;
mod resume;

pub use error::RegistryError;

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::io;
use std::net::TcpListener;
use std::net::TcpStream;

use log::debug;
use log::warn;

use crate::common::ContextId;
use crate::common::Signal;
use crate::conn::ConnectionExt;
use crate::protocol::decode;
use crate::protocol::PeerClosed;
use crate::protocol::RecvEvent;
use crate::protocol::RecvPacketStateMachine;
use crate::protocol::ResponseWriter;
use crate::protocol::MAX_PACKET_SIZE;
use crate::sim::EventQueue;
use crate::sim::ThreadContext;
use crate::sim::TrapEvent;
use crate::target::Target;

use breakpoints::BreakpointTable;
use query::ProtocolFeatures;

/// A complete, validated unit of client input.
enum Input {
    /// A decoded packet payload.
    Packet(Vec<u8>),
    /// An asynchronous interrupt request (raw `0x03`).
    Interrupt,
}

/// One GDB debugging session, embedded in an event-driven simulator.
///
/// The stub owns the listening socket, the connected client (if any), the
/// registry of debuggable thread contexts, and the breakpoint table. It
/// runs entirely on the simulator's event-queue thread:
///
/// - While the simulator is halted under debugger control, the stub blocks
///   inside its packet loop, reading commands off the socket.
/// - A resume command (`c`, `s`, `vCont`) exits the packet loop and hands
///   control back to the simulator via [`EventQueue::resume`].
/// - While the simulator runs, the embedder must deliver socket readiness
///   to [`on_data_ready`](Self::on_data_ready) (so `Ctrl-C` is noticed) and
///   debug stops to [`trap`](Self::trap), which bounces through the event
///   queue into [`process_trap`](Self::process_trap) and back into the
///   packet loop.
///
/// Sessions survive their clients: a peer disappearing mid-packet detaches
/// the session and returns it to the listening state.
pub struct GdbStub<T: Target, E: EventQueue, C: ConnectionExt = TcpStream> {
    target: T,
    events: E,

    listener: Option<TcpListener>,
    conn: Option<C>,

    /// A client is connected.
    attached: bool,
    /// The simulator is halted with the client in control.
    active: bool,
    /// An `H` packet switched the current thread since the last stop; the
    /// next stop reply reports the switched-to thread.
    thread_switching: bool,

    threads: BTreeMap<ContextId, T::ThreadContext>,
    cur: Option<ContextId>,
    regcache: Option<T::RegCache>,

    bkpts: BreakpointTable,
    pending_trap: Option<TrapEvent>,
    single_stepping: bool,
    last_signal: Signal,

    recv: RecvPacketStateMachine,
    features: ProtocolFeatures,
    tinfo_pos: usize,
}

impl<T, E> GdbStub<T, E, TcpStream>
where
    T: Target,
    E: EventQueue,
{
    /// Bind the listening socket. A `port` of 0 binds an OS-assigned port;
    /// the bound port is returned so the embedder can register the
    /// listener with its poll set.
    pub fn listen(&mut self, port: u16) -> io::Result<u16> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        let port = listener.local_addr()?.port();
        // users grep for this line; keep it on stdout
        println!("Listening for remote gdb connection on port {}", port);
        self.listener = Some(listener);
        Ok(port)
    }

    /// Accept a pending connection and attach to it. Blocks if none is
    /// pending; embedders normally call this from an accept-ready poll
    /// callback. Does not return until the new client resumes the
    /// simulation or detaches.
    pub fn connect(&mut self) -> io::Result<()> {
        let listener = self.listener.as_ref().expect("listen() must precede connect()");
        let (stream, addr) = listener.accept()?;
        if self.attached {
            // a new client supersedes the old session
            self.detach();
        }
        debug!("accepted gdb connection from {}", addr);
        self.attach(stream);
        Ok(())
    }
}

impl<T, E, C> GdbStub<T, E, C>
where
    T: Target,
    E: EventQueue,
    C: ConnectionExt,
    C::Error: Debug,
{
    pub fn new(target: T, events: E) -> Self {
        GdbStub {
            target,
            events,
            listener: None,
            conn: None,
            attached: false,
            active: false,
            thread_switching: false,
            threads: BTreeMap::new(),
            cur: None,
            regcache: None,
            bkpts: BreakpointTable::default(),
            pending_trap: None,
            single_stepping: false,
            last_signal: Signal::SIGZERO,
            recv: RecvPacketStateMachine::new(),
            features: ProtocolFeatures::empty(),
            tinfo_pos: 0,
        }
    }

    /// A client is connected.
    pub fn attached(&self) -> bool {
        self.attached
    }

    /// The simulator is halted with the client in control.
    pub fn active(&self) -> bool {
        self.active
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    /// Id of the current thread context, if any context is registered.
    pub fn current_context(&self) -> Option<ContextId> {
        self.cur
    }

    /// Register a thread context under its own id. The first context
    /// registered becomes current.
    pub fn add_thread_context(&mut self, tc: T::ThreadContext) -> Result<ContextId, RegistryError> {
        let id = tc.context_id();
        if self.threads.contains_key(&id) {
            return Err(RegistryError::DuplicateContext(id));
        }
        self.threads.insert(id, tc);
        if self.cur.is_none() {
            self.cur = Some(id);
        }
        Ok(id)
    }

    /// Substitute a context in place, keeping its id - used when a thread
    /// migrates between CPU models.
    pub fn replace_thread_context(&mut self, tc: T::ThreadContext) -> Result<(), RegistryError> {
        let id = tc.context_id();
        match self.threads.get_mut(&id) {
            Some(slot) => {
                *slot = tc;
                if self.cur == Some(id) {
                    self.regcache = None;
                }
                Ok(())
            }
            None => Err(RegistryError::UnknownContext(id)),
        }
    }

    /// Make `id` the current thread context, invalidating the register
    /// cache so it is rebuilt for the new context's execution mode.
    pub fn select_thread_context(&mut self, id: ContextId) -> Result<(), RegistryError> {
        if !self.threads.contains_key(&id) {
            return Err(RegistryError::UnknownContext(id));
        }
        if self.cur != Some(id) {
            self.cur = Some(id);
            self.regcache = None;
        }
        Ok(())
    }

    /// Attach to a connected client: halt the simulator and service
    /// packets until the client resumes it or detaches.
    ///
    /// At least one thread context must be registered - attaching a
    /// debugger to a machine with no CPUs is a configuration bug in the
    /// embedder.
    pub fn attach(&mut self, mut conn: C) {
        assert!(
            !self.threads.is_empty(),
            "attach with no registered thread contexts"
        );
        if let Err(e) = conn.on_session_start() {
            warn!("session start hook failed: {:?}", e);
        }
        self.conn = Some(conn);
        self.attached = true;
        self.last_signal = Signal::SIGTRAP;
        self.features = ProtocolFeatures::empty();
        self.recv.reset();
        self.tinfo_pos = 0;
        self.events.halt();
        self.active = true;
        debug!("remote gdb attached");
        self.process_packets();
    }

    /// Tear the client session down and return to listening: clear the
    /// breakpoint table, cancel any pending single-step, drop the register
    /// cache and the connection, and set the simulator running free.
    ///
    /// Idempotent, and also the landing path for a vanished peer.
    pub fn detach(&mut self) {
        self.bkpts.clear(&mut self.threads);
        if self.single_stepping {
            self.single_stepping = false;
            if let Some(id) = self.cur {
                if let Some(tc) = self.threads.get_mut(&id) {
                    tc.deschedule_inst_commit_event();
                }
            }
        }
        self.regcache = None;
        self.pending_trap = None;
        self.thread_switching = false;
        self.recv.reset();
        self.conn = None;
        if self.attached {
            self.attached = false;
            debug!("remote gdb detached");
        }
        if self.active {
            self.active = false;
            self.events.resume();
        }
    }

    /// Read and dispatch packets until a resume command exits the loop or
    /// the session detaches.
    fn process_packets(&mut self) {
        loop {
            if !self.attached {
                return;
            }
            let input = match self.recv_packet() {
                Ok(input) => input,
                Err(PeerClosed(e)) => {
                    debug!("connection lost: {:?}", e);
                    self.detach();
                    return;
                }
            };
            let mut payload = match input {
                Input::Packet(payload) => payload,
                Input::Interrupt => {
                    // the client already has control; nothing to stop
                    debug!("interrupt while halted (ignored)");
                    continue;
                }
            };
            match self.dispatch(&mut payload) {
                Ok(true) => {}
                Ok(false) => return,
                Err(PeerClosed(e)) => {
                    debug!("connection lost: {:?}", e);
                    self.detach();
                    return;
                }
            }
        }
    }

    /// Blocking read of the next packet, acking good frames and nacking
    /// bad ones until a valid packet arrives.
    fn recv_packet(&mut self) -> Result<Input, PeerClosed<C::Error>> {
        loop {
            let byte = self
                .conn
                .as_mut()
                .expect("packet loop without a connection")
                .read()
                .map_err(PeerClosed)?;
            let event = match self.recv.pump(byte) {
                Some(event) => event,
                None => continue,
            };
            match event {
                RecvEvent::Interrupt => return Ok(Input::Interrupt),
                RecvEvent::Oversized => {
                    warn!("inbound packet exceeds {} bytes", MAX_PACKET_SIZE);
                    self.send_ack(b'-')?;
                }
                RecvEvent::Frame(raw) => match decode(&raw) {
                    Ok(payload) => {
                        self.send_ack(b'+')?;
                        return Ok(Input::Packet(payload));
                    }
                    Err(e) => {
                        warn!("bad packet: {}", e);
                        self.send_ack(b'-')?;
                    }
                },
            }
        }
    }

    fn send_ack(&mut self, ack: u8) -> Result<(), PeerClosed<C::Error>> {
        let conn = self.conn.as_mut().expect("packet loop without a connection");
        conn.write(ack).map_err(PeerClosed)?;
        conn.flush().map_err(PeerClosed)
    }

    /// Transmit a reply, retransmitting until the client acks it.
    pub(crate) fn send(&mut self, res: ResponseWriter) -> Result<(), PeerClosed<C::Error>> {
        let conn = self.conn.as_mut().expect("send without a connection");
        res.send(conn)
    }

    /// The current context id. Every handler that needs one runs with a
    /// client attached, and an attached session always has a current
    /// context - a miss here means the embedder corrupted the registry.
    pub(crate) fn cur_id(&self) -> ContextId {
        self.cur.expect("no current thread context registered")
    }
}
