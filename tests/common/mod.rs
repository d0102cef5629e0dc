//! A miniature event-driven "simulator" for exercising the stub end to
//! end: shared-handle thread contexts, a recording event queue, and a toy
//! four-byte-instruction architecture port.

pub mod client;

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::convert::TryInto;
use std::rc::Rc;
use std::sync::mpsc;
use std::thread;

use simgdb::sim::EventQueue;
use simgdb::sim::MemFault;
use simgdb::sim::ThreadContext;
use simgdb::target::RegCache;
use simgdb::target::Target;
use simgdb::ContextId;
use simgdb::GdbStub;
use simgdb::Signal;
use simgdb::Tick;

pub fn init_logging() {
    let _ = pretty_env_logger::try_init();
}

pub struct Cpu {
    pub id: ContextId,
    pub regs: [u32; 8],
    pub pc: u32,
    pub mem: HashMap<u64, u8>,
    pub hooks: BTreeSet<u64>,
    pub commit_stop: Option<u64>,
}

/// Cheap shared handle, the way a real integration would wrap a pointer
/// into simulator-owned CPU state.
#[derive(Clone)]
pub struct TestCtx(pub Rc<RefCell<Cpu>>);

impl ThreadContext for TestCtx {
    fn context_id(&self) -> ContextId {
        self.0.borrow().id
    }

    fn pc(&self) -> u64 {
        self.0.borrow().pc as u64
    }

    fn set_pc(&mut self, pc: u64) {
        self.0.borrow_mut().pc = pc as u32;
    }

    fn read_mem(&self, addr: u64, buf: &mut [u8]) -> Result<(), MemFault> {
        let cpu = self.0.borrow();
        for (i, b) in buf.iter_mut().enumerate() {
            *b = cpu.mem.get(&(addr + i as u64)).copied().unwrap_or(0);
        }
        Ok(())
    }

    fn write_mem(&mut self, addr: u64, data: &[u8]) -> Result<(), MemFault> {
        let mut cpu = self.0.borrow_mut();
        for (i, b) in data.iter().enumerate() {
            cpu.mem.insert(addr + i as u64, *b);
        }
        Ok(())
    }

    fn install_pc_hook(&mut self, addr: u64) -> bool {
        self.0.borrow_mut().hooks.insert(addr)
    }

    fn remove_pc_hook(&mut self, addr: u64) -> bool {
        self.0.borrow_mut().hooks.remove(&addr)
    }

    fn schedule_inst_commit_event(&mut self, insts: u64) {
        self.0.borrow_mut().commit_stop = Some(insts);
    }

    fn deschedule_inst_commit_event(&mut self) {
        self.0.borrow_mut().commit_stop = None;
    }
}

pub struct QState {
    pub tick: Tick,
    pub halted: bool,
    pub trap_scheduled: bool,
}

#[derive(Clone)]
pub struct TestQueue(pub Rc<RefCell<QState>>);

impl EventQueue for TestQueue {
    fn now(&self) -> Tick {
        self.0.borrow().tick
    }

    fn schedule_trap(&mut self) {
        self.0.borrow_mut().trap_scheduled = true;
    }

    fn halt(&mut self) {
        self.0.borrow_mut().halted = true;
    }

    fn resume(&mut self) {
        self.0.borrow_mut().halted = false;
    }
}

/// Toy port: eight 32-bit registers plus the pc, little-endian, with a
/// flat "page table" that maps the first 32 KiB.
pub struct TestPort {
    pub xml: Option<String>,
}

pub struct TestRegCache {
    buf: [u8; 36],
}

impl RegCache<TestCtx> for TestRegCache {
    fn data(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    fn size(&self) -> usize {
        self.buf.len()
    }

    fn get_regs(&mut self, tc: &TestCtx) {
        let cpu = tc.0.borrow();
        for (i, r) in cpu.regs.iter().enumerate() {
            self.buf[i * 4..i * 4 + 4].copy_from_slice(&r.to_le_bytes());
        }
        self.buf[32..36].copy_from_slice(&cpu.pc.to_le_bytes());
    }

    fn set_regs(&self, tc: &mut TestCtx) {
        let mut cpu = tc.0.borrow_mut();
        for i in 0..8 {
            cpu.regs[i] = u32::from_le_bytes(self.buf[i * 4..i * 4 + 4].try_into().unwrap());
        }
        cpu.pc = u32::from_le_bytes(self.buf[32..36].try_into().unwrap());
    }
}

impl Target for TestPort {
    type ThreadContext = TestCtx;
    type RegCache = TestRegCache;

    const INST_SIZE: u64 = 4;

    fn gdb_regs(&self, _tc: &TestCtx) -> TestRegCache {
        TestRegCache { buf: [0; 36] }
    }

    fn acc(&self, _tc: &TestCtx, addr: u64, len: u64) -> bool {
        addr.checked_add(len).map(|end| end <= 0x8000).unwrap_or(false)
    }

    fn xfer_features_read(&self, annex: &str) -> Option<&str> {
        match (annex, &self.xml) {
            ("target.xml", Some(xml)) => Some(xml),
            _ => None,
        }
    }
}

pub struct SimConfig {
    pub ncpus: usize,
    pub start_pc: u32,
    pub xml: Option<String>,
    /// How many attach/detach cycles to serve before winding down.
    pub sessions: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            ncpus: 1,
            start_pc: 0x1000,
            xml: Some("<target version=\"1.0\"><architecture>test</architecture></target>".into()),
            sessions: 1,
        }
    }
}

/// Spin the simulator up on its own thread and hand back the listening
/// port.
pub fn spawn_sim(cfg: SimConfig) -> (u16, thread::JoinHandle<()>) {
    let (port_tx, port_rx) = mpsc::channel();
    let handle = thread::spawn(move || run_sim(cfg, port_tx));
    let port = port_rx.recv().expect("sim thread died before listening");
    (port, handle)
}

fn run_sim(cfg: SimConfig, port_tx: mpsc::Sender<u16>) {
    let queue = TestQueue(Rc::new(RefCell::new(QState {
        tick: 0,
        halted: false,
        trap_scheduled: false,
    })));
    let mut stub = GdbStub::new(TestPort { xml: cfg.xml }, queue.clone());

    let mut cpus = Vec::new();
    for id in 0..cfg.ncpus {
        let ctx = TestCtx(Rc::new(RefCell::new(Cpu {
            id,
            regs: core::array::from_fn(|i| (id * 0x100 + i * 0x11) as u32),
            pc: cfg.start_pc,
            mem: HashMap::new(),
            hooks: BTreeSet::new(),
            commit_stop: None,
        })));
        cpus.push(ctx.clone());
        stub.add_thread_context(ctx).unwrap();
    }

    let port = stub.listen(0).unwrap();
    port_tx.send(port).unwrap();

    for _ in 0..cfg.sessions {
        // blocks inside the packet loop until the client resumes the
        // "machine" or detaches
        stub.connect().unwrap();

        let mut spins: u64 = 0;
        while stub.attached() {
            stub.on_data_ready();
            if !stub.attached() {
                break;
            }

            if queue.0.borrow().trap_scheduled {
                queue.0.borrow_mut().trap_scheduled = false;
                stub.process_trap();
                // whichever way the packet loop exited, the machine must
                // have been set running again
                debug_assert!(!queue.0.borrow().halted);
                continue;
            }

            // one lock-step "instruction" per cpu
            let mut trap: Option<(ContextId, Signal)> = None;
            for ctx in &cpus {
                let mut cpu = ctx.0.borrow_mut();
                if cpu.hooks.contains(&(cpu.pc as u64)) {
                    // fetch hook fires before the instruction commits
                    trap = Some((cpu.id, Signal::SIGTRAP));
                    break;
                }
                cpu.pc = cpu.pc.wrapping_add(4);
                if let Some(n) = cpu.commit_stop {
                    if n <= 1 {
                        cpu.commit_stop = None;
                        trap = Some((cpu.id, Signal::SIGTRAP));
                        break;
                    }
                    cpu.commit_stop = Some(n - 1);
                }
            }
            queue.0.borrow_mut().tick += 1;
            if let Some((id, sig)) = trap {
                stub.trap(id, sig);
            }

            spins += 1;
            if spins > 50_000_000 {
                panic!("simulation ran away without a debugger stop");
            }
            if spins % 64 == 0 {
                thread::yield_now();
            }
        }
    }
}
