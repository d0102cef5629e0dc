//! End-to-end scenarios: a scripted GDB client driving the stub over
//! localhost TCP, with the mock simulator advancing on its own thread.

mod common;

use common::client::Client;
use common::init_logging;
use common::spawn_sim;
use common::SimConfig;

use std::thread;
use std::time::Duration;

#[test]
fn attach_read_detach() -> anyhow::Result<()> {
    init_logging();
    let (port, sim) = spawn_sim(SimConfig::default());
    let mut c = Client::connect(port)?;

    assert_eq!(c.request(b"?"), b"S05");

    let regs = c.request(b"g");
    assert_eq!(regs.len(), 72);
    // r1 of cpu 0 is seeded with 0x11, little-endian
    assert_eq!(&regs[8..16], b"11000000");

    assert_eq!(c.request(b"D"), b"OK");
    sim.join().unwrap();
    Ok(())
}

#[test]
fn memory_write_then_read() -> anyhow::Result<()> {
    init_logging();
    let (port, sim) = spawn_sim(SimConfig::default());
    let mut c = Client::connect(port)?;

    assert_eq!(c.request(b"M1000,4:deadbeef"), b"OK");
    assert_eq!(c.request(b"m1000,4"), b"deadbeef");

    // a range refused by the access predicate leaves memory untouched
    assert_eq!(c.request(b"M7ffe,4:deadbeef"), b"E01");
    assert_eq!(c.request(b"m7ffe,2"), b"0000");
    assert_eq!(c.request(b"mffff0000,4"), b"E01");

    // binary writes, including every escape-worthy byte
    c.send_packet(b"X2000,4:\x01\x02\x03\x04");
    assert_eq!(c.recv_reply(), b"OK");
    assert_eq!(c.request(b"m2000,4"), b"01020304");

    let mut bin = b"X3000,4:".to_vec();
    bin.extend_from_slice(&[0x7d, 0x03, 0x7d, 0x04, 0x7d, 0x5d, 0x7d, 0x0a]);
    assert_eq!(c.request(&bin), b"OK");
    assert_eq!(c.request(b"m3000,4"), b"23247d2a");

    // the zero-length probe gdb uses to detect X support
    assert_eq!(c.request(b"X4000,0:"), b"OK");

    assert_eq!(c.request(b"D"), b"OK");
    sim.join().unwrap();
    Ok(())
}

#[test]
fn breakpoint_and_continue() -> anyhow::Result<()> {
    init_logging();
    let (port, sim) = spawn_sim(SimConfig::default());
    let mut c = Client::connect(port)?;

    assert_eq!(c.request(b"Z0,4000,4"), b"OK");
    // planting the same breakpoint twice is fine
    assert_eq!(c.request(b"Z0,4000,4"), b"OK");
    // a length the architecture does not have is not
    assert_eq!(c.request(b"Z0,4000,2"), b"E01");

    c.send_packet(b"c");
    assert_eq!(c.recv_reply(), b"T05thread:1;");

    // the pc is parked exactly on the breakpoint address
    let regs = c.request(b"g");
    assert_eq!(&regs[64..72], b"00400000");

    assert_eq!(c.request(b"z0,4000,4"), b"OK");
    assert_eq!(c.request(b"z0,4000,4"), b"E01");

    // run free; closing the socket mid-run must detach cleanly
    c.send_packet(b"c");
    drop(c);
    sim.join().unwrap();
    Ok(())
}

#[test]
fn hardware_breakpoint() -> anyhow::Result<()> {
    init_logging();
    let (port, sim) = spawn_sim(SimConfig::default());
    let mut c = Client::connect(port)?;

    assert_eq!(c.request(b"Z1,1010,4"), b"OK");
    c.send_packet(b"c");
    assert_eq!(c.recv_reply(), b"T05thread:1;");
    assert_eq!(c.request(b"z1,1010,4"), b"OK");
    assert_eq!(c.request(b"z1,1010,4"), b"E01");

    // watchpoints are not spoken: empty reply, so gdb falls back
    assert_eq!(c.request(b"Z2,1010,4"), b"");

    assert_eq!(c.request(b"D"), b"OK");
    sim.join().unwrap();
    Ok(())
}

#[test]
fn breakpoint_stop_annotated_when_negotiated() -> anyhow::Result<()> {
    init_logging();
    let (port, sim) = spawn_sim(SimConfig::default());
    let mut c = Client::connect(port)?;

    let offers = c.request(b"qSupported:multiprocess+;swbreak+;hwbreak+");
    let offers = String::from_utf8(offers).unwrap();
    assert!(offers.contains("PacketSize=1000"), "{}", offers);
    assert!(offers.contains("swbreak+"), "{}", offers);
    assert!(offers.contains("qXfer:features:read+"), "{}", offers);

    assert_eq!(c.request(b"Z0,1010,4"), b"OK");
    c.send_packet(b"c");
    assert_eq!(c.recv_reply(), b"T05swbreak:;thread:1;");

    assert_eq!(c.request(b"D"), b"OK");
    sim.join().unwrap();
    Ok(())
}

#[test]
fn ctrl_c_interrupt() -> anyhow::Result<()> {
    init_logging();
    let (port, sim) = spawn_sim(SimConfig::default());
    let mut c = Client::connect(port)?;

    c.send_packet(b"c");
    thread::sleep(Duration::from_millis(50));
    c.send_raw(&[0x03]);
    assert_eq!(c.recv_reply(), b"T02thread:1;");

    // the interrupt is the signal `?` now reports
    assert_eq!(c.request(b"?"), b"S02");

    assert_eq!(c.request(b"D"), b"OK");
    sim.join().unwrap();
    Ok(())
}

#[test]
fn single_step() -> anyhow::Result<()> {
    init_logging();
    let (port, sim) = spawn_sim(SimConfig::default());
    let mut c = Client::connect(port)?;

    c.send_packet(b"s");
    assert_eq!(c.recv_reply(), b"T05thread:1;");
    let regs = c.request(b"g");
    assert_eq!(&regs[64..72], b"04100000");

    c.send_packet(b"vCont;s");
    assert_eq!(c.recv_reply(), b"T05thread:1;");
    let regs = c.request(b"g");
    assert_eq!(&regs[64..72], b"08100000");

    // step with a resume address
    c.send_packet(b"s2000");
    assert_eq!(c.recv_reply(), b"T05thread:1;");
    let regs = c.request(b"g");
    assert_eq!(&regs[64..72], b"04200000");

    assert_eq!(c.request(b"vCont?"), b"vCont;c;C;s;S");

    assert_eq!(c.request(b"D"), b"OK");
    sim.join().unwrap();
    Ok(())
}

#[test]
fn bad_checksum_recovers() -> anyhow::Result<()> {
    init_logging();
    let (port, sim) = spawn_sim(SimConfig::default());
    let mut c = Client::connect(port)?;

    c.send_raw(b"$?#00");
    assert_eq!(c.read_byte(), b'-');

    assert_eq!(c.request(b"?"), b"S05");

    assert_eq!(c.request(b"D"), b"OK");
    sim.join().unwrap();
    Ok(())
}

#[test]
fn reply_retransmits_until_acked() -> anyhow::Result<()> {
    init_logging();
    let (port, sim) = spawn_sim(SimConfig::default());
    let mut c = Client::connect(port)?;

    c.send_packet(b"?");
    let copies = c.recv_reply_with_nacks(2);
    assert_eq!(copies.len(), 3);
    for copy in &copies {
        assert_eq!(copy, b"S05");
    }

    // the session is none the worse for it
    assert_eq!(c.request(b"qC"), b"QC1");

    assert_eq!(c.request(b"D"), b"OK");
    sim.join().unwrap();
    Ok(())
}

#[test]
fn register_round_trip() -> anyhow::Result<()> {
    init_logging();
    let (port, sim) = spawn_sim(SimConfig::default());
    let mut c = Client::connect(port)?;

    let mut hex = String::new();
    for i in 0u32..8 {
        for b in (0x1000_0000 + i).to_le_bytes().iter() {
            hex.push_str(&format!("{:02x}", b));
        }
    }
    for b in 0x2000u32.to_le_bytes().iter() {
        hex.push_str(&format!("{:02x}", b));
    }

    let mut packet = b"G".to_vec();
    packet.extend_from_slice(hex.as_bytes());
    assert_eq!(c.request(&packet), b"OK");
    assert_eq!(c.request(b"g"), hex.as_bytes());

    // a short G blob is rejected
    assert_eq!(c.request(b"G1122"), b"E01");

    assert_eq!(c.request(b"D"), b"OK");
    sim.join().unwrap();
    Ok(())
}

#[test]
fn unknown_commands_reply_empty() -> anyhow::Result<()> {
    init_logging();
    let (port, sim) = spawn_sim(SimConfig::default());
    let mut c = Client::connect(port)?;

    assert_eq!(c.request(b"qFoo"), b"");
    assert_eq!(c.request(b"w00"), b"");
    assert_eq!(c.request(b"vMustReplyEmpty"), b"");

    assert_eq!(c.request(b"D"), b"OK");
    sim.join().unwrap();
    Ok(())
}

#[test]
fn thread_listing_and_switching() -> anyhow::Result<()> {
    init_logging();
    let (port, sim) = spawn_sim(SimConfig {
        ncpus: 3,
        ..Default::default()
    });
    let mut c = Client::connect(port)?;

    assert_eq!(c.request(b"qC"), b"QC1");
    assert_eq!(c.request(b"qfThreadInfo"), b"m1,2,3");
    assert_eq!(c.request(b"qsThreadInfo"), b"l");
    assert_eq!(c.request(b"qAttached"), b"1");

    assert_eq!(c.request(b"Hg3"), b"OK");
    assert_eq!(c.request(b"qC"), b"QC3");

    // registers now come from cpu 2 (r1 seeded with 0x211)
    let regs = c.request(b"g");
    assert_eq!(&regs[8..16], b"11020000");

    // the switch stays visible in the next stop reply
    c.send_packet(b"c");
    thread::sleep(Duration::from_millis(50));
    c.send_raw(&[0x03]);
    assert_eq!(c.recv_reply(), b"T02thread:3;");

    assert_eq!(c.request(b"Hg9"), b"E01");
    assert_eq!(c.request(b"Hc-1"), b"OK");

    assert_eq!(c.request(b"D"), b"OK");
    sim.join().unwrap();
    Ok(())
}

#[test]
fn qxfer_paging_reconstructs_document() -> anyhow::Result<()> {
    init_logging();
    let xml = format!(
        "<target version=\"1.0\"><architecture>test</architecture>{}</target>",
        "<!-- padding -->".repeat(160)
    );
    assert!(xml.len() > 2 * 0x400 && xml.len() <= 3 * 0x400);

    let (port, sim) = spawn_sim(SimConfig {
        xml: Some(xml.clone()),
        ..Default::default()
    });
    let mut c = Client::connect(port)?;

    let mut rebuilt = Vec::new();
    let mut offset = 0usize;
    let mut pages = 0;
    loop {
        let request = format!("qXfer:features:read:target.xml:{:x},400", offset);
        let reply = c.request(request.as_bytes());
        let (prefix, rest) = reply.split_first().unwrap();
        let chunk = Client::unescape(rest);
        offset += chunk.len();
        rebuilt.extend_from_slice(&chunk);
        pages += 1;
        match *prefix {
            b'm' => {}
            b'l' => break,
            p => panic!("bad page prefix {}", p),
        }
    }
    assert_eq!(pages, 3);
    assert_eq!(rebuilt, xml.as_bytes());

    // reading past the end is a bare 'l'
    assert_eq!(c.request(b"qXfer:features:read:target.xml:ffff,400"), b"l");
    // a missing annex is E00
    assert_eq!(c.request(b"qXfer:features:read:bogus.xml:0,400"), b"E00");

    assert_eq!(c.request(b"D"), b"OK");
    sim.join().unwrap();
    Ok(())
}

#[test]
fn kill_detaches_without_reply() -> anyhow::Result<()> {
    init_logging();
    let (port, sim) = spawn_sim(SimConfig::default());
    let mut c = Client::connect(port)?;

    c.send_packet(b"k");
    sim.join().unwrap();
    c.expect_eof();
    Ok(())
}

#[test]
fn reconnect_after_detach() -> anyhow::Result<()> {
    init_logging();
    let (port, sim) = spawn_sim(SimConfig {
        sessions: 2,
        ..Default::default()
    });

    let mut c = Client::connect(port)?;
    assert_eq!(c.request(b"Z0,4000,4"), b"OK");
    assert_eq!(c.request(b"D"), b"OK");
    drop(c);

    // a fresh client gets a fresh session: the old breakpoint is gone, so
    // removing it is an error
    let mut c = Client::connect(port)?;
    assert_eq!(c.request(b"?"), b"S05");
    assert_eq!(c.request(b"z0,4000,4"), b"E01");
    assert_eq!(c.request(b"D"), b"OK");
    sim.join().unwrap();
    Ok(())
}
