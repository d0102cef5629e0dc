//! A scripted RSP client: just enough of the debugger side of the
//! protocol to drive scenarios against the stub.

use std::io::Read;
use std::io::Write;
use std::net::TcpStream;
use std::time::Duration;

use anyhow::Context as _;

pub struct Client {
    stream: TcpStream,
}

impl Client {
    pub fn connect(port: u16) -> anyhow::Result<Client> {
        let stream = TcpStream::connect(("127.0.0.1", port))
            .with_context(|| format!("connecting to stub on port {}", port))?;
        stream.set_nodelay(true)?;
        // a wedged stub should fail the test, not hang it
        stream.set_read_timeout(Some(Duration::from_secs(10)))?;

        let mut client = Client { stream };
        // gdb opens every session with a bare ack
        client.send_raw(b"+");
        Ok(client)
    }

    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).unwrap();
        self.stream.flush().unwrap();
    }

    pub fn read_byte(&mut self) -> u8 {
        let mut buf = [0u8];
        self.stream.read_exact(&mut buf).unwrap();
        buf[0]
    }

    /// The connection is gone (the stub detached and dropped it).
    pub fn expect_eof(&mut self) {
        let mut buf = [0u8];
        assert_eq!(self.stream.read(&mut buf).unwrap(), 0, "expected EOF");
    }

    pub fn frame(payload: &[u8]) -> Vec<u8> {
        let csum = payload.iter().fold(0u8, |a, x| a.wrapping_add(*x));
        let mut frame = vec![b'$'];
        frame.extend_from_slice(payload);
        frame.push(b'#');
        frame.extend_from_slice(format!("{:02x}", csum).as_bytes());
        frame
    }

    /// Send a framed packet and consume the stub's `+` ack.
    pub fn send_packet(&mut self, payload: &[u8]) {
        self.send_raw(&Self::frame(payload));
        let ack = self.read_byte();
        assert_eq!(
            ack,
            b'+',
            "stub rejected {:?}",
            String::from_utf8_lossy(payload)
        );
    }

    fn recv_frame(&mut self) -> Vec<u8> {
        while self.read_byte() != b'$' {}
        let mut payload = Vec::new();
        loop {
            match self.read_byte() {
                b'#' => break,
                b => payload.push(b),
            }
        }
        let digits = [self.read_byte(), self.read_byte()];
        let expected =
            u8::from_str_radix(core::str::from_utf8(&digits).unwrap(), 16).unwrap();
        let csum = payload.iter().fold(0u8, |a, x| a.wrapping_add(*x));
        assert_eq!(csum, expected, "reply checksum mismatch");
        payload
    }

    /// Receive one reply, verify its checksum, and ack it.
    pub fn recv_reply(&mut self) -> Vec<u8> {
        let payload = self.recv_frame();
        self.send_raw(b"+");
        payload
    }

    /// Receive a reply, nacking it `nacks` times first. Returns every
    /// received copy, retransmissions included.
    pub fn recv_reply_with_nacks(&mut self, nacks: usize) -> Vec<Vec<u8>> {
        let mut copies = Vec::new();
        for _ in 0..nacks {
            copies.push(self.recv_frame());
            self.send_raw(b"-");
        }
        copies.push(self.recv_frame());
        self.send_raw(b"+");
        copies
    }

    /// Round-trip helper: command out, reply payload back.
    pub fn request(&mut self, payload: &[u8]) -> Vec<u8> {
        self.send_packet(payload);
        self.recv_reply()
    }

    /// Undo `}`-escaping in a binary reply payload.
    pub fn unescape(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut iter = data.iter();
        while let Some(&b) = iter.next() {
            match b {
                b'}' => out.push(iter.next().expect("dangling escape") ^ 0x20),
                b => out.push(b),
            }
        }
        out
    }
}
