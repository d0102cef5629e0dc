use super::PeerClosed;
use crate::conn::ConnectionExt;
use log::debug;
use log::trace;
use num_traits::PrimInt;

/// Accumulates a reply payload and transmits it as a `$<body>#<hh>` frame.
///
/// Bytes written through [`write_binary`](Self::write_binary) are
/// `}`-escaped; everything else (text and hex digits) never contains a
/// special byte and is stored verbatim. Run-length encoding is accepted on
/// input but never produced here.
///
/// [`send`](Self::send) retransmits the frame until the client acks it with
/// `+`; a `-` restarts the transmission. Retransmission is unbounded, but
/// bounded in practice by peer liveness - a vanished peer surfaces as
/// [`PeerClosed`].
pub struct ResponseWriter {
    body: Vec<u8>,
}

impl ResponseWriter {
    pub fn new() -> Self {
        ResponseWriter { body: Vec::new() }
    }

    /// Current payload length in bytes, for handlers that page their
    /// output to the packet budget.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Write a single raw byte.
    pub fn write(&mut self, byte: u8) {
        self.body.push(byte);
    }

    /// Write an entire string.
    pub fn write_str(&mut self, s: &str) {
        self.body.extend_from_slice(s.as_bytes());
    }

    /// Write a single byte as two hex digits.
    pub fn write_hex(&mut self, byte: u8) {
        for &digit in [(byte & 0xf0) >> 4, byte & 0x0f].iter() {
            let c = match digit {
                0..=9 => b'0' + digit,
                _ => b'a' + digit - 10,
            };
            self.write(c);
        }
    }

    /// Write a byte buffer as a hex string (two digits per byte).
    pub fn write_hex_buf(&mut self, data: &[u8]) {
        for b in data.iter() {
            self.write_hex(*b);
        }
    }

    /// Write a number as a big-endian hex string, trimming leading zeros.
    pub fn write_num<D: PrimInt>(&mut self, digit: D) {
        if digit == D::zero() {
            return self.write(b'0');
        }

        let mut started = false;
        let mask = D::from(0xf).unwrap();
        for i in (0..core::mem::size_of::<D>() * 2).rev() {
            let nibble = num_traits::cast::<D, u8>((digit >> (i * 4)) & mask).unwrap();
            if nibble != 0 {
                started = true;
            }
            if started {
                let c = match nibble {
                    0..=9 => b'0' + nibble,
                    _ => b'a' + nibble - 10,
                };
                self.write(c);
            }
        }
    }

    /// Write data using the binary protocol, escaping `#`, `$`, `}` and
    /// `*`.
    pub fn write_binary(&mut self, data: &[u8]) {
        for &b in data.iter() {
            match b {
                b'#' | b'$' | b'}' | b'*' => {
                    self.write(b'}');
                    self.write(b ^ 0x20);
                }
                _ => self.write(b),
            }
        }
    }

    /// Consume self, producing the framed `$<body>#<hh>` byte sequence.
    pub fn into_frame(self) -> Vec<u8> {
        let checksum = self.body.iter().fold(0u8, |a, x| a.wrapping_add(*x));
        let mut frame = Vec::with_capacity(self.body.len() + 4);
        frame.push(b'$');
        frame.extend_from_slice(&self.body);
        frame.push(b'#');
        for &digit in [(checksum & 0xf0) >> 4, checksum & 0x0f].iter() {
            frame.push(match digit {
                0..=9 => b'0' + digit,
                _ => b'a' + digit - 10,
            });
        }
        frame
    }

    /// Frame the accumulated payload and transmit it until the client acks.
    pub fn send<C: ConnectionExt>(self, conn: &mut C) -> Result<(), PeerClosed<C::Error>> {
        let frame = self.into_frame();
        loop {
            conn.write_all(&frame).map_err(PeerClosed)?;
            conn.flush().map_err(PeerClosed)?;
            trace!("--> {}", String::from_utf8_lossy(&frame));

            loop {
                match conn.read().map_err(PeerClosed)? {
                    b'+' => return Ok(()),
                    b'-' => {
                        debug!("client nack'd reply, retransmitting");
                        break;
                    }
                    // an interrupt request racing our stop reply; the
                    // target is already stopped, so there is nothing to do
                    0x03 => debug!("interrupt byte while awaiting ack (dropped)"),
                    b => trace!("stray byte {:#04x} while awaiting ack", b),
                }
            }
        }
    }
}
