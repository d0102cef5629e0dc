use super::MAX_PACKET_SIZE;
use log::trace;

enum State {
    Ready,
    Body,
    Checksum1,
    Checksum2,
}

/// Something the receive state machine produced from the byte stream.
pub enum RecvEvent {
    /// A complete raw frame, including the `$`, the `#`, and both checksum
    /// digits. Not yet validated.
    Frame(Vec<u8>),
    /// A raw `0x03` seen outside any frame: an asynchronous interrupt
    /// request.
    Interrupt,
    /// A frame that outgrew [`MAX_PACKET_SIZE`] and was discarded.
    Oversized,
}

/// Receives a `$<body>#<checksum>` frame incrementally, one byte at a time.
///
/// Usable both from the blocking packet loop (simulator halted) and from
/// the poll-driven data path (simulator running). Bytes between frames are
/// discarded - this is where stray `+` acks from the client end up - with
/// the exception of `0x03`, which is surfaced as an interrupt request.
pub struct RecvPacketStateMachine {
    state: State,
    buf: Vec<u8>,
}

impl RecvPacketStateMachine {
    pub fn new() -> Self {
        RecvPacketStateMachine {
            state: State::Ready,
            buf: Vec::new(),
        }
    }

    /// Drop any partially received frame, e.g: across a detach/reattach.
    pub fn reset(&mut self) {
        self.state = State::Ready;
        self.buf.clear();
    }

    pub fn pump(&mut self, byte: u8) -> Option<RecvEvent> {
        match self.state {
            State::Ready => match byte {
                b'$' => {
                    self.buf.clear();
                    self.buf.push(byte);
                    self.state = State::Body;
                    None
                }
                0x03 => Some(RecvEvent::Interrupt),
                _ => {
                    trace!("discarding inter-packet byte {:#04x}", byte);
                    None
                }
            },
            State::Body => {
                if self.buf.len() > MAX_PACKET_SIZE + 1 {
                    self.state = State::Ready;
                    self.buf.clear();
                    return Some(RecvEvent::Oversized);
                }
                self.buf.push(byte);
                if byte == b'#' {
                    self.state = State::Checksum1;
                }
                None
            }
            State::Checksum1 => {
                self.buf.push(byte);
                self.state = State::Checksum2;
                None
            }
            State::Checksum2 => {
                self.buf.push(byte);
                self.state = State::Ready;
                trace!("<-- {}", String::from_utf8_lossy(&self.buf));
                Some(RecvEvent::Frame(core::mem::take(&mut self.buf)))
            }
        }
    }
}
