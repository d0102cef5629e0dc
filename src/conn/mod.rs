//! Traits to perform in-order, serial, byte-wise I/O with the GDB client.

mod impls;

/// A trait to perform in-order, serial, byte-wise I/O.
///
/// This crate automatically implements `Connection` for
/// [`TcpStream`](std::net::TcpStream), which is the transport the stub's
/// built-in listener produces. Alternative transports (e.g: a simulated
/// UART) only need to implement these two traits.
pub trait Connection {
    /// Transport-specific error type.
    type Error;

    /// Write a single byte.
    fn write(&mut self, byte: u8) -> Result<(), Self::Error>;

    /// Write the entire buffer, blocking until complete.
    ///
    /// The default implementation calls `self.write()` on each byte in the
    /// buffer, which can be quite inefficient. Override it if a better
    /// mechanism is available (such as `write_all()` on an underlying
    /// `std::io::Write` object).
    fn write_all(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        for b in buf {
            self.write(*b)?;
        }
        Ok(())
    }

    /// Flush this Connection, ensuring that all intermediately buffered
    /// contents reach their destination.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Called once when a client attaches, before any packets are
    /// exchanged.
    ///
    /// The default implementation is a no-op.
    ///
    /// The `TcpStream` implementation uses this to set
    /// [`set_nodelay(true)`](std::net::TcpStream::set_nodelay): the remote
    /// serial protocol consists of many tiny packets, and leaving Nagle's
    /// algorithm enabled makes a debugging session feel glacial.
    fn on_session_start(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Extends [`Connection`] with `read` and `peek` methods.
///
/// `read` is used by the packet loop while the simulator is halted, where
/// blocking is the intended behavior. `peek` is used from the poll-driven
/// path while the simulator is running, so that interrupt bytes can be
/// noticed without ever stalling simulated CPU time.
pub trait ConnectionExt: Connection {
    /// Read a single byte, blocking until one is available.
    ///
    /// Must report an error (rather than a dummy byte) when the peer has
    /// closed the connection.
    fn read(&mut self) -> Result<u8, Self::Error>;

    /// Peek a single byte. This MUST be a **non-blocking** operation,
    /// returning `None` if no byte is available.
    ///
    /// Must report an error when the peer has closed the connection, so
    /// that a running simulation can detach promptly.
    fn peek(&mut self) -> Result<Option<u8>, Self::Error>;
}
