//! # Network Module
//!
//! This module provides a newline-delimited message stream over TCP, which is the transport used
//! between the simulation server and its single control client.
//!
//! Any `Read + Write` byte stream can be wrapped in a [`LineStream`], which is how scripted
//! sessions and tests drive the server without a socket (see [`ReplayStream`]).

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info};
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of bytes requested from the underlying stream in a single read.
pub const READ_BUFFER_SIZE: usize = 8192;

/// Line reported when the peer closes its side of the connection.
pub const EXIT_LINE: &str = "EXIT";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Listens for a single client connection.
pub struct LineServer {
    listener: TcpListener,
}

/// A newline-delimited message stream.
///
/// Bytes received after the last complete line are kept and prepended to the next read, so that
/// a logical line may span any number of reads.
pub struct LineStream<S> {
    stream: S,

    /// Received bytes not yet returned as a line
    pending: Vec<u8>,

    read_buf: Box<[u8]>,
}

/// Joins a reader and a writer into a single duplex stream.
///
/// Used to replay a recorded command script through a [`LineStream`], with everything the
/// server sends being written to `output`.
pub struct ReplayStream<R, W> {
    input: R,
    output: W,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum LineStreamError {
    #[error("Could not bind to port {0}: {1}")]
    BindError(u16, std::io::Error),

    #[error("Could not accept a client connection: {0}")]
    AcceptError(std::io::Error),

    #[error("Could not connect to the server: {0}")]
    ConnectError(std::io::Error),

    #[error("Could not set socket option {0}: {1}")]
    SocketOptionError(String, std::io::Error),

    #[error("Could not send message: {0}")]
    SendError(std::io::Error),

    #[error("Could not receive message: {0}")]
    RecvError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LineServer {
    /// Bind a listener on all interfaces on the given port. A port of `0` lets the OS choose.
    pub fn bind(port: u16) -> Result<Self, LineStreamError> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .map_err(|e| LineStreamError::BindError(port, e))?;

        Ok(Self { listener })
    }

    /// The port the listener is actually bound to.
    pub fn local_port(&self) -> Option<u16> {
        self.listener.local_addr().ok().map(|a| a.port())
    }

    /// Block until a client connects and return the stream to it.
    pub fn accept(&self) -> Result<LineStream<TcpStream>, LineStreamError> {
        let (stream, addr) = self.listener.accept()
            .map_err(LineStreamError::AcceptError)?;

        info!("Client connected from {}", addr);

        LineStream::from_tcp(stream)
    }
}

impl LineStream<TcpStream> {
    /// Connect to a server, used by clients.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, LineStreamError> {
        let stream = TcpStream::connect(addr)
            .map_err(LineStreamError::ConnectError)?;

        Self::from_tcp(stream)
    }

    fn from_tcp(stream: TcpStream) -> Result<Self, LineStreamError> {
        // Commands are single short lines, don't let Nagle hold them back
        stream.set_nodelay(true)
            .map_err(|e| LineStreamError::SocketOptionError("TCP_NODELAY".into(), e))?;

        Ok(Self::new(stream))
    }
}

impl<S> LineStream<S>
where
    S: Read + Write
{
    /// Wrap an existing byte stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            pending: Vec::new(),
            read_buf: vec![0u8; READ_BUFFER_SIZE].into_boxed_slice(),
        }
    }

    /// Send a message. The message is written as is, callers are responsible for the line
    /// terminators.
    pub fn send(&mut self, msg: &str) -> Result<(), LineStreamError> {
        self.stream.write_all(msg.as_bytes())
            .and_then(|_| self.stream.flush())
            .map_err(LineStreamError::SendError)
    }

    /// Block until a complete line is available and return it without its terminator.
    ///
    /// If the peer closes the connection [`EXIT_LINE`] is returned instead of an error, any
    /// partial line received before the close is dropped.
    pub fn receive_line(&mut self) -> Result<String, LineStreamError> {
        loop {
            if let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
                let mut line: Vec<u8> = self.pending.drain(..=end).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }

                return Ok(String::from_utf8_lossy(&line).into_owned());
            }

            match self.stream.read(&mut self.read_buf) {
                Ok(0) => {
                    debug!("Peer closed the connection");
                    self.pending.clear();
                    return Ok(EXIT_LINE.to_string());
                }
                Ok(n) => self.pending.extend_from_slice(&self.read_buf[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(LineStreamError::RecvError(e)),
            }
        }
    }

    /// Get a reference to the wrapped stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Unwrap the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<R, W> ReplayStream<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Everything written to the stream so far.
    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: Read, W> Read for ReplayStream<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.input.read(buf)
    }
}

impl<R, W: Write> Write for ReplayStream<R, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.output.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.output.flush()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    /// A reader which hands out its data in fixed size pieces.
    struct Chunked {
        data: Vec<u8>,
        chunk: usize,
    }

    impl Read for Chunked {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.chunk.min(self.data.len()).min(buf.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data.drain(..n);
            Ok(n)
        }
    }

    fn replay(input: &str) -> LineStream<ReplayStream<Cursor<Vec<u8>>, Vec<u8>>> {
        LineStream::new(ReplayStream::new(
            Cursor::new(input.as_bytes().to_vec()),
            Vec::new(),
        ))
    }

    #[test]
    fn test_lines_split_on_newline() {
        let mut s = replay("ACK\nUA 0.5\r\nDONE\n");

        assert_eq!(s.receive_line().unwrap(), "ACK");
        assert_eq!(s.receive_line().unwrap(), "UA 0.5");
        assert_eq!(s.receive_line().unwrap(), "DONE");
    }

    #[test]
    fn test_eof_is_exit() {
        let mut s = replay("DONE\nPART");

        assert_eq!(s.receive_line().unwrap(), "DONE");
        assert_eq!(s.receive_line().unwrap(), EXIT_LINE);
        assert_eq!(s.receive_line().unwrap(), EXIT_LINE);
    }

    #[test]
    fn test_lines_span_reads() {
        let long = format!("UX {}\n", vec!["0.25"; 4000].join(" "));
        let mut s = LineStream::new(ReplayStream::new(
            Chunked { data: format!("{}DONE\n", long).into_bytes(), chunk: 7 },
            Vec::new(),
        ));

        assert_eq!(s.receive_line().unwrap(), long.trim_end());
        assert_eq!(s.receive_line().unwrap(), "DONE");
    }

    #[test]
    fn test_send() {
        let mut s = replay("");
        s.send("1 1 0\n").unwrap();
        s.send("0.000000 \n").unwrap();

        assert_eq!(s.get_ref().output().as_slice(), b"1 1 0\n0.000000 \n");
    }

    #[test]
    fn test_tcp_round_trip() {
        let server = LineServer::bind(0).unwrap();
        let port = server.local_port().unwrap();

        let client = std::thread::spawn(move || {
            let mut c = LineStream::connect(("127.0.0.1", port)).unwrap();
            c.send("ACK\n").unwrap();
            c.receive_line().unwrap()
        });

        let mut s = server.accept().unwrap();
        assert_eq!(s.receive_line().unwrap(), "ACK");
        s.send("hello\n").unwrap();

        assert_eq!(client.join().unwrap(), "hello");

        // Client has gone away
        assert_eq!(s.receive_line().unwrap(), EXIT_LINE);
    }
}
