//! Session transports: the local console and accepted TCP connections.

use std::fmt;
use std::io::{self, BufRead, Read};
use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::server::InterruptSignal;

/// Longest accepted input line in bytes, terminator included.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Where a session's transport came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// The process's own stdin/stdout.
    Console,
    /// An accepted remote connection.
    Remote,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Console => write!(f, "console"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Line-oriented input half of a transport.
pub enum LineInput {
    /// Any async byte stream.
    Stream(BufReader<Box<dyn AsyncRead + Send + Unpin>>),
    /// Lines fed by a dedicated reader thread.
    Channel(mpsc::Receiver<io::Result<String>>),
}

impl LineInput {
    /// Read the next line without its terminator. `None` means end of
    /// input.
    ///
    /// Invalid UTF-8 is replaced rather than rejected. A line longer than
    /// [`MAX_LINE_BYTES`] is an `InvalidData` error.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        let line = match self {
            Self::Stream(reader) => {
                let mut buf = Vec::new();
                let limit = MAX_LINE_BYTES as u64 + 1;
                if (&mut *reader).take(limit).read_until(b'\n', &mut buf).await? == 0 {
                    return Ok(None);
                }
                decode_line(buf)?
            }
            Self::Channel(rx) => match rx.recv().await {
                Some(line) => line?,
                None => return Ok(None),
            },
        };

        Ok(Some(trim_terminator(line)))
    }
}

fn decode_line(buf: Vec<u8>) -> io::Result<String> {
    if buf.len() > MAX_LINE_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("input line exceeds {} bytes", MAX_LINE_BYTES),
        ));
    }
    Ok(match String::from_utf8(buf) {
        Ok(line) => line,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    })
}

fn trim_terminator(mut line: String) -> String {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    line
}

/// One bidirectional session transport.
pub struct Transport {
    pub(crate) kind: TransportKind,
    pub(crate) peer: Option<SocketAddr>,
    pub(crate) interactive: bool,
    pub(crate) input: LineInput,
    pub(crate) output: Box<dyn AsyncWrite + Send + Unpin>,
    pub(crate) interrupt: Option<InterruptSignal>,
}

impl Transport {
    /// Build a transport from arbitrary async reader and writer halves.
    pub fn from_io<R, W>(kind: TransportKind, reader: R, writer: W, interactive: bool) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
        Self {
            kind,
            peer: None,
            interactive,
            input: LineInput::Stream(BufReader::new(reader)),
            output: Box::new(writer),
            interrupt: None,
        }
    }

    /// Wrap an accepted TCP connection. Remote sessions are interactive.
    pub fn remote(stream: TcpStream, peer: SocketAddr) -> Self {
        let (reader, writer) = stream.into_split();
        Self::from_io(TransportKind::Remote, reader, writer, true).with_peer(peer)
    }

    /// The process console.
    ///
    /// Stdin is read on a dedicated OS thread so that a pending read never
    /// holds up runtime shutdown.
    pub fn console(interactive: bool) -> io::Result<Self> {
        Ok(Self {
            kind: TransportKind::Console,
            peer: None,
            interactive,
            input: LineInput::Channel(spawn_stdin_reader()?),
            output: Box::new(tokio::io::stdout()),
            interrupt: None,
        })
    }

    /// Let `signal` wake this transport's blocking read.
    pub fn with_interrupt(mut self, signal: InterruptSignal) -> Self {
        self.interrupt = Some(signal);
        self
    }

    /// Set the peer address reported for this transport.
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }
}

fn spawn_stdin_reader() -> io::Result<mpsc::Receiver<io::Result<String>>> {
    let (tx, rx) = mpsc::channel(16);

    std::thread::Builder::new()
        .name("console-stdin".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            let mut stdin = stdin.lock();
            let limit = MAX_LINE_BYTES as u64 + 1;
            loop {
                let mut buf = Vec::new();
                match (&mut stdin).take(limit).read_until(b'\n', &mut buf) {
                    Ok(0) => {
                        debug!("console stdin: EOF");
                        break;
                    }
                    Ok(_) => {
                        let line = decode_line(buf);
                        let failed = line.is_err();
                        if tx.blocking_send(line).is_err() || failed {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.blocking_send(Err(e));
                        break;
                    }
                }
            }
        })?;

    Ok(rx)
}
