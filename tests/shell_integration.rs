//! Shell server integration tests.
//!
//! These tests drive a real server over TCP on the loopback interface,
//! with an in-memory duplex stream standing in for the console.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{
    duplex, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
    Lines,
};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

use dht_shell::security::{AccessController, AccessList};
use dht_shell::{CommandRegistry, MemoryBackend, ShellServer, Transport, TransportKind};

const WAIT: Duration = Duration::from_secs(5);

type Reader = Box<dyn AsyncRead + Send + Unpin>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Line-oriented client end of a session.
struct Client {
    lines: Lines<BufReader<Reader>>,
    writer: Writer,
}

impl Client {
    fn new(reader: Reader, writer: Writer) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    fn tcp(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self::new(Box::new(reader), Box::new(writer))
    }

    async fn connect(addr: SocketAddr) -> Self {
        Self::tcp(TcpStream::connect(addr).await.expect("connect"))
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn next(&mut self) -> Option<String> {
        timeout(WAIT, self.lines.next_line())
            .await
            .expect("line within timeout")
            .ok()
            .flatten()
    }

    /// Lines up to, not including, the next readiness marker.
    async fn until_ready(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            match self.next().await {
                Some(line) if line == "Ready." => return lines,
                Some(line) => lines.push(line),
                None => panic!("transport closed before ready marker; got {:?}", lines),
            }
        }
    }

    async fn command(&mut self, line: &str) -> Vec<String> {
        self.send(line).await;
        self.until_ready().await
    }

    async fn assert_closed(&mut self) {
        assert_eq!(self.next().await, None, "transport should be closed");
    }
}

fn server_with(access: AccessController) -> (ShellServer, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::default());
    let server = ShellServer::new(
        backend.clone(),
        Arc::new(CommandRegistry::builtin().unwrap()),
        access,
    );
    (server, backend)
}

fn console_pair() -> (Client, Transport) {
    let (client, console) = duplex(64 * 1024);
    let (reader, writer) = tokio::io::split(console);
    let transport = Transport::from_io(TransportKind::Console, reader, writer, true);

    let (reader, writer) = tokio::io::split(client);
    (Client::new(Box::new(reader), Box::new(writer)), transport)
}

fn loopback() -> Option<SocketAddr> {
    Some("127.0.0.1:0".parse().unwrap())
}

/// Connect, retrying until the listener is back and the session greets.
async fn connect_ready(addr: SocketAddr) -> Client {
    timeout(WAIT, async {
        loop {
            if let Ok(stream) = TcpStream::connect(addr).await {
                let mut client = Client::tcp(stream);
                if client.next().await.as_deref() == Some("Ready.") {
                    return client;
                }
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("listener accepts again")
}

/// A refused connection either fails to connect or is closed without a
/// single byte of output.
async fn assert_refused(addr: SocketAddr) {
    let Ok(mut stream) = TcpStream::connect(addr).await else {
        return;
    };
    let mut buf = [0u8; 64];
    match timeout(WAIT, stream.read(&mut buf))
        .await
        .expect("refused connection is closed")
    {
        Ok(0) | Err(_) => {}
        Ok(n) => panic!(
            "refused connection got output: {:?}",
            String::from_utf8_lossy(&buf[..n])
        ),
    }
}

async fn wait_for_sessions(server: &ShellServer, count: usize) {
    timeout(WAIT, async {
        while server.session_count() != count {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session count settles");
}

// ============================================================================
// End-to-end
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_console_and_remote_end_to_end() {
    let (server, backend) = server_with(AccessController::disabled());
    let (mut console, transport) = console_pair();
    let mut running = server.start(Some(transport), loopback()).await.unwrap();
    let addr = running.local_addr().unwrap();

    assert!(console.until_ready().await.is_empty());
    let status = console.command("status").await;
    assert!(status.iter().any(|l| l == "node: running"));
    assert!(status.iter().any(|l| l.starts_with("shell: accepting")));

    let mut first = Client::connect(addr).await;
    assert!(first.until_ready().await.is_empty());
    assert_eq!(first.command("badcmd").await, vec!["No such command: badcmd"]);

    assert_eq!(console.command("suspend").await, vec!["suspended."]);
    assert_refused(addr).await;
    assert_eq!(server.session_count(), 2);

    // The open remote session keeps answering while suspended
    let help = first.command("help").await;
    assert!(help[0].starts_with("status"));

    assert_eq!(console.command("resume").await, vec!["resumed."]);
    let mut third = connect_ready(addr).await;
    assert_eq!(third.command("setttl 60").await, vec!["ttl set to 60s"]);
    wait_for_sessions(&server, 3).await;

    console.send("halt").await;
    assert_eq!(console.next().await.as_deref(), Some("halting."));
    console.assert_closed().await;
    first.assert_closed().await;
    third.assert_closed().await;

    let console_end = running.take_console().unwrap().wait().await;
    assert!(console_end.is_some());
    running.join_acceptor().await;

    assert!(server.is_halted().unwrap());
    assert_eq!(server.session_count(), 0);
    assert_eq!(backend.stop_calls(), 1);
    assert_refused(addr).await;
}

// ============================================================================
// Access control
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_access_list_denies_before_session() {
    let list = AccessList::parse("deny 127.0.0.0/8\nallow *").unwrap();
    let (server, _) = server_with(AccessController::new(list));
    let running = server.start(None, loopback()).await.unwrap();
    let addr = running.local_addr().unwrap();

    assert_refused(addr).await;
    assert_eq!(server.session_count(), 0);
    assert!(server.sessions().unwrap().is_empty());

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_access_list_admits_allowed_peer() {
    let list = AccessList::parse("# loopback only\nallow 127.0.0.1").unwrap();
    let (server, _) = server_with(AccessController::new(list));
    let running = server.start(None, loopback()).await.unwrap();

    let mut client = Client::connect(running.local_addr().unwrap()).await;
    assert!(client.until_ready().await.is_empty());
    assert_eq!(client.command("put k v").await, vec!["stored 1 value(s) under k"]);

    server.shutdown().await.unwrap();
    client.assert_closed().await;
}

// ============================================================================
// Halt
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_remote_halt_is_terminal_and_idempotent() {
    let (server, backend) = server_with(AccessController::disabled());
    let mut running = server.start(None, loopback()).await.unwrap();
    let addr = running.local_addr().unwrap();

    let mut a = Client::connect(addr).await;
    let mut b = Client::connect(addr).await;
    a.until_ready().await;
    b.until_ready().await;

    a.send("shutdown").await;
    assert_eq!(a.next().await.as_deref(), Some("halting."));
    a.assert_closed().await;
    b.assert_closed().await;
    running.join_acceptor().await;

    assert_eq!(backend.stop_calls(), 1);
    assert!(!server.halt().unwrap());
    assert!(!server.shutdown().await.unwrap());
    assert_eq!(backend.stop_calls(), 1);
    assert_refused(addr).await;
}

// ============================================================================
// Session isolation
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_quit_and_disconnect_leave_siblings_running() {
    let (server, backend) = server_with(AccessController::disabled());
    let running = server.start(None, loopback()).await.unwrap();
    let addr = running.local_addr().unwrap();

    let mut leaving = Client::connect(addr).await;
    let dropped = Client::connect(addr).await;
    let mut staying = Client::connect(addr).await;
    leaving.until_ready().await;
    staying.until_ready().await;

    leaving.send("quit").await;
    leaving.assert_closed().await;
    drop(dropped);
    wait_for_sessions(&server, 1).await;

    assert_eq!(staying.command("put k v").await, vec!["stored 1 value(s) under k"]);
    assert_eq!(backend.stop_calls(), 0);
    assert!(!server.is_halted().unwrap());

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_session_order_under_concurrency() {
    let (server, _) = server_with(AccessController::disabled());
    let running = server.start(None, loopback()).await.unwrap();
    let addr = running.local_addr().unwrap();

    let mut tasks = Vec::new();
    for client_no in 0..4 {
        tasks.push(tokio::spawn(async move {
            let mut client = Client::connect(addr).await;
            client.until_ready().await;

            // Pipeline every command in a single write
            let script: String = (1..=25)
                .map(|i| format!("put c{}-{} v\n", client_no, i))
                .collect();
            client.writer.write_all(script.as_bytes()).await.unwrap();

            let mut seen = Vec::new();
            for _ in 1..=25 {
                seen.extend(client.until_ready().await);
            }
            let expected: Vec<String> = (1..=25)
                .map(|i| format!("stored 1 value(s) under c{}-{}", client_no, i))
                .collect();
            assert_eq!(seen, expected);
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }
    server.shutdown().await.unwrap();
}
