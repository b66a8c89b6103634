//! End-to-end transfers through the TCP listener and frame codec

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

use file_channel_server::codec::JsonFrameCodec;
use file_channel_server::config::{Config, FilesConfig, ServerConfig};
use file_channel_server::transfer::{
    ClientMessage, DrainReport, FileChunk, FileRequest, LogLevel, ServerMessage,
};
use file_channel_server::FileServer;

type Client = Framed<TcpStream, JsonFrameCodec<ServerMessage, ClientMessage>>;

struct TestServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<DrainReport>,
    _root: TempDir,
}

impl TestServer {
    async fn start(files: &[(&str, Vec<u8>)]) -> Self {
        let root = TempDir::new().unwrap();
        for (name, data) in files {
            let path = root.path().join(name);
            tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
            tokio::fs::write(path, data).await.unwrap();
        }

        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            files: FilesConfig {
                root: Some(root.path().to_path_buf()),
            },
        };

        let server = FileServer::bind(&config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            server
                .run(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .unwrap()
        });

        Self {
            addr,
            shutdown: Some(shutdown_tx),
            task,
            _root: root,
        }
    }

    async fn connect(&self) -> Client {
        let stream = TcpStream::connect(self.addr).await.unwrap();
        Framed::new(stream, JsonFrameCodec::new())
    }

    async fn stop(mut self) -> DrainReport {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task.await.unwrap()
    }
}

async fn fetch(client: &mut Client, request: FileRequest) -> ServerMessage {
    client.send(ClientMessage::FileRequest(request)).await.unwrap();
    client.next().await.unwrap().unwrap()
}

fn expect_chunk(message: ServerMessage) -> FileChunk {
    match message {
        ServerMessage::FileChunk(chunk) => chunk,
        other => panic!("expected chunk, got {:?}", other),
    }
}

#[tokio::test]
async fn test_download_whole_file_in_default_chunks() {
    let contents: Vec<u8> = (0..20000u32).map(|i| (i * 7 % 256) as u8).collect();
    let server = TestServer::start(&[("library/book.epub", contents.clone())]).await;
    let mut client = server.connect().await;

    let mut received = Vec::new();
    let mut offset = 0i64;
    loop {
        let chunk = expect_chunk(fetch(&mut client, FileRequest::new("library", "book.epub", offset, -1)).await);
        assert_eq!(chunk.offset, offset);
        assert_eq!(chunk.length, 8192);
        assert_eq!(chunk.total_file_length, 20000);
        assert_eq!(chunk.data.len(), 8192);

        let end = (chunk.total_file_length - offset).min(chunk.length as i64) as usize;
        received.extend_from_slice(&chunk.data[..end]);
        offset += chunk.length as i64;
        if offset >= chunk.total_file_length {
            break;
        }
    }

    assert_eq!(received, contents);
    server.stop().await;
}

#[tokio::test]
async fn test_missing_file_returns_error_event() {
    let server = TestServer::start(&[]).await;
    let mut client = server.connect().await;

    match fetch(&mut client, FileRequest::new("library", "ghost.pdf", 0, -1)).await {
        ServerMessage::LogEvent(event) => {
            assert_eq!(event.level, LogLevel::Error);
            assert!(event.message.contains("library/ghost.pdf"));
        }
        other => panic!("expected log event, got {:?}", other),
    }

    // The connection stays usable after an error
    match fetch(&mut client, FileRequest::new("library", "ghost.pdf", -1, 10)).await {
        ServerMessage::LogEvent(event) => assert!(event.message.contains("negative offset")),
        other => panic!("expected log event, got {:?}", other),
    }

    server.stop().await;
}

#[tokio::test]
async fn test_escaping_the_root_is_rejected() {
    let server = TestServer::start(&[("inside.txt", b"secret".to_vec())]).await;
    let mut client = server.connect().await;

    match fetch(&mut client, FileRequest::new("..", "etc/passwd", 0, 16)).await {
        ServerMessage::LogEvent(event) => assert!(event.message.contains("Path rejected")),
        other => panic!("expected log event, got {:?}", other),
    }

    let chunk = expect_chunk(fetch(&mut client, FileRequest::new("", "inside.txt", 0, 16)).await);
    assert_eq!(chunk.data.len(), 16);
    assert_eq!(&chunk.data[..6], b"secret");
    assert!(chunk.data[6..].iter().all(|&b| b == 0));
    assert_eq!(chunk.total_file_length, 6);

    server.stop().await;
}

#[tokio::test]
async fn test_connections_are_independent() {
    let server = TestServer::start(&[("shared.bin", vec![3; 1000])]).await;
    let mut first = server.connect().await;
    let mut second = server.connect().await;

    let a = expect_chunk(fetch(&mut first, FileRequest::new("", "shared.bin", 0, 600)).await);
    let b = expect_chunk(fetch(&mut second, FileRequest::new("", "shared.bin", 0, 600)).await);
    assert_eq!(a.data.len(), 600);
    assert_eq!(b.data.len(), 600);

    // Closing one client leaves the other transfer intact
    drop(first);
    let rest = expect_chunk(fetch(&mut second, FileRequest::new("", "shared.bin", 600, 400)).await);
    assert_eq!(rest.data.len(), 400);

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_closes_open_transfers() {
    let server = TestServer::start(&[("a.bin", vec![1; 1000]), ("b.bin", vec![2; 1000])]).await;
    let mut client = server.connect().await;
    let mut idle = server.connect().await;

    let chunk = expect_chunk(fetch(&mut client, FileRequest::new("", "a.bin", 0, 100)).await);
    assert_eq!(chunk.total_file_length, 1000);
    let chunk = expect_chunk(fetch(&mut idle, FileRequest::new("", "b.bin", 0, 100)).await);
    assert_eq!(chunk.total_file_length, 1000);

    // Leave a response unread on one connection
    idle.send(ClientMessage::FileRequest(FileRequest::new("", "b.bin", 100, 100)))
        .await
        .unwrap();

    let report = server.stop().await;
    assert_eq!(report, DrainReport { closed: 2, failed: 0 });

    // The server side of the connection is gone
    assert!(matches!(client.next().await, None | Some(Err(_))));
}
