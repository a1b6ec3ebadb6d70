//! Loopback tests: client and server in one process
// (c) 2024 Ross Younger

use std::{
    net::{SocketAddr, UdpSocket},
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
};

use pretty_assertions::assert_eq;
use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _},
    time::timeout,
};
use url::Url;

use wtinterop::{
    Configuration,
    endpoint::server_config,
    h09,
    protocol::StatusCode,
    server::Server,
    session::{Dialer, Session, SessionAcceptor, UpgradeError},
    util::Credentials,
};

const INDEX: &[u8] = b"0123456789";

fn config() -> Configuration {
    let mut config = Configuration::system_default();
    config.listen = "127.0.0.1:0".parse().unwrap();
    config.keylog = false;
    config.generate_cert = true;
    config.log_file = "".into();
    config
}

fn www() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("www")).unwrap();
    std::fs::write(dir.path().join("www").join("index.html"), INDEX).unwrap();
    std::fs::create_dir(dir.path().join("www").join("sub")).unwrap();
    std::fs::write(dir.path().join("www").join("sub").join("a.txt"), b"nested").unwrap();
    std::fs::write(dir.path().join("www").join("a b.txt"), b"spaced").unwrap();
    std::fs::write(dir.path().join("www").join("café.txt"), b"accented").unwrap();
    std::fs::write(dir.path().join("secret"), b"do not serve").unwrap();
    dir
}

/// Starts a server for the `www` subdirectory of `dir`
fn start_server(dir: &Path) -> (Arc<Server>, SocketAddr) {
    let mut config = config();
    config.www = dir.join("www");
    let server = Arc::new(Server::bind(&config, &Credentials::generate().unwrap()).unwrap());
    let addr = server.local_addr().unwrap();
    let s2 = Arc::clone(&server);
    let _j = tokio::spawn(async move { s2.serve().await });
    (server, addr)
}

fn session_url(addr: SocketAddr, path: &str) -> Url {
    Url::parse(&format!("https://{addr}{path}")).unwrap()
}

async fn fetch(session: &Session, path: &str) -> Vec<u8> {
    let stream = session.open_stream().await.unwrap();
    let mut body = h09::request(stream, "GET", path).await.unwrap();
    let mut out = Vec::new();
    let _ = body.read_to_end(&mut out).await.unwrap();
    assert_eq!(body.bytes_received(), out.len() as u64);
    out
}

#[tokio::test]
async fn client_downloads_index() {
    let dir = www();
    let downloads = tempfile::tempdir().unwrap();
    let (server, addr) = start_server(dir.path());

    let mut config = config();
    config.downloads = downloads.path().to_path_buf();
    let urls = vec![
        format!("https://{addr}/index.html"),
        format!("https://{addr}/sub/a.txt"),
    ];
    wtinterop::client::run("handshake", &urls, &config)
        .await
        .unwrap();

    assert_eq!(
        std::fs::read(downloads.path().join("index.html")).unwrap(),
        INDEX
    );
    // only the first URL is fetched
    assert!(!downloads.path().join("sub").exists());
    server.close();
}

#[tokio::test]
async fn client_creates_directories() {
    let dir = www();
    let downloads = tempfile::tempdir().unwrap();
    let (server, addr) = start_server(dir.path());

    let mut config = config();
    config.downloads = downloads.path().to_path_buf();
    wtinterop::client::run("handshake", &[format!("https://{addr}/sub/a.txt")], &config)
        .await
        .unwrap();
    assert_eq!(
        std::fs::read(downloads.path().join("sub").join("a.txt")).unwrap(),
        b"nested"
    );
    server.close();
}

#[tokio::test]
async fn client_handles_encoded_names() {
    let dir = www();
    let downloads = tempfile::tempdir().unwrap();
    let (server, addr) = start_server(dir.path());

    let mut config = config();
    config.downloads = downloads.path().to_path_buf();
    for (name, content) in [("a b.txt", &b"spaced"[..]), ("café.txt", &b"accented"[..])] {
        wtinterop::client::run("handshake", &[format!("https://{addr}/{name}")], &config)
            .await
            .unwrap();
        assert_eq!(std::fs::read(downloads.path().join(name)).unwrap(), content);
    }
    server.close();
}

#[tokio::test]
async fn failures_give_empty_responses() {
    let dir = www();
    let (server, addr) = start_server(dir.path());
    let dialer = Dialer::new(&config()).unwrap();
    let session = dialer
        .dial(&session_url(addr, "/webtransport"))
        .await
        .unwrap();

    assert_eq!(fetch(&session, "/index.html").await, INDEX);
    assert!(fetch(&session, "/../secret").await.is_empty());
    assert!(fetch(&session, "/no/such/file").await.is_empty());
    assert!(fetch(&session, "/%2e%2e/secret").await.is_empty());

    let stream = session.open_stream().await.unwrap();
    let mut body = h09::request(stream, "POST", "/index.html").await.unwrap();
    let mut out = Vec::new();
    let _ = body.read_to_end(&mut out).await.unwrap();
    assert!(out.is_empty());

    // the session survives failed requests
    assert!(session.is_open());
    assert_eq!(fetch(&session, "/sub/a.txt").await, b"nested");

    session.close().await;
    dialer.close();
    server.close();
}

#[tokio::test]
async fn wrong_upgrade_path_is_rejected() {
    let dir = www();
    let (server, addr) = start_server(dir.path());
    let dialer = Dialer::new(&config()).unwrap();

    let result = dialer.dial(&session_url(addr, "/not-webtransport")).await;
    match result {
        Err(UpgradeError::Rejected(status)) => assert_eq!(status, StatusCode::NOT_FOUND),
        other => panic!("expected rejection, got {other:?}"),
    }
    // the connection is still usable for a correct request
    let session = dialer
        .dial(&session_url(addr, "/webtransport"))
        .await
        .unwrap();
    assert_eq!(fetch(&session, "/").await, INDEX);
    dialer.close();
    server.close();
}

#[tokio::test]
async fn dial_times_out() {
    // a socket that never answers
    let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
    let addr = silent.local_addr().unwrap();

    let mut config = config();
    config.dial_timeout = 1;
    let dialer = Dialer::new(&config).unwrap();
    let started = Instant::now();
    let result = dialer.dial(&session_url(addr, "/webtransport")).await;
    assert!(matches!(result, Err(UpgradeError::Timeout)), "{result:?}");
    assert!(started.elapsed() < Duration::from_secs(5));

    dialer.close();
    dialer.close();
    assert!(matches!(
        dialer.dial(&session_url(addr, "/webtransport")).await,
        Err(UpgradeError::Dial(_))
    ));
}

#[tokio::test]
async fn stalled_stream_does_not_block_siblings() {
    let dir = www();
    let (server, addr) = start_server(dir.path());
    let dialer = Dialer::new(&config()).unwrap();
    let session = dialer
        .dial(&session_url(addr, "/webtransport"))
        .await
        .unwrap();

    // half a request line, never finished
    let mut stalled = session.open_stream().await.unwrap();
    stalled.send.write_all(b"GET /ind").await.unwrap();
    stalled.send.flush().await.unwrap();

    let sibling = timeout(Duration::from_secs(5), fetch(&session, "/index.html"))
        .await
        .expect("sibling stream should complete");
    assert_eq!(sibling, INDEX);

    drop(stalled);
    dialer.close();
    server.close();
}

#[tokio::test]
async fn sessions_share_a_connection() {
    let dir = www();
    let (server, addr) = start_server(dir.path());
    let dialer = Dialer::new(&config()).unwrap();
    let url = session_url(addr, "/webtransport");
    let first = dialer.dial(&url).await.unwrap();
    let second = dialer.dial(&url).await.unwrap();
    assert_ne!(first.id(), second.id());

    let (a, b) = tokio::join!(fetch(&first, "/index.html"), fetch(&second, "/sub/a.txt"));
    assert_eq!(a, INDEX);
    assert_eq!(b, b"nested");

    // closing one leaves the other working
    first.close().await;
    assert!(!first.is_open());
    assert_eq!(fetch(&second, "/index.html").await, INDEX);
    dialer.close();
    server.close();
}

#[tokio::test]
async fn datagrams_and_server_opened_streams() {
    let config = config();
    let credentials = Credentials::generate().unwrap();
    let endpoint =
        quinn::Endpoint::server(server_config(&config, &credentials).unwrap(), config.listen)
            .unwrap();
    let addr = endpoint.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let connection = endpoint.accept().await.unwrap().await.unwrap();
        let mut acceptor = SessionAcceptor::new(connection);
        let request = acceptor.next().await.unwrap();
        assert_eq!(request.path(), "/webtransport");
        let session = request.accept("/webtransport").await.unwrap();

        let datagram = session.read_datagram().await.unwrap();
        session.send_datagram(&datagram).unwrap();

        let mut stream = session.open_stream().await.unwrap();
        stream.send.write_all(b"hello from the server").await.unwrap();
        stream.send.shutdown().await.unwrap();

        // wait for the client to end the session
        assert!(session.accept_stream().await.is_err());
        endpoint.close(0u8.into(), b"done");
    });

    let dialer = Dialer::new(&config).unwrap();
    let session = dialer
        .dial(&session_url(addr, "/webtransport"))
        .await
        .unwrap();
    assert!(session.max_datagram_size().is_some());
    session.send_datagram(b"ping").unwrap();
    let echo = timeout(Duration::from_secs(5), session.read_datagram())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&echo[..], b"ping");

    let mut stream = timeout(Duration::from_secs(5), session.accept_stream())
        .await
        .unwrap()
        .unwrap();
    let mut got = String::new();
    let _ = stream.recv.read_to_string(&mut got).await.unwrap();
    assert_eq!(got, "hello from the server");

    session.close().await;
    timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    dialer.close();
}

#[tokio::test]
async fn stream_opened_right_after_accept_is_delivered() {
    const SESSIONS: usize = 10;
    let config = config();
    let credentials = Credentials::generate().unwrap();
    let endpoint =
        quinn::Endpoint::server(server_config(&config, &credentials).unwrap(), config.listen)
            .unwrap();
    let addr = endpoint.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let connection = endpoint.accept().await.unwrap().await.unwrap();
        let mut acceptor = SessionAcceptor::new(connection);
        let mut sessions = Vec::new();
        for _ in 0..SESSIONS {
            let session = acceptor
                .next()
                .await
                .unwrap()
                .accept("/webtransport")
                .await
                .unwrap();
            // no pause between answering and opening
            let mut stream = session.open_stream().await.unwrap();
            stream.send.write_all(b"hi").await.unwrap();
            stream.send.shutdown().await.unwrap();
            sessions.push(session);
        }
        for session in &sessions {
            assert!(session.accept_stream().await.is_err());
        }
        endpoint.close(0u8.into(), b"done");
    });

    let dialer = Dialer::new(&config).unwrap();
    let url = session_url(addr, "/webtransport");
    for _ in 0..SESSIONS {
        let session = dialer.dial(&url).await.unwrap();
        let mut stream = timeout(Duration::from_secs(5), session.accept_stream())
            .await
            .expect("server-opened stream should arrive")
            .unwrap();
        let mut got = String::new();
        let _ = stream.recv.read_to_string(&mut got).await.unwrap();
        assert_eq!(got, "hi");
        session.close().await;
    }
    timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    dialer.close();
}

#[tokio::test]
async fn upgrade_timeout_spares_other_sessions() {
    let mut config = config();
    config.dial_timeout = 1;
    let credentials = Credentials::generate().unwrap();
    let endpoint =
        quinn::Endpoint::server(server_config(&config, &credentials).unwrap(), config.listen)
            .unwrap();
    let addr = endpoint.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let connection = endpoint.accept().await.unwrap().await.unwrap();
        let mut acceptor = SessionAcceptor::new(connection);
        let session = acceptor
            .next()
            .await
            .unwrap()
            .accept("/webtransport")
            .await
            .unwrap();
        // held, never answered
        let _unanswered = acceptor.next().await.unwrap();

        let mut stream = session.accept_stream().await.unwrap();
        let mut got = Vec::new();
        let _ = stream.recv.read_to_end(&mut got).await.unwrap();
        stream.send.write_all(&got).await.unwrap();
        stream.send.shutdown().await.unwrap();
        assert!(session.accept_stream().await.is_err());
        endpoint.close(0u8.into(), b"done");
    });

    let dialer = Dialer::new(&config).unwrap();
    let url = session_url(addr, "/webtransport");
    let first = dialer.dial(&url).await.unwrap();
    let second = dialer.dial(&url).await;
    assert!(matches!(second, Err(UpgradeError::Timeout)), "{second:?}");

    // the shared connection, and the first session on it, are still up
    assert!(first.is_open());
    let mut stream = first.open_stream().await.unwrap();
    stream.send.write_all(b"still here").await.unwrap();
    stream.send.shutdown().await.unwrap();
    let mut echo = Vec::new();
    let _ = timeout(Duration::from_secs(5), stream.recv.read_to_end(&mut echo))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(echo, b"still here");

    first.close().await;
    timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    dialer.close();
}
