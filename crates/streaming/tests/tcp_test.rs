//! TCP transport tests over the loopback interface.

use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use treebus_core::frame::{Request, Signal};
use treebus_core::{Connection, ConnectionEvent, Connector, Frame, Listener};
use treebus_transport::{TcpAcceptor, TcpConnector};

async fn next_non_open(conn: &mut Connection) -> Option<ConnectionEvent> {
    loop {
        match conn.next_event().await? {
            ConnectionEvent::Open => continue,
            other => return Some(other),
        }
    }
}

async fn connected() -> (Connection, Connection) {
    let mut acceptor = TcpAcceptor::bind("127.0.0.1:0").await.unwrap();
    let addr = acceptor.local_addr().unwrap();
    let client = TcpConnector::new(addr.to_string()).connect().await.unwrap();
    let server = acceptor.accept().await.unwrap();
    (client, server)
}

#[tokio::test]
async fn test_frames_cross_the_socket() {
    let (client, mut server) = connected().await;

    let request = Frame::Request(Request {
        id: 1,
        path: "/Echo".into(),
        intf: "Echo".into(),
        member: "call".into(),
        args: vec![json!("hi")],
        sender: "/0/".into(),
    });
    client.send(request.clone());
    client.send(Frame::Signal(Signal::new("ping", vec![])));

    assert_eq!(
        next_non_open(&mut server).await,
        Some(ConnectionEvent::Frame(request))
    );
    assert_eq!(
        next_non_open(&mut server).await,
        Some(ConnectionEvent::Frame(Frame::Signal(Signal::new("ping", vec![]))))
    );
}

#[tokio::test]
async fn test_dropping_one_side_closes_the_other() {
    let (client, mut server) = connected().await;
    drop(client);
    assert_eq!(next_non_open(&mut server).await, Some(ConnectionEvent::Closed));
}

#[tokio::test]
async fn test_garbage_line_is_reported_and_skipped() {
    let mut acceptor = TcpAcceptor::bind("127.0.0.1:0").await.unwrap();
    let addr = acceptor.local_addr().unwrap();
    let mut raw = TcpStream::connect(addr).await.unwrap();
    let mut server = acceptor.accept().await.unwrap();

    raw.write_all(b"not a frame\n\"ready\"\n").await.unwrap();

    assert!(matches!(
        next_non_open(&mut server).await,
        Some(ConnectionEvent::Error(_))
    ));
    assert_eq!(
        next_non_open(&mut server).await,
        Some(ConnectionEvent::Frame(Frame::Ready))
    );
}

#[tokio::test]
async fn test_connect_refused() {
    let acceptor = TcpAcceptor::bind("127.0.0.1:0").await.unwrap();
    let addr = acceptor.local_addr().unwrap();
    drop(acceptor);
    assert!(TcpConnector::new(addr.to_string()).connect().await.is_err());
}
