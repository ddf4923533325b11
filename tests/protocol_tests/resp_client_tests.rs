//! RESP Client Tests
//!
//! These tests drive `RespClient` against a scripted TCP server and verify:
//! - Request encoding and reply decoding over a real socket
//! - AUTH / SELECT handshake
//! - Failure mapping for refused, closed, stalled and garbled connections

#[path = "../common/mod.rs"]
mod common;

use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use common::{bulk, error, integer, name, nil, simple, spawn_server, spawn_store_server, Script};
use kvpool::{
    classify, Command, ConnError, Endpoint, ErrorKind, ExecOptions, Pool, PoolConfig,
    ProtocolClient, Reply, RespClient,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn client() -> RespClient {
    RespClient::new(
        Some(Duration::from_secs(2)),
        Some(Duration::from_millis(500)),
        Some(Duration::from_millis(500)),
    )
}

fn endpoint(url: &str) -> Endpoint {
    Endpoint::parse(url).unwrap()
}

/// A port nobody listens on
fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("redis://{}", addr)
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_send_receives_each_reply_type() {
    let url = spawn_server(|args| match name(args).as_str() {
        "PING" => simple("PONG"),
        "GET" => nil(),
        "ECHO" => bulk(&args[1]),
        "INCR" => integer(7),
        "MGET" => Script::Reply(b"*2\r\n$1\r\na\r\n$-1\r\n".to_vec()),
        _ => error("ERR unknown command"),
    });
    let client = client();
    let mut conn = client.open(&endpoint(&url)).unwrap();

    assert_eq!(client.send(&mut conn, &Command::new(["PING"])).unwrap(), Reply::status("PONG"));
    assert_eq!(client.send(&mut conn, &Command::new(["GET", "k"])).unwrap(), Reply::Nil);
    assert_eq!(
        client.send(&mut conn, &Command::new(["ECHO", "bin\r\nary"])).unwrap(),
        Reply::bulk("bin\r\nary")
    );
    assert_eq!(client.send(&mut conn, &Command::new(["INCR", "n"])).unwrap(), Reply::Integer(7));
    assert_eq!(
        client.send(&mut conn, &Command::new(["MGET", "a", "b"])).unwrap(),
        Reply::Array(vec![Reply::bulk("a"), Reply::Nil])
    );
    assert_eq!(
        client.send(&mut conn, &Command::new(["NOPE"])).unwrap(),
        Reply::Error("ERR unknown command".into())
    );

    client.close(conn);
}

#[test]
fn test_batch_sends_all_before_reading() {
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let log = Arc::clone(&seen);
    let url = spawn_server(move |args| {
        log.lock().unwrap().push(name(args));
        simple("OK")
    });
    let client = client();
    let mut conn = client.open(&endpoint(&url)).unwrap();

    let replies = client
        .send_batch(
            &mut conn,
            &[
                Command::new(["SET", "a", "1"]),
                Command::new(["SET", "b", "2"]),
                Command::new(["DEL", "a"]),
            ],
        )
        .unwrap();

    assert_eq!(replies.len(), 3);
    assert_eq!(*seen.lock().unwrap(), vec!["SET", "SET", "DEL"]);
}

// =============================================================================
// Handshake Tests
// =============================================================================

#[test]
fn test_handshake_sends_auth_and_select() {
    let seen = Arc::new(Mutex::new(Vec::<Vec<Bytes>>::new()));
    let log = Arc::clone(&seen);
    let url = spawn_server(move |args| {
        log.lock().unwrap().push(args.to_vec());
        simple("OK")
    });
    let url = url.replace("redis://", "redis://app:s3cret@") + "/4";

    let client = client();
    let conn = client.open(&endpoint(&url)).unwrap();
    client.close(conn);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], vec![Bytes::from("AUTH"), Bytes::from("app"), Bytes::from("s3cret")]);
    assert_eq!(seen[1], vec![Bytes::from("SELECT"), Bytes::from("4")]);
}

#[test]
fn test_rejected_auth_is_authentication_error() {
    let url = spawn_server(|args| match name(args).as_str() {
        "AUTH" => error("WRONGPASS invalid username-password pair"),
        _ => simple("OK"),
    });
    let url = url.replace("redis://", "redis://:bad@");

    let err = client().open(&endpoint(&url)).unwrap_err();
    assert!(matches!(err, ConnError::Auth(_)));
    assert_eq!(classify(err).kind(), ErrorKind::Authentication);
}

#[test]
fn test_rejected_select_is_connection_error() {
    let url = spawn_server(|args| match name(args).as_str() {
        "SELECT" => error("ERR DB index is out of range"),
        _ => simple("OK"),
    });

    let err = client().open(&endpoint(&format!("{}/99", url))).unwrap_err();
    assert!(matches!(err, ConnError::Handshake(_)));
    assert_eq!(classify(err).kind(), ErrorKind::Connection);
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_refused_connection_is_connection_error() {
    let err = client().open(&endpoint(&closed_port_url())).unwrap_err();
    assert_eq!(classify(err).kind(), ErrorKind::Connection);
}

#[test]
fn test_peer_hangup_is_network_error() {
    let url = spawn_server(|args| match name(args).as_str() {
        "QUIT" => Script::Hangup,
        _ => simple("OK"),
    });
    let client = client();
    let mut conn = client.open(&endpoint(&url)).unwrap();

    let err = client.send(&mut conn, &Command::new(["QUIT"])).unwrap_err();
    assert_eq!(classify(err).kind(), ErrorKind::Network);
}

#[test]
fn test_stalled_reply_is_timeout_error() {
    let url = spawn_server(|_| Script::Stall);
    let client = client();
    let mut conn = client.open(&endpoint(&url)).unwrap();

    let err = client.send(&mut conn, &Command::new(["GET", "k"])).unwrap_err();
    assert_eq!(classify(err).kind(), ErrorKind::Timeout);
}

#[test]
fn test_garbled_reply_is_connection_error() {
    let url = spawn_server(|_| Script::Reply(b"?what\r\n".to_vec()));
    let client = client();
    let mut conn = client.open(&endpoint(&url)).unwrap();

    let err = client.send(&mut conn, &Command::new(["PING"])).unwrap_err();
    assert!(matches!(err, ConnError::Protocol(_)));
    assert_eq!(classify(err).kind(), ErrorKind::Connection);
}

#[test]
fn test_unresolvable_host_is_connection_error() {
    let err = client()
        .open(&endpoint("redis://no-such-host.invalid:6379"))
        .unwrap_err();
    assert_eq!(classify(err).kind(), ErrorKind::Connection);
}

// =============================================================================
// Pool over TCP Tests
// =============================================================================

#[test]
fn test_pool_over_tcp() {
    let url = spawn_store_server();
    let config = PoolConfig::builder("tcp", url)
        .pool_size(3)
        .health_check_interval_ms(0)
        .build();
    let pool = Pool::start(config.clone(), RespClient::from_config(&config)).unwrap();
    let opts = ExecOptions::default();

    pool.execute(&Command::new(["SET", "k", "v"]), &opts).unwrap();
    assert_eq!(pool.execute(&Command::new(["GET", "k"]), &opts).unwrap(), Reply::bulk("v"));
    assert_eq!(pool.execute(&Command::new(["GET", "nope"]), &opts).unwrap(), Reply::Nil);

    let replies = pool
        .execute_batch(
            &[Command::new(["INCR", "n"]), Command::new(["INCR", "n"])],
            &opts,
        )
        .unwrap();
    assert_eq!(replies, vec![Reply::Integer(1), Reply::Integer(2)]);

    let report = pool.check_idle_workers(true);
    assert_eq!(report.checked, 3);
    assert_eq!(report.removed, 0);
    pool.stop();
}

#[test]
fn test_pool_start_against_dead_server() {
    let config = PoolConfig::builder("dead", closed_port_url())
        .pool_size(2)
        .health_check_interval_ms(0)
        .connect_timeout_ms(500)
        .build();
    let err = Pool::start(config.clone(), RespClient::from_config(&config)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
}
