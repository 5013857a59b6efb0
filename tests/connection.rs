//! End-to-end loopback tests driving the public API over real `TcpStream`s,
//! exercising `connect`/`Acceptor` alongside `Connection` the way a caller
//! outside this crate would.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use epoxy_core::hooks::{ConnectArgs, DisconnectArgs, ListenerHooks, ReceiveContext, ServiceHost};
use epoxy_core::message::{ConnectionMetrics, ErrorRecord};
use epoxy_core::{connect, Acceptor, Connection, ConnectionOptions, ConnectionState, Message, Role};

struct EchoHost;

impl ServiceHost for EchoHost {
    fn dispatch_request(
        &self,
        _method_name: &str,
        _ctx: &ReceiveContext,
        request: Message,
        _metrics: &ConnectionMetrics,
    ) -> Message {
        request
    }

    fn dispatch_event(&self, _method_name: &str, _ctx: &ReceiveContext, _event: Message, _metrics: &ConnectionMetrics) {}
}

#[test]
fn client_and_server_complete_a_request_over_real_sockets() {
    let acceptor = Acceptor::bind("127.0.0.1:0").unwrap();
    let addr = acceptor.local_addr().unwrap();

    let accept_thread = thread::spawn(move || acceptor.accept_one().unwrap());
    let client_stream = connect(addr, Duration::from_secs(1)).unwrap();
    let server_stream = accept_thread.join().unwrap();

    let mut server_opts = ConnectionOptions::default();
    server_opts.service_host = Arc::new(EchoHost);
    let server = Connection::new(server_stream, Role::Server, server_opts).unwrap();
    let server_handle = Arc::clone(&server);
    let server_thread = thread::spawn(move || server_handle.start());

    let client = Connection::new(client_stream, Role::Client, ConnectionOptions::default()).unwrap();
    client.start().unwrap();
    server_thread.join().unwrap().unwrap();

    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(server.state(), ConnectionState::Connected);

    let response = client
        .request_response("Echo", Message::payload(b"integration".to_vec()))
        .unwrap();
    match response {
        Message::Payload(bytes) => assert_eq!(bytes, b"integration"),
        other => panic!("unexpected {other:?}"),
    }

    client.stop().unwrap();
    server.stop().unwrap();
}

#[test]
fn listener_rejection_closes_the_connection_on_both_sides() {
    struct RejectAll;
    impl ListenerHooks for RejectAll {
        fn on_connected(&self, _args: &ConnectArgs) -> Option<ErrorRecord> {
            Some(ErrorRecord::new(7, "not today"))
        }
        fn on_disconnected(&self, _args: &DisconnectArgs) {}
    }

    let acceptor = Acceptor::bind("127.0.0.1:0").unwrap();
    let addr = acceptor.local_addr().unwrap();

    let accept_thread = thread::spawn(move || acceptor.accept_one().unwrap());
    let client_stream = connect(addr, Duration::from_secs(1)).unwrap();
    let server_stream = accept_thread.join().unwrap();

    let mut server_opts = ConnectionOptions::default();
    server_opts.listener = Some(Arc::new(RejectAll));
    let server = Connection::new(server_stream, Role::Server, server_opts).unwrap();
    let server_handle = Arc::clone(&server);
    let server_thread = thread::spawn(move || server_handle.start());

    let client = Connection::new(client_stream, Role::Client, ConnectionOptions::default()).unwrap();
    let client_result = client.start();
    let server_result = server_thread.join().unwrap();

    assert!(client_result.is_err());
    assert!(server_result.is_err());
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(server.state(), ConnectionState::Disconnected);
}

#[test]
fn a_peer_that_never_sends_its_handshake_framelet_times_out_instead_of_hanging() {
    let acceptor = Acceptor::bind("127.0.0.1:0").unwrap();
    let addr = acceptor.local_addr().unwrap();

    let accept_thread = thread::spawn(move || acceptor.accept_one().unwrap());
    let client_stream = connect(addr, Duration::from_secs(1)).unwrap();
    let server_stream = accept_thread.join().unwrap();
    // Held open but silent; the server must give up rather than block forever
    // waiting for an EpoxyConfig framelet that's never coming.
    let _silent_client = client_stream;

    let mut server_opts = ConnectionOptions::default();
    server_opts.parameters.handshake_timeout = Duration::from_millis(200);
    let server = Connection::new(server_stream, Role::Server, server_opts).unwrap();

    let result = server.start();

    assert!(result.is_err());
    assert_eq!(server.state(), ConnectionState::Disconnected);
}

#[test]
fn connect_times_out_against_an_unroutable_address() {
    // TEST-NET-1, reserved for documentation; routers are expected to drop it.
    let result = connect("192.0.2.1:9", Duration::from_millis(200));
    assert!(result.is_err());
}
