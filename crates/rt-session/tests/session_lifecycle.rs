//! Channel session behavior over the loopback transport

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rt_core::config::SessionSettings;
use rt_core::traits::ScriptedPrompter;
use rt_core::{
    CommandSeq, ConnectError, ConnectionDescriptor, DisconnectReason, ExecError, LinkFailure,
    SessionError, SessionState, TerminalSize,
};
use rt_session::{
    AddressBehavior, CaptureEnd, ChannelSession, MemoryTransport, OutputEvent, RemoteEnd,
    SessionNotice, TerminalDriver,
};
use rt_terminal::ProbeQuery;
use tokio::sync::mpsc::UnboundedReceiver;

fn settings() -> SessionSettings {
    SessionSettings {
        connect_timeout: Duration::from_secs(2),
        ..SessionSettings::default()
    }
}

fn descriptor(addresses: &[&str]) -> ConnectionDescriptor {
    ConnectionDescriptor::new(addresses.iter().copied(), 22)
        .with_username("admin")
        .with_size(TerminalSize::new(80, 24))
}

fn session(transport: &MemoryTransport) -> ChannelSession {
    ChannelSession::new(Arc::new(transport.clone()), settings())
}

async fn connected(host: &str) -> (MemoryTransport, ChannelSession, RemoteEnd) {
    let transport = MemoryTransport::new().with_behavior(host, AddressBehavior::Accept);
    let mut session = session(&transport);
    session.connect(descriptor(&[host])).await.unwrap();
    let remote = transport.next_remote().await.unwrap();
    (transport, session, remote)
}

async fn next_data(rx: &mut UnboundedReceiver<OutputEvent>) -> Bytes {
    loop {
        match rx.recv().await.expect("sink closed") {
            OutputEvent::Data(bytes) => return bytes,
            OutputEvent::Disconnected(reason) => panic!("disconnected: {}", reason),
            _ => {}
        }
    }
}

async fn next_disconnect(rx: &mut UnboundedReceiver<OutputEvent>) -> DisconnectReason {
    loop {
        if let OutputEvent::Disconnected(reason) = rx.recv().await.expect("sink closed") {
            return reason;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_falls_back_to_next_address() {
    let transport = MemoryTransport::new()
        .with_behavior("10.0.0.1", AddressBehavior::Hang)
        .with_behavior("10.0.0.2", AddressBehavior::Accept);
    let mut session = session(&transport);

    let ready = session
        .connect(descriptor(&["10.0.0.1", "10.0.0.2"]))
        .await
        .unwrap();

    assert_eq!(ready.address, "10.0.0.2");
    assert_eq!(ready.attempts, 2);
    assert_eq!(transport.attempts(), vec!["10.0.0.1", "10.0.0.2"]);
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(session.handle().address().as_deref(), Some("10.0.0.2"));
}

#[tokio::test(start_paused = true)]
async fn test_auth_rejection_outranks_other_failures() {
    let transport = MemoryTransport::new()
        .with_behavior("a", AddressBehavior::RejectAuth)
        .with_behavior("b", AddressBehavior::Refuse);
    let mut session = session(&transport);

    let err = session.connect(descriptor(&["a", "b"])).await.unwrap_err();
    assert_eq!(err, ConnectError::AuthRejected);
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(session.can_reconnect());
}

#[tokio::test(start_paused = true)]
async fn test_last_error_reported_when_all_fail() {
    let transport = MemoryTransport::new()
        .with_behavior("a", AddressBehavior::Refuse)
        .with_behavior("b", AddressBehavior::Hang);
    let mut session = session(&transport);

    let err = session.connect(descriptor(&["a", "b"])).await.unwrap_err();
    assert_eq!(err, ConnectError::Timeout(Duration::from_secs(2)));

    let err = session.connect(descriptor(&[])).await.unwrap_err();
    assert!(matches!(err, ConnectError::Unreachable(_)));
}

#[tokio::test(start_paused = true)]
async fn test_every_sink_sees_output_in_order() {
    let transport = MemoryTransport::new().with_behavior("h", AddressBehavior::Accept);
    let mut session = session(&transport);
    let mut early = session.subscribe();

    session.connect(descriptor(&["h"])).await.unwrap();
    let mut remote = transport.next_remote().await.unwrap();
    let handle = session.handle();
    let mut late = handle.subscribe();

    // A write queued after the subscription proves it is registered.
    handle.send_input(&b"\r"[..]).unwrap();
    assert_eq!(remote.recv_input().await.unwrap(), Bytes::from_static(b"\r"));

    remote.send(&b"one "[..]);
    remote.send(&b"two"[..]);

    assert_eq!(
        early.recv().await.unwrap(),
        OutputEvent::Connected {
            address: "h".into(),
            size: TerminalSize::new(80, 24)
        }
    );
    for sink in [&mut early, &mut late] {
        assert_eq!(next_data(sink).await, Bytes::from_static(b"one "));
        assert_eq!(next_data(sink).await, Bytes::from_static(b"two"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_unexpected_disconnect_raises_notices_and_allows_reconnect() {
    let transport = MemoryTransport::new().with_behavior("h", AddressBehavior::Accept);
    let mut session = session(&transport);
    let mut notices = session.notices();
    let mut sink = session.subscribe();

    session.connect(descriptor(&["h"])).await.unwrap();
    assert_eq!(
        notices.recv().await.unwrap(),
        SessionNotice::Connected { address: "h".into() }
    );
    let remote = transport.next_remote().await.unwrap();

    remote.fail(LinkFailure::ConnectionReset);
    assert_eq!(
        next_disconnect(&mut sink).await,
        DisconnectReason::Unexpected(LinkFailure::ConnectionReset)
    );
    assert_eq!(
        notices.recv().await.unwrap(),
        SessionNotice::UnexpectedDisconnect {
            cause: LinkFailure::ConnectionReset
        }
    );
    assert_eq!(notices.recv().await.unwrap(), SessionNotice::ReconnectAvailable);
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(session.can_reconnect());

    let handle = session.handle();
    assert_eq!(
        handle.send_input(&b"ls"[..]),
        Err(SessionError::NotConnected(SessionState::Disconnected))
    );

    let ready = session.reconnect().await.unwrap();
    assert_eq!(ready.address, "h");
    assert!(matches!(
        sink.recv().await.unwrap(),
        OutputEvent::Connected { .. }
    ));
    let mut remote = transport.next_remote().await.unwrap();
    handle.send_input(&b"ls\r"[..]).unwrap();
    assert_eq!(remote.recv_input().await.unwrap(), Bytes::from_static(b"ls\r"));
}

#[tokio::test(start_paused = true)]
async fn test_eof_is_an_unexpected_disconnect() {
    let (_transport, session, remote) = connected("h").await;
    let mut sink = session.subscribe();

    remote.eof();
    assert_eq!(
        next_disconnect(&mut sink).await,
        DisconnectReason::Unexpected(LinkFailure::Eof)
    );
    assert!(session.can_reconnect());
}

#[tokio::test(start_paused = true)]
async fn test_manual_disconnect_is_silent_and_forgets_descriptor() {
    let (_transport, mut session, remote) = connected("h").await;
    let mut notices = session.notices();
    let mut sink = session.subscribe();

    session.disconnect(DisconnectReason::Manual).await;

    assert_eq!(next_disconnect(&mut sink).await, DisconnectReason::Manual);
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(notices.try_recv().is_err());
    assert!(!session.can_reconnect());
    assert!(remote.is_closed());
    assert_eq!(
        session.reconnect().await.unwrap_err(),
        SessionError::NothingToReconnect
    );
}

#[tokio::test(start_paused = true)]
async fn test_manual_disconnect_wins_race_with_link_failure() {
    let (_transport, mut session, remote) = connected("h").await;
    let mut notices = session.notices();

    remote.fail(LinkFailure::BrokenPipe);
    session.disconnect(DisconnectReason::Manual).await;

    assert_eq!(session.last_disconnect(), Some(&DisconnectReason::Manual));
    assert!(notices.try_recv().is_err());
    assert!(!session.can_reconnect());
}

#[tokio::test(start_paused = true)]
async fn test_requested_unexpected_disconnect_keeps_descriptor() {
    let (_transport, mut session, _remote) = connected("h").await;
    let mut notices = session.notices();

    session
        .disconnect(DisconnectReason::Unexpected(LinkFailure::Other("test".into())))
        .await;

    assert!(session.can_reconnect());
    assert!(matches!(
        notices.recv().await.unwrap(),
        SessionNotice::UnexpectedDisconnect { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_while_connected_is_a_no_op() {
    let (transport, mut session, _remote) = connected("h").await;
    let first = session.reconnect().await.unwrap();
    let second = session.reconnect().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(transport.attempts().len(), 1);
    assert_eq!(session.state(), SessionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_disconnected_session_fails_fast() {
    let transport = MemoryTransport::new();
    let session = session(&transport);
    let handle = session.handle();

    assert_eq!(
        handle.send_input(&b"x"[..]),
        Err(SessionError::NotConnected(SessionState::Disconnected))
    );
    assert_eq!(
        handle.execute_command("ls").await.unwrap_err(),
        ExecError::NotConnected(SessionState::Disconnected)
    );
}

#[tokio::test(start_paused = true)]
async fn test_resize_reaches_remote_and_survives_reconnect() {
    let (transport, mut session, mut remote) = connected("h").await;
    let handle = session.handle();
    let mut sink = handle.subscribe();
    let size = TerminalSize::new(120, 40);

    handle.resize(size).unwrap();
    assert_eq!(remote.next_resize().await, Some(size));
    loop {
        if sink.recv().await.unwrap() == OutputEvent::Resized(size) {
            break;
        }
    }
    assert_eq!(handle.size(), size);

    remote.fail(LinkFailure::ConnectionReset);
    next_disconnect(&mut sink).await;
    let ready = session.reconnect().await.unwrap();
    assert_eq!(ready.size, size);
    let remote = transport.next_remote().await.unwrap();
    assert_eq!(remote.initial_size(), size);
}

#[tokio::test(start_paused = true)]
async fn test_execute_command_captures_until_quiet() {
    let (_transport, session, mut remote) = connected("h").await;
    let handle = session.handle();

    let shell = async {
        let input = remote.recv_input().await.unwrap();
        assert_eq!(input, Bytes::from_static(b"uptime\r"));
        remote.send(&b"uptime\r\n\x1b[1m 10:00 up 3 days\x1b[0m\r\n"[..]);
        tokio::time::sleep(Duration::from_millis(100)).await;
        remote.send(&b"$ "[..]);
    };
    let (captured, ()) = tokio::join!(handle.execute_command("uptime"), shell);
    let captured = captured.unwrap();

    assert_eq!(captured.seq, CommandSeq(1));
    assert_eq!(captured.ended, CaptureEnd::Quiet);
    assert_eq!(captured.output, "uptime\n 10:00 up 3 days\n$");
    assert!(captured.raw.starts_with(b"uptime\r\n\x1b[1m"));

    let (second, ()) = tokio::join!(handle.execute_command("true"), async {
        remote.recv_input().await;
    });
    let second = second.unwrap();
    assert_eq!(second.seq, CommandSeq(2));
    assert_eq!(second.ended, CaptureEnd::NoOutput);
    assert!(second.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_execute_command_reports_closed_channel() {
    let (_transport, session, mut remote) = connected("h").await;
    let handle = session.handle();

    let shell = async {
        remote.recv_input().await;
        remote.send(&b"partial"[..]);
        remote.fail(LinkFailure::ConnectionReset);
    };
    let (result, ()) = tokio::join!(handle.execute_command("cat big"), shell);
    assert_eq!(result.unwrap_err(), ExecError::ChannelClosed);
}

#[tokio::test(start_paused = true)]
async fn test_missing_password_is_prompted() {
    let transport = MemoryTransport::new()
        .with_behavior("h", AddressBehavior::Accept)
        .with_credentials("admin", "secret");
    let mut session = session(&transport);
    let prompter = Arc::new(ScriptedPrompter::new(["secret"]));
    session.set_prompter(prompter.clone());

    session.connect(descriptor(&["h"])).await.unwrap();
    assert_eq!(prompter.asked(), vec!["Password: "]);

    session.disconnect(DisconnectReason::Manual).await;
    session.set_prompter(Arc::new(ScriptedPrompter::new(Vec::<String>::new())));
    let err = session.connect(descriptor(&["h"])).await.unwrap_err();
    assert_eq!(err, ConnectError::AuthRejected);
}

#[tokio::test(start_paused = true)]
async fn test_driver_answers_probes_only_inside_window() {
    let transport = MemoryTransport::new().with_behavior("h", AddressBehavior::Accept);
    let mut session = session(&transport);
    let mut driver = TerminalDriver::spawn(session.handle(), Duration::from_secs(5));
    let mut queries = driver.take_queries().unwrap();
    let mut snapshots = driver.snapshots();

    session.connect(descriptor(&["h"])).await.unwrap();
    let mut remote = transport.next_remote().await.unwrap();

    remote.send(&b"\x1b[c"[..]);
    assert_eq!(
        remote.recv_input().await.unwrap(),
        Bytes::from_static(b"\x1b[?1;2c")
    );

    tokio::time::sleep(Duration::from_secs(6)).await;
    remote.send(&b"hello\x1b[c"[..]);
    assert_eq!(queries.recv().await, Some(ProbeQuery::PrimaryAttributes));
    assert!(remote.drain_input().is_empty());

    loop {
        if snapshots.borrow_and_update().lines[0] == "hello" {
            break;
        }
        snapshots.changed().await.unwrap();
    }
    driver.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_driver_attached_after_connect_answers_probes() {
    let (_transport, session, mut remote) = connected("h").await;
    assert!(session.handle().status().borrow().connected_at.is_some());

    let mut driver = TerminalDriver::spawn(session.handle(), Duration::from_secs(5));
    let mut queries = driver.take_queries().unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    remote.send(&b"\x1b[c"[..]);
    let reply = tokio::time::timeout(Duration::from_secs(1), remote.recv_input()).await;
    assert_eq!(reply.unwrap().unwrap(), Bytes::from_static(b"\x1b[?1;2c"));
    assert!(queries.try_recv().is_err());
    driver.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_driver_attached_late_counts_window_from_connect() {
    let (_transport, mut session, mut remote) = connected("h").await;
    tokio::time::sleep(Duration::from_secs(6)).await;

    let mut driver = TerminalDriver::spawn(session.handle(), Duration::from_secs(5));
    let mut queries = driver.take_queries().unwrap();

    remote.send(&b"\x1b[c"[..]);
    assert_eq!(queries.recv().await, Some(ProbeQuery::PrimaryAttributes));
    assert!(remote.drain_input().is_empty());
    driver.stop().await;

    session.disconnect(DisconnectReason::Manual).await;
    assert!(session.handle().status().borrow().connected_at.is_none());
}

#[tokio::test]
async fn test_input_reaches_remote_during_output_flood() {
    const CHUNKS: usize = 100_000;
    let (_transport, session, mut remote) = connected("h").await;
    let handle = session.handle();
    let mut output = handle.subscribe();

    for _ in 0..CHUNKS {
        remote.send(&b"y\r\n"[..]);
    }
    handle.send_input(&b"\x03"[..]).unwrap();
    assert_eq!(
        remote.recv_input().await.unwrap(),
        Bytes::from_static(b"\x03")
    );

    let mut delivered = 0;
    while let Ok(OutputEvent::Data(_)) = output.try_recv() {
        delivered += 1;
    }
    assert!(delivered < CHUNKS, "input waited for {} chunks", delivered);
}

#[tokio::test(start_paused = true)]
async fn test_started_command_is_sent_even_if_capture_is_dropped() {
    let (_transport, session, mut remote) = connected("h").await;
    let handle = session.handle();

    let pending = handle.start_command(CommandSeq(7), "uptime").unwrap();
    assert_eq!(pending.seq(), CommandSeq(7));
    drop(pending);

    assert_eq!(
        remote.recv_input().await.unwrap(),
        Bytes::from_static(b"uptime\r")
    );
}
