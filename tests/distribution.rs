//! End-to-end tests against scripted peers.
//!
//! Each test drives a real `Node` over an in-memory duplex stream; the
//! other end plays an accepting Erlang node by hand, byte for byte: the
//! version-6 handshake, then 4-byte-framed pass-through traffic.

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::sleep;
use waxwing::dist::handshake::gen_digest;
use waxwing::term::{decode, decode_stream, encode};
use waxwing::{atom, Atom, ExitReason, NodeConfig, Pid, Term};

const COOKIE: &str = "monster";
const PEER_NAME: &str = "peer@srv";
const PEER_CREATION: u32 = 4;
const ASSIGNED_CREATION: u32 = 123;

async fn read_frame2(stream: &mut DuplexStream) -> Vec<u8> {
    let mut len = [0u8; 2];
    stream.read_exact(&mut len).await.unwrap();
    let mut frame = vec![0u8; u16::from_be_bytes(len) as usize];
    stream.read_exact(&mut frame).await.unwrap();
    frame
}

async fn write_frame2(stream: &mut DuplexStream, body: &[u8]) {
    stream
        .write_all(&(body.len() as u16).to_be_bytes())
        .await
        .unwrap();
    stream.write_all(body).await.unwrap();
}

async fn read_frame4(stream: &mut DuplexStream) -> Vec<u8> {
    let mut len = [0u8; 4];
    stream.read_exact(&mut len).await.unwrap();
    let mut frame = vec![0u8; u32::from_be_bytes(len) as usize];
    stream.read_exact(&mut frame).await.unwrap();
    frame
}

async fn write_frame4(stream: &mut DuplexStream, body: &[u8]) {
    stream
        .write_all(&(body.len() as u32).to_be_bytes())
        .await
        .unwrap();
    stream.write_all(body).await.unwrap();
}

/// Plays the accepting side of the handshake: assigns the client the name
/// it asked for with creation [`ASSIGNED_CREATION`].
async fn serve_handshake(stream: &mut DuplexStream) {
    // send_name: 'N' flags(8) creation(4) nlen(2) name.
    let name_frame = read_frame2(stream).await;
    assert_eq!(name_frame[0], b'N');
    let nlen = u16::from_be_bytes([name_frame[13], name_frame[14]]) as usize;
    let requested = name_frame[15..15 + nlen].to_vec();

    let mut status = b"snamed:".to_vec();
    status.extend_from_slice(&(requested.len() as u16).to_be_bytes());
    status.extend_from_slice(&requested);
    status.extend_from_slice(&ASSIGNED_CREATION.to_be_bytes());
    write_frame2(stream, &status).await;

    let mut challenge = vec![b'N'];
    challenge.extend_from_slice(&0x2000_0000_3FFFFu64.to_be_bytes());
    challenge.extend_from_slice(&0xB0BA_BEEFu32.to_be_bytes());
    challenge.extend_from_slice(&PEER_CREATION.to_be_bytes());
    challenge.extend_from_slice(&(PEER_NAME.len() as u16).to_be_bytes());
    challenge.extend_from_slice(PEER_NAME.as_bytes());
    write_frame2(stream, &challenge).await;

    let reply = read_frame2(stream).await;
    assert_eq!(reply[0], b'r');
    assert_eq!(&reply[5..21], &gen_digest(0xB0BA_BEEF, COOKIE));
    let challenge_a = u32::from_be_bytes([reply[1], reply[2], reply[3], reply[4]]);

    let mut ack = vec![b'a'];
    ack.extend_from_slice(&gen_digest(challenge_a, COOKIE));
    write_frame2(stream, &ack).await;
}

/// Splits a pass-through frame into its control and payload terms, seen
/// from the peer's side (no elision scope).
fn split_frame(frame: &[u8]) -> (Term, Option<Term>) {
    assert_eq!(frame[0], 0x70, "expected a pass-through frame");
    let (control, used) = decode_stream(&frame[1..], None).unwrap();
    let rest = &frame[1 + used..];
    let payload = if rest.is_empty() {
        None
    } else {
        Some(decode(rest, None).unwrap())
    };
    (control, payload)
}

fn pass_through(control: &Term, payload: Option<&Term>) -> Vec<u8> {
    let mut frame = vec![0x70];
    frame.extend(encode(control, None).unwrap());
    if let Some(payload) = payload {
        frame.extend(encode(payload, None).unwrap());
    }
    frame
}

fn test_node() -> waxwing::Node {
    NodeConfig::new()
        .name("wax@localhost")
        .cookie(COOKIE)
        .start()
        .unwrap()
}

fn peer_pid(id: u32) -> Pid {
    Pid::external(Atom::new(PEER_NAME), id, 0, PEER_CREATION)
}

#[tokio::test]
async fn rpc_round_trip_with_scripted_rex() {
    let node = test_node();
    let handle = node.handle();
    let (client_side, mut server) = tokio::io::duplex(64 * 1024);

    let peer = tokio::spawn(async move {
        serve_handshake(&mut server).await;

        // The rpc worker addresses {rex, Node} via REG_SEND.
        let frame = read_frame4(&mut server).await;
        let (control, payload) = split_frame(&frame);
        let items = control.as_tuple().unwrap();
        assert_eq!(items[0], Term::int(6));
        assert_eq!(items[3], Term::atom("rex"));

        // Payload: {CallerPid, {call, erlang, node, [], user}}.
        let payload = payload.expect("REG_SEND carries a payload");
        let request = payload.as_tuple().unwrap();
        let caller = request[0].clone();
        assert!(matches!(caller, Term::Pid(_)));
        assert_eq!(
            request[1],
            Term::tuple(vec![
                Term::atom("call"),
                Term::atom("erlang"),
                Term::atom("node"),
                Term::Nil,
                Term::atom("user"),
            ])
        );

        // rex answers {rex, "pong"} straight to the caller.
        let reply_control = Term::tuple(vec![
            Term::int(22),
            Term::Pid(peer_pid(1)),
            caller,
        ]);
        let reply = Term::tuple(vec![Term::atom("rex"), Term::charlist("pong")]);
        write_frame4(&mut server, &pass_through(&reply_control, Some(&reply))).await;

        // Keep the connection open until the test is done with it.
        sleep(Duration::from_millis(200)).await;
    });

    let connected = handle.connect_stream(client_side).await.unwrap();
    assert_eq!(connected, Atom::new(PEER_NAME));
    assert_eq!(handle.nodes(), vec![Atom::new(PEER_NAME)]);

    let result = handle
        .rpc(connected, atom!("erlang"), atom!("node"), Term::Nil)
        .await
        .unwrap();
    assert_eq!(result, Term::charlist("pong"));

    peer.await.unwrap();
}

#[tokio::test]
async fn heartbeats_are_echoed() {
    let node = test_node();
    let handle = node.handle();
    let (client_side, mut server) = tokio::io::duplex(64 * 1024);

    let peer = tokio::spawn(async move {
        serve_handshake(&mut server).await;

        let mut len = [0u8; 4];
        server.write_all(&0u32.to_be_bytes()).await.unwrap();
        server.read_exact(&mut len).await.unwrap();
        u32::from_be_bytes(len)
    });

    handle.connect_stream(client_side).await.unwrap();
    assert_eq!(peer.await.unwrap(), 0, "heartbeat must be echoed empty");
}

#[tokio::test]
async fn send_to_remote_pid_uses_send_sender() {
    let node = test_node();
    let handle = node.handle();
    let (client_side, mut server) = tokio::io::duplex(64 * 1024);

    let peer = tokio::spawn(async move {
        serve_handshake(&mut server).await;

        let frame = read_frame4(&mut server).await;
        let (control, payload) = split_frame(&frame);
        let items = control.as_tuple().unwrap();
        assert_eq!(items[0], Term::int(22));
        // The destination travels fully qualified.
        assert_eq!(items[2], Term::Pid(peer_pid(9)));
        // Our root pid was stamped with the assigned identity.
        let Term::Pid(from) = &items[1] else {
            panic!("SEND_SENDER from must be a pid");
        };
        assert_eq!(from.node(), Some(Atom::new("wax@localhost")));
        assert_eq!(from.creation(), ASSIGNED_CREATION);

        assert_eq!(payload, Some(Term::atom("hello")));
    });

    handle.connect_stream(client_side).await.unwrap();
    handle
        .send(peer_pid(9), Term::atom("hello"))
        .await
        .unwrap();

    peer.await.unwrap();
}

#[tokio::test]
async fn remote_link_then_exit_kills_local_process() {
    let node = test_node();
    let handle = node.handle();
    let (client_side, mut server) = tokio::io::duplex(64 * 1024);

    let peer = tokio::spawn(async move {
        serve_handshake(&mut server).await;

        // LINK: {1, Local, Remote}.
        let frame = read_frame4(&mut server).await;
        let (control, _) = split_frame(&frame);
        let items = control.as_tuple().unwrap();
        assert_eq!(items[0], Term::int(1));
        let local = items[1].clone();
        assert_eq!(items[2], Term::Pid(peer_pid(7)));

        // The remote end dies abnormally: {3, Remote, Local, boom}.
        let exit = Term::tuple(vec![
            Term::int(3),
            Term::Pid(peer_pid(7)),
            local,
            Term::atom("boom"),
        ]);
        write_frame4(&mut server, &pass_through(&exit, None)).await;
        sleep(Duration::from_millis(200)).await;
    });

    handle.connect_stream(client_side).await.unwrap();

    let linked = handle.spawn(move |mut ctx| async move {
        ctx.link(peer_pid(7)).await.unwrap();
        let _ = ctx.receive(|_: &Term| None::<()>).await;
    });

    sleep(Duration::from_millis(100)).await;
    assert!(
        !handle.alive(linked),
        "exit signal from the linked remote process must terminate it"
    );
    peer.await.unwrap();
}

#[tokio::test]
async fn pending_unlink_defuses_exit_until_acknowledged() {
    let node = test_node();
    let handle = node.handle();
    let (client_side, mut server) = tokio::io::duplex(64 * 1024);

    let peer = tokio::spawn(async move {
        serve_handshake(&mut server).await;

        // LINK, then UNLINK_ID: {35, Id, Local, Remote}.
        let (link, _) = split_frame(&read_frame4(&mut server).await);
        let local = link.as_tuple().unwrap()[1].clone();

        let (unlink, _) = split_frame(&read_frame4(&mut server).await);
        let items = unlink.as_tuple().unwrap();
        assert_eq!(items[0], Term::int(35));
        let id = items[1].clone();

        // An exit racing ahead of the acknowledgement must be ignored:
        // the local side already asked to dissolve this link.
        let exit = Term::tuple(vec![
            Term::int(3),
            Term::Pid(peer_pid(7)),
            local.clone(),
            Term::atom("boom"),
        ]);
        write_frame4(&mut server, &pass_through(&exit, None)).await;
        sleep(Duration::from_millis(100)).await;

        // Now acknowledge: {36, Id, Remote, Local}.
        let ack = Term::tuple(vec![
            Term::int(36),
            id,
            Term::Pid(peer_pid(7)),
            local,
        ]);
        write_frame4(&mut server, &pass_through(&ack, None)).await;
        sleep(Duration::from_millis(200)).await;
    });

    handle.connect_stream(client_side).await.unwrap();

    let unlinked = handle.spawn(move |mut ctx| async move {
        ctx.link(peer_pid(7)).await.unwrap();
        ctx.unlink(peer_pid(7)).await.unwrap();
        let _ = ctx.receive(|_: &Term| None::<()>).await;
    });

    sleep(Duration::from_millis(250)).await;
    assert!(
        handle.alive(unlinked),
        "exit through a half-dissolved link must not terminate the process"
    );

    handle.exit(unlinked, ExitReason::Kill);
    peer.await.unwrap();
}

#[tokio::test]
async fn reg_send_reaches_registered_process() {
    let node = test_node();
    let handle = node.handle();
    let (client_side, mut server) = tokio::io::duplex(64 * 1024);

    let peer = tokio::spawn(async move {
        serve_handshake(&mut server).await;

        // {6, From, '', keeper} with a payload for the named process.
        let control = Term::tuple(vec![
            Term::int(6),
            Term::Pid(peer_pid(2)),
            Term::atom(""),
            Term::atom("keeper"),
        ]);
        let payload = Term::tuple(vec![Term::atom("note"), Term::int(7)]);
        write_frame4(&mut server, &pass_through(&control, Some(&payload))).await;
        sleep(Duration::from_millis(200)).await;
    });

    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    handle.spawn(move |mut ctx| async move {
        assert!(ctx.register(atom!("keeper")));
        let message = ctx.recv().await.unwrap();
        let _ = done_tx.send(message);
    });
    sleep(Duration::from_millis(20)).await;

    handle.connect_stream(client_side).await.unwrap();

    let message = done_rx.await.unwrap();
    assert_eq!(
        message,
        Term::tuple(vec![Term::atom("note"), Term::int(7)])
    );
    peer.await.unwrap();
}

#[tokio::test]
async fn connection_loss_sends_noconnection_to_linked_processes() {
    let node = test_node();
    let handle = node.handle();
    let (client_side, mut server) = tokio::io::duplex(64 * 1024);

    let peer = tokio::spawn(async move {
        serve_handshake(&mut server).await;
        // Consume the LINK, then drop the connection entirely.
        let _ = read_frame4(&mut server).await;
        drop(server);
    });

    handle.connect_stream(client_side).await.unwrap();

    let linked = handle.spawn(move |mut ctx| async move {
        ctx.link(peer_pid(3)).await.unwrap();
        let _ = ctx.receive(|_: &Term| None::<()>).await;
    });

    peer.await.unwrap();
    sleep(Duration::from_millis(100)).await;

    assert!(handle.nodes().is_empty(), "connection entry must be gone");
    assert!(
        !handle.alive(linked),
        "links to the lost node observe noconnection"
    );
}
