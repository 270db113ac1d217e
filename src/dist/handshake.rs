//! The distribution handshake, client side.
//!
//! Version 6 ('N' messages), as an initiating node with a dynamic name:
//!
//! ```text
//! start ── send_name ──► await_status ── "named:" ──► await_challenge
//!       ── challenge_reply ──► await_ack ── digest ok ──► connected
//! ```
//!
//! We advertise [`NAME_ME`](super::flags::DistFlags::NAME_ME), so the
//! accepting node assigns our node name and creation and returns them in
//! the status message; those become the identity under which PIDs and
//! references travel on this connection. Any status other than `named:`
//! fails the handshake, including `alive`, which would require takeover
//! semantics we do not have.
//!
//! Authentication is mutual: each side proves cookie knowledge by sending
//! `md5(cookie ++ decimal(challenge))` for the other side's random 32-bit
//! challenge. Every message is framed by a big-endian u16 length until the
//! connection switches to the 4-byte data framing.

use super::error::DistError;
use super::flags::{handshake_flags, DistFlags};
use crate::atom::Atom;
use crate::core::NodeName;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// What a completed handshake established.
#[derive(Debug, Clone)]
pub struct HandshakeOutcome {
    /// The name the peer assigned to us for this connection.
    pub local_name: Atom,
    /// The creation the peer assigned to us.
    pub local_creation: u32,
    /// The peer's node name, as it greeted us.
    pub peer_name: Atom,
    /// The peer's creation.
    pub peer_creation: u32,
    /// The capability flags the peer advertised.
    pub peer_flags: DistFlags,
}

/// Runs the full client handshake over `stream`.
pub async fn client<S>(
    stream: &mut S,
    requested: &NodeName,
    cookie: &str,
) -> Result<HandshakeOutcome, DistError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    send_name(stream, requested).await?;
    let (local_name, local_creation) = recv_status(stream).await?;
    let (peer_name, peer_creation, peer_flags, peer_challenge) = recv_challenge(stream).await?;

    let our_challenge: u32 = rand::random();
    send_challenge_reply(stream, our_challenge, &gen_digest(peer_challenge, cookie)).await?;
    recv_challenge_ack(stream, &gen_digest(our_challenge, cookie)).await?;

    Ok(HandshakeOutcome {
        local_name,
        local_creation,
        peer_name,
        peer_creation,
        peer_flags,
    })
}

/// `md5(cookie ++ decimal_ascii(challenge))`, the proof of cookie
/// knowledge both sides exchange.
pub fn gen_digest(challenge: u32, cookie: &str) -> [u8; 16] {
    let mut input = cookie.as_bytes().to_vec();
    input.extend_from_slice(challenge.to_string().as_bytes());
    md5::compute(input).0
}

/// `send_name`: tag 'N', u64 flags, u32 creation (zero; the peer assigns
/// ours), u16 name length, name.
async fn send_name<S>(stream: &mut S, requested: &NodeName) -> Result<(), DistError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let name = requested.to_string();
    let mut body = Vec::with_capacity(15 + name.len());
    body.push(b'N');
    body.extend_from_slice(&handshake_flags().bits().to_be_bytes());
    body.extend_from_slice(&0u32.to_be_bytes());
    body.extend_from_slice(&(name.len() as u16).to_be_bytes());
    body.extend_from_slice(name.as_bytes());
    send_frame(stream, &body).await
}

/// `recv_status`: only `named:` continues the handshake; it carries the
/// name and creation assigned to us.
async fn recv_status<S>(stream: &mut S) -> Result<(Atom, u32), DistError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = recv_frame(stream).await?;
    match frame.split_first() {
        Some((b's', status)) if status.starts_with(b"named:") => {
            let rest = &status[b"named:".len()..];
            if rest.len() < 2 {
                return Err(DistError::Handshake("short named: status".into()));
            }
            let nlen = u16::from_be_bytes([rest[0], rest[1]]) as usize;
            if rest.len() < 2 + nlen + 4 {
                return Err(DistError::Handshake("short named: status".into()));
            }
            let name = std::str::from_utf8(&rest[2..2 + nlen])
                .map_err(|_| DistError::Handshake("assigned name is not UTF-8".into()))?;
            let creation = u32::from_be_bytes([
                rest[2 + nlen],
                rest[2 + nlen + 1],
                rest[2 + nlen + 2],
                rest[2 + nlen + 3],
            ]);
            Ok((Atom::new(name), creation))
        }
        Some((b's', status)) => Err(DistError::Handshake(format!(
            "peer refused with status {:?}",
            String::from_utf8_lossy(status)
        ))),
        _ => Err(DistError::Handshake("expected a status message".into())),
    }
}

/// `recv_challenge`: tag 'N', u64 flags, u32 challenge, u32 creation,
/// u16 name length, name.
async fn recv_challenge<S>(stream: &mut S) -> Result<(Atom, u32, DistFlags, u32), DistError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = recv_frame(stream).await?;
    if frame.len() < 19 || frame[0] != b'N' {
        return Err(DistError::Handshake("expected an 'N' challenge".into()));
    }
    let flags = u64::from_be_bytes([
        frame[1], frame[2], frame[3], frame[4], frame[5], frame[6], frame[7], frame[8],
    ]);
    let challenge = u32::from_be_bytes([frame[9], frame[10], frame[11], frame[12]]);
    let creation = u32::from_be_bytes([frame[13], frame[14], frame[15], frame[16]]);
    let nlen = u16::from_be_bytes([frame[17], frame[18]]) as usize;
    if frame.len() < 19 + nlen {
        return Err(DistError::Handshake("short challenge frame".into()));
    }
    let name = std::str::from_utf8(&frame[19..19 + nlen])
        .map_err(|_| DistError::Handshake("peer name is not UTF-8".into()))?;
    Ok((
        Atom::new(name),
        creation,
        DistFlags::from_bits_retain(flags),
        challenge,
    ))
}

/// `challenge_reply`: tag 'r', our u32 challenge, the 16-byte digest of
/// the peer's challenge.
async fn send_challenge_reply<S>(
    stream: &mut S,
    our_challenge: u32,
    digest: &[u8; 16],
) -> Result<(), DistError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut body = Vec::with_capacity(21);
    body.push(b'r');
    body.extend_from_slice(&our_challenge.to_be_bytes());
    body.extend_from_slice(digest);
    send_frame(stream, &body).await
}

/// `challenge_ack`: tag 'a' plus the peer's digest of *our* challenge;
/// both sides must verify for the connection to come up.
async fn recv_challenge_ack<S>(stream: &mut S, expected: &[u8; 16]) -> Result<(), DistError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = recv_frame(stream).await?;
    match frame.split_first() {
        Some((b'a', digest)) if digest == expected => Ok(()),
        Some((b'a', _)) => Err(DistError::BadDigest),
        _ => Err(DistError::Handshake("expected a challenge ack".into())),
    }
}

async fn send_frame<S>(stream: &mut S, body: &[u8]) -> Result<(), DistError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&(body.len() as u16).to_be_bytes()).await?;
    stream.write_all(body).await?;
    stream.flush().await?;
    Ok(())
}

async fn recv_frame<S>(stream: &mut S) -> Result<Vec<u8>, DistError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut len = [0u8; 2];
    stream.read_exact(&mut len).await?;
    let mut frame = vec![0u8; u16::from_be_bytes(len) as usize];
    stream.read_exact(&mut frame).await?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_vector() {
        // Known-answer test: md5("kaka" ++ "2965028591").
        assert_eq!(
            gen_digest(0xB0BA_BEEF, "kaka"),
            [
                0xD7, 0x6B, 0x31, 0x0C, 0xD6, 0x63, 0x6B, 0x27, 0xE4, 0xB3, 0x6D, 0x06, 0xC5,
                0x50, 0x0B, 0x50
            ]
        );
    }

    #[test]
    fn digest_depends_on_both_inputs() {
        assert_ne!(gen_digest(1, "kaka"), gen_digest(2, "kaka"));
        assert_ne!(gen_digest(1, "kaka"), gen_digest(1, "kakb"));
    }

    /// A scripted accepting node covering the happy path; the transcript
    /// assertions mirror the byte layout of each handshake message.
    #[tokio::test]
    async fn full_client_handshake() {
        let (mut client_side, mut server_side) = tokio::io::duplex(1024);
        let cookie = "monster";
        let requested = NodeName::parse("wax@localhost").unwrap();

        let server = tokio::spawn(async move {
            // send_name: 'N' + flags(8) + creation(4) + nlen(2) + name.
            let frame = recv_frame(&mut server_side).await.unwrap();
            assert_eq!(frame[0], b'N');
            let flags = u64::from_be_bytes(frame[1..9].try_into().unwrap());
            assert_ne!(flags & (1 << 33), 0, "NAME_ME must be requested");
            assert_eq!(&frame[15..], b"wax@localhost");

            // Status: assign name and creation 777.
            let mut status = b"snamed:".to_vec();
            status.extend_from_slice(&13u16.to_be_bytes());
            status.extend_from_slice(b"wax@localhost");
            status.extend_from_slice(&777u32.to_be_bytes());
            send_frame(&mut server_side, &status).await.unwrap();

            // Challenge.
            let mut challenge = vec![b'N'];
            challenge.extend_from_slice(&handshake_flags().bits().to_be_bytes());
            challenge.extend_from_slice(&0xB0BA_BEEFu32.to_be_bytes());
            challenge.extend_from_slice(&4u32.to_be_bytes());
            challenge.extend_from_slice(&8u16.to_be_bytes());
            challenge.extend_from_slice(b"peer@box");
            send_frame(&mut server_side, &challenge).await.unwrap();

            // Reply: exactly 'r' + challenge_a(4) + digest(16).
            let reply = recv_frame(&mut server_side).await.unwrap();
            assert_eq!(reply.len(), 21);
            assert_eq!(reply[0], b'r');
            assert_eq!(&reply[5..21], &gen_digest(0xB0BA_BEEF, cookie));
            let challenge_a = u32::from_be_bytes(reply[1..5].try_into().unwrap());

            // Ack with the digest of the client's challenge.
            let mut ack = vec![b'a'];
            ack.extend_from_slice(&gen_digest(challenge_a, cookie));
            send_frame(&mut server_side, &ack).await.unwrap();
        });

        let outcome = client(&mut client_side, &requested, cookie).await.unwrap();
        server.await.unwrap();

        assert_eq!(outcome.local_name, Atom::new("wax@localhost"));
        assert_eq!(outcome.local_creation, 777);
        assert_eq!(outcome.peer_name, Atom::new("peer@box"));
        assert_eq!(outcome.peer_creation, 4);
        assert!(outcome.peer_flags.contains(DistFlags::UNLINK_ID));
    }

    #[tokio::test]
    async fn alive_status_fails_closed() {
        let (mut client_side, mut server_side) = tokio::io::duplex(256);

        tokio::spawn(async move {
            let _ = recv_frame(&mut server_side).await.unwrap();
            send_frame(&mut server_side, b"salive").await.unwrap();
        });

        let requested = NodeName::parse("wax@localhost").unwrap();
        match client(&mut client_side, &requested, "c").await {
            Err(DistError::Handshake(msg)) => assert!(msg.contains("alive"), "{msg}"),
            other => panic!("expected handshake failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrong_ack_digest_rejected() {
        let (mut client_side, mut server_side) = tokio::io::duplex(256);

        tokio::spawn(async move {
            let _ = recv_frame(&mut server_side).await.unwrap();
            let mut status = b"snamed:".to_vec();
            status.extend_from_slice(&4u16.to_be_bytes());
            status.extend_from_slice(b"w@lo");
            status.extend_from_slice(&1u32.to_be_bytes());
            send_frame(&mut server_side, &status).await.unwrap();

            let mut challenge = vec![b'N'];
            challenge.extend_from_slice(&0u64.to_be_bytes());
            challenge.extend_from_slice(&1u32.to_be_bytes());
            challenge.extend_from_slice(&1u32.to_be_bytes());
            challenge.extend_from_slice(&6u16.to_be_bytes());
            challenge.extend_from_slice(b"p@host");
            send_frame(&mut server_side, &challenge).await.unwrap();

            let _ = recv_frame(&mut server_side).await.unwrap();
            // Garbage digest: mutual auth must fail.
            let mut ack = vec![b'a'];
            ack.extend_from_slice(&[0u8; 16]);
            send_frame(&mut server_side, &ack).await.unwrap();
        });

        let requested = NodeName::parse("wax@localhost").unwrap();
        assert!(matches!(
            client(&mut client_side, &requested, "c").await,
            Err(DistError::BadDigest)
        ));
    }
}
