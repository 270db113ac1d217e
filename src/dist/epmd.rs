//! EPMD client.
//!
//! The Erlang Port Mapper Daemon answers on port 4369 of every host that
//! runs distributed Erlang nodes and maps a node's short name to the TCP
//! port its distribution listener bound. This client speaks the only
//! request we need: `PORT_PLEASE2_REQ`.
//!
//! Wire format, request: `<u16 len><0x7A><name>` with `len = 1 + |name|`.
//! Response: `<0x77><result u8>` followed, when `result == 0`, by
//! `<port u16><node-type u8><protocol u8><hi u16><lo u16><nlen u16><name>
//! <elen u16><extra>`. EPMD closes the connection after answering.

use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// The well-known EPMD listen port.
pub const EPMD_PORT: u16 = 4369;

const PORT_PLEASE2_REQ: u8 = 122;
const PORT2_RESP: u8 = 119;

/// Errors from an EPMD lookup.
#[derive(Debug, Error)]
pub enum EpmdError {
    /// Socket-level failure.
    #[error("epmd i/o error: {0}")]
    Io(#[from] io::Error),

    /// EPMD answered, but with a non-zero result code: the node is not
    /// registered on that host.
    #[error("epmd has no node registered under that name (result {0})")]
    NodeNotFound(u8),

    /// The response did not parse as a PORT2_RESP.
    #[error("malformed epmd response")]
    Malformed,
}

/// What EPMD knows about a registered node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEntry {
    /// Distribution listener port of the node.
    pub port: u16,
    /// 77 for a normal Erlang node, 72 for a hidden one.
    pub node_type: u8,
    /// 0 for TCP/IPv4.
    pub protocol: u8,
    /// Highest distribution protocol version the node speaks.
    pub high_version: u16,
    /// Lowest distribution protocol version the node speaks.
    pub low_version: u16,
    /// The node's short name as EPMD stores it.
    pub name: String,
    /// Opaque extra field.
    pub extra: Vec<u8>,
}

/// Resolves `name` against the EPMD on `host`.
pub async fn lookup(host: &str, name: &str) -> Result<NodeEntry, EpmdError> {
    let mut stream = TcpStream::connect((host, EPMD_PORT)).await?;
    port_please(&mut stream, name).await
}

/// Issues a PORT_PLEASE2_REQ for `name` on an already-open stream.
pub async fn port_please<S>(stream: &mut S, name: &str) -> Result<NodeEntry, EpmdError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut request = Vec::with_capacity(3 + name.len());
    request.extend_from_slice(&(1 + name.len() as u16).to_be_bytes());
    request.push(PORT_PLEASE2_REQ);
    request.extend_from_slice(name.as_bytes());
    stream.write_all(&request).await?;
    stream.flush().await?;

    let mut head = [0u8; 2];
    stream.read_exact(&mut head).await?;
    if head[0] != PORT2_RESP {
        return Err(EpmdError::Malformed);
    }
    if head[1] != 0 {
        return Err(EpmdError::NodeNotFound(head[1]));
    }

    let mut port = [0u8; 2];
    stream.read_exact(&mut port).await?;
    let port = u16::from_be_bytes(port);

    // EPMD closes after the response; whatever remains is the node info.
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await?;
    Ok(parse_entry(port, &rest))
}

fn parse_entry(port: u16, rest: &[u8]) -> NodeEntry {
    let mut entry = NodeEntry {
        port,
        node_type: 0,
        protocol: 0,
        high_version: 0,
        low_version: 0,
        name: String::new(),
        extra: Vec::new(),
    };
    if rest.len() < 8 {
        return entry;
    }
    entry.node_type = rest[0];
    entry.protocol = rest[1];
    entry.high_version = u16::from_be_bytes([rest[2], rest[3]]);
    entry.low_version = u16::from_be_bytes([rest[4], rest[5]]);

    let nlen = u16::from_be_bytes([rest[6], rest[7]]) as usize;
    if rest.len() < 8 + nlen {
        return entry;
    }
    entry.name = String::from_utf8_lossy(&rest[8..8 + nlen]).into_owned();

    let after_name = &rest[8 + nlen..];
    if after_name.len() >= 2 {
        let elen = u16::from_be_bytes([after_name[0], after_name[1]]) as usize;
        entry.extra = after_name[2..].get(..elen).unwrap_or(&after_name[2..]).to_vec();
    }
    entry
}
