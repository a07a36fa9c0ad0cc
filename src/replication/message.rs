//! Wire codec for CRUD requests and replies
//!
//! Frames share the tag-byte space with the membership codec: CRUD tags
//! start at 3. The payload after the tag is delimited text, `::` between
//! fixed fields, with key and value carried as length-prefixed segments
//! (`<byte-len>:<bytes>`) so the delimiter may appear freely inside
//! them. An absent value is a single `-`.
//!
//! Layout: `{txid}::{id}:{port}::{role}::{success}::{key-seg}{value-seg}`

use crate::common::{Error, NodeAddr, OpKind, ReplicaRole, Result};
use std::fmt::Write as _;

pub const TAG_CREATE: u8 = 3;
pub const TAG_READ: u8 = 4;
pub const TAG_UPDATE: u8 = 5;
pub const TAG_DELETE: u8 = 6;
pub const TAG_REPLY: u8 = 7;
pub const TAG_READREPLY: u8 = 8;

/// Kind of a CRUD frame, including the two reply kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrudKind {
    Create,
    Read,
    Update,
    Delete,
    Reply,
    ReadReply,
}

impl CrudKind {
    pub fn owns_tag(tag: u8) -> bool {
        (TAG_CREATE..=TAG_READREPLY).contains(&tag)
    }

    pub fn tag(self) -> u8 {
        match self {
            CrudKind::Create => TAG_CREATE,
            CrudKind::Read => TAG_READ,
            CrudKind::Update => TAG_UPDATE,
            CrudKind::Delete => TAG_DELETE,
            CrudKind::Reply => TAG_REPLY,
            CrudKind::ReadReply => TAG_READREPLY,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            TAG_CREATE => Some(CrudKind::Create),
            TAG_READ => Some(CrudKind::Read),
            TAG_UPDATE => Some(CrudKind::Update),
            TAG_DELETE => Some(CrudKind::Delete),
            TAG_REPLY => Some(CrudKind::Reply),
            TAG_READREPLY => Some(CrudKind::ReadReply),
            _ => None,
        }
    }

    /// The request kind for a client operation
    pub fn from_op(op: OpKind) -> Self {
        match op {
            OpKind::Create => CrudKind::Create,
            OpKind::Read => CrudKind::Read,
            OpKind::Update => CrudKind::Update,
            OpKind::Delete => CrudKind::Delete,
        }
    }

    /// The operation a request kind carries, `None` for replies
    pub fn op(self) -> Option<OpKind> {
        match self {
            CrudKind::Create => Some(OpKind::Create),
            CrudKind::Read => Some(OpKind::Read),
            CrudKind::Update => Some(OpKind::Update),
            CrudKind::Delete => Some(OpKind::Delete),
            CrudKind::Reply | CrudKind::ReadReply => None,
        }
    }
}

/// One CRUD request or reply. Immutable once sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrudMessage {
    pub txid: u64,
    /// Requests: the coordinator. Replies: the replying replica.
    pub origin: NodeAddr,
    pub kind: CrudKind,
    pub key: String,
    pub value: Option<String>,
    pub role: ReplicaRole,
    pub success: bool,
}

impl CrudMessage {
    /// Build a replica-bound request for a client operation
    pub fn request(
        txid: u64,
        origin: NodeAddr,
        op: OpKind,
        key: String,
        value: Option<String>,
        role: ReplicaRole,
    ) -> Self {
        Self {
            txid,
            origin,
            kind: CrudKind::from_op(op),
            key,
            value,
            role,
            success: false,
        }
    }

    /// Build the reply to a write request
    pub fn reply(txid: u64, origin: NodeAddr, key: String, role: ReplicaRole, success: bool) -> Self {
        Self {
            txid,
            origin,
            kind: CrudKind::Reply,
            key,
            value: None,
            role,
            success,
        }
    }

    /// Build the reply to a read request, carrying the value on success
    pub fn read_reply(
        txid: u64,
        origin: NodeAddr,
        key: String,
        value: Option<String>,
        role: ReplicaRole,
        success: bool,
    ) -> Self {
        Self {
            txid,
            origin,
            kind: CrudKind::ReadReply,
            key,
            value,
            role,
            success,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut text = String::with_capacity(
            32 + self.key.len() + self.value.as_ref().map_or(0, |v| v.len()),
        );
        let _ = write!(
            text,
            "{}::{}::{}::{}::{}:{}",
            self.txid,
            self.origin,
            self.role.as_u8(),
            self.success as u8,
            self.key.len(),
            self.key
        );
        match &self.value {
            Some(v) => {
                let _ = write!(text, "{}:{}", v.len(), v);
            }
            None => text.push('-'),
        }

        let mut out = Vec::with_capacity(1 + text.len());
        out.push(self.kind.tag());
        out.extend_from_slice(text.as_bytes());
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let (&tag, body) = payload
            .split_first()
            .ok_or_else(|| Error::Malformed("empty frame".into()))?;
        let kind =
            CrudKind::from_tag(tag).ok_or_else(|| Error::Malformed(format!("unknown CRUD tag {}", tag)))?;
        let text = std::str::from_utf8(body)
            .map_err(|_| Error::Malformed("CRUD payload is not UTF-8".into()))?;

        let (txid_s, rest) = split_field(text)?;
        let txid: u64 = txid_s
            .parse()
            .map_err(|_| Error::Malformed(format!("bad txid {:?}", txid_s)))?;

        let (origin_s, rest) = split_field(rest)?;
        let origin = parse_addr(origin_s)?;

        let (role_s, rest) = split_field(rest)?;
        let role = role_s
            .parse::<u8>()
            .ok()
            .and_then(ReplicaRole::from_u8)
            .ok_or_else(|| Error::Malformed(format!("bad replica role {:?}", role_s)))?;

        let (success_s, rest) = split_field(rest)?;
        let success = match success_s {
            "0" => false,
            "1" => true,
            other => return Err(Error::Malformed(format!("bad success flag {:?}", other))),
        };

        let (key, rest) = take_segment(rest)?;
        let (value, rest) = if let Some(stripped) = rest.strip_prefix('-') {
            (None, stripped)
        } else {
            let (v, r) = take_segment(rest)?;
            (Some(v), r)
        };
        if !rest.is_empty() {
            return Err(Error::Malformed(format!(
                "{} trailing bytes after CRUD payload",
                rest.len()
            )));
        }

        Ok(Self {
            txid,
            origin,
            kind,
            key,
            value,
            role,
            success,
        })
    }
}

fn split_field(text: &str) -> Result<(&str, &str)> {
    text.split_once("::")
        .ok_or_else(|| Error::Malformed("missing field delimiter".into()))
}

fn parse_addr(text: &str) -> Result<NodeAddr> {
    let (id_s, port_s) = text
        .split_once(':')
        .ok_or_else(|| Error::Malformed(format!("bad address {:?}", text)))?;
    let id = id_s
        .parse()
        .map_err(|_| Error::Malformed(format!("bad address id {:?}", id_s)))?;
    let port = port_s
        .parse()
        .map_err(|_| Error::Malformed(format!("bad address port {:?}", port_s)))?;
    Ok(NodeAddr::new(id, port))
}

/// Read a `<byte-len>:<bytes>` segment
fn take_segment(text: &str) -> Result<(String, &str)> {
    let (len_s, rest) = text
        .split_once(':')
        .ok_or_else(|| Error::Malformed("missing segment length".into()))?;
    let len: usize = len_s
        .parse()
        .map_err(|_| Error::Malformed(format!("bad segment length {:?}", len_s)))?;
    let bytes = rest
        .get(..len)
        .ok_or_else(|| Error::Malformed("segment shorter than its length prefix".into()))?;
    Ok((bytes.to_string(), &rest[len..]))
}
