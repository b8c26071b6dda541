//! ONC/SUN-RPC message framing and the call/reply envelope (RFC 5531).

use super::{Decoder, Encoder, Error, Result};

/// Maximum size of an `opaque_auth` body we are willing to decode.
pub const MAX_AUTH_SIZE: u32 = 400;

/// Maximum size of a single in-memory RPC record. Larger records are
/// rejected rather than silently truncated.
pub const MAX_RECORD_LEN: u32 = 1 << 20;

pub const RPC_VERSION: u32 = 2;

/// `msg_type` discriminant (RFC 5531 §9).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MsgType {
    Call,
    Reply,
}

/// RPC authentication flavor (RFC 5531 §8.2).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AuthFlavor {
    AuthNone,
    AuthSys,
    AuthShort,
    AuthDh,
    RpcSecGss,
    Unknown(u32),
}

impl AuthFlavor {
    fn from_u32(v: u32) -> Self {
        match v {
            0 => AuthFlavor::AuthNone,
            1 => AuthFlavor::AuthSys,
            2 => AuthFlavor::AuthShort,
            3 => AuthFlavor::AuthDh,
            6 => AuthFlavor::RpcSecGss,
            other => AuthFlavor::Unknown(other),
        }
    }

    fn to_u32(self) -> u32 {
        match self {
            AuthFlavor::AuthNone => 0,
            AuthFlavor::AuthSys => 1,
            AuthFlavor::AuthShort => 2,
            AuthFlavor::AuthDh => 3,
            AuthFlavor::RpcSecGss => 6,
            AuthFlavor::Unknown(v) => v,
        }
    }
}

/// Opaque authentication credential or verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueAuth {
    pub flavor: AuthFlavor,
    pub body: Vec<u8>,
}

impl OpaqueAuth {
    pub fn none() -> Self {
        OpaqueAuth { flavor: AuthFlavor::AuthNone, body: Vec::new() }
    }

    pub fn decode(dec: &mut Decoder) -> Result<Self> {
        let flavor = AuthFlavor::from_u32(dec.u32()?);
        let body = dec.opaque_var("auth_body", MAX_AUTH_SIZE)?.to_vec();
        Ok(OpaqueAuth { flavor, body })
    }

    pub fn encode(&self, enc: &mut Encoder) {
        enc.u32(self.flavor.to_u32());
        enc.opaque(&self.body);
    }
}

/// AUTH_SYS credential body (RFC 5531 §9, `auth_sys`/`AUTH_UNIX`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSysCredential {
    pub stamp: u32,
    pub machine_name: String,
    pub uid: u32,
    pub gid: u32,
    pub gids: Vec<u32>,
}

impl AuthSysCredential {
    pub fn decode(body: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(body);
        let stamp = dec.u32()?;
        let machine_name = dec.string("machine_name", 255)?;
        let uid = dec.u32()?;
        let gid = dec.u32()?;
        let gids = dec.vector("gids", 16, |d| d.u32())?;
        Ok(AuthSysCredential { stamp, machine_name, uid, gid, gids })
    }
}

/// RPC acceptance status (RFC 5531 §9, `accept_stat`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AcceptStat {
    Success,
    ProgUnavail,
    ProgMismatch { low: u32, high: u32 },
    ProcUnavail,
    GarbageArgs,
    SystemErr,
}

/// RPC rejection status (RFC 5531 §9, `reject_stat`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RejectStat {
    RpcMismatch { low: u32, high: u32 },
    AuthError(AuthStat),
}

/// Authentication failure reason (RFC 5531 §9, `auth_stat`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AuthStat {
    Ok,
    BadCred,
    RejectedCred,
    BadVerf,
    RejectedVerf,
    TooWeak,
    InvalidResp,
    Failed,
}

impl AuthStat {
    fn to_u32(self) -> u32 {
        match self {
            AuthStat::Ok => 0,
            AuthStat::BadCred => 1,
            AuthStat::RejectedCred => 2,
            AuthStat::BadVerf => 3,
            AuthStat::RejectedVerf => 4,
            AuthStat::TooWeak => 5,
            AuthStat::InvalidResp => 6,
            AuthStat::Failed => 7,
        }
    }
}

/// A fully decoded RPC call header (the body is left undecoded for the
/// program-specific dispatcher to handle).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallHeader {
    pub xid: u32,
    pub rpc_version: u32,
    pub program: u32,
    pub version: u32,
    pub procedure: u32,
    pub credential: OpaqueAuth,
    pub verifier: OpaqueAuth,
}

impl CallHeader {
    pub fn decode(dec: &mut Decoder) -> Result<Self> {
        let xid = dec.u32()?;
        let msg_type = dec.u32()?;
        if msg_type != 0 {
            return Err(Error::BadDiscriminant { field: "msg_type", value: msg_type });
        }
        let rpc_version = dec.u32()?;
        let program = dec.u32()?;
        let version = dec.u32()?;
        let procedure = dec.u32()?;
        let credential = OpaqueAuth::decode(dec)?;
        let verifier = OpaqueAuth::decode(dec)?;
        Ok(CallHeader { xid, rpc_version, program, version, procedure, credential, verifier })
    }
}

/// Begins an accepted-reply envelope; the caller appends the
/// procedure-specific result body afterwards.
pub fn encode_accepted_reply(xid: u32, verifier: &OpaqueAuth, stat: AcceptStat) -> Encoder {
    let mut enc = Encoder::new();
    enc.u32(xid);
    enc.u32(1); // REPLY
    enc.u32(0); // MSG_ACCEPTED
    verifier.encode(&mut enc);
    match stat {
        AcceptStat::Success => enc.u32(0),
        AcceptStat::ProgUnavail => enc.u32(1),
        AcceptStat::ProgMismatch { low, high } => {
            enc.u32(2);
            enc.u32(low);
            enc.u32(high);
        }
        AcceptStat::ProcUnavail => enc.u32(3),
        AcceptStat::GarbageArgs => enc.u32(4),
        AcceptStat::SystemErr => enc.u32(5),
    }
    enc
}

/// Encodes a full rejected-reply message (RPC version mismatch or auth failure).
pub fn encode_rejected_reply(xid: u32, stat: RejectStat) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.u32(xid);
    enc.u32(1); // REPLY
    enc.u32(1); // MSG_DENIED
    match stat {
        RejectStat::RpcMismatch { low, high } => {
            enc.u32(0);
            enc.u32(low);
            enc.u32(high);
        }
        RejectStat::AuthError(auth_stat) => {
            enc.u32(1);
            enc.u32(auth_stat.to_u32());
        }
    }
    frame(enc.into_bytes())
}

/// Wraps a fully-encoded RPC message with a single-fragment TCP record marker.
pub fn frame(body: Vec<u8>) -> Vec<u8> {
    let mut framed = Vec::with_capacity(body.len() + 4);
    let marker: u32 = 0x8000_0000 | (body.len() as u32);
    framed.extend_from_slice(&marker.to_be_bytes());
    framed.extend_from_slice(&body);
    framed
}

/// Attempts to pull one fully-reassembled RPC record out of `buf`, returning
/// the record bytes and how many bytes of `buf` were consumed. Multi-fragment
/// records are reassembled transparently; `buf` is expected to already hold
/// at least the 4-byte record marker for each fragment.
pub fn take_record(buf: &[u8]) -> Result<Option<(Vec<u8>, usize)>> {
    let mut consumed = 0usize;
    let mut record = Vec::new();
    loop {
        if buf.len() < consumed + 4 {
            return Ok(None);
        }
        let marker = u32::from_be_bytes(buf[consumed..consumed + 4].try_into().unwrap());
        let last = marker & 0x8000_0000 != 0;
        let len = (marker & 0x7fff_ffff) as usize;
        if len as u32 > MAX_RECORD_LEN {
            return Err(Error::TooLarge { field: "record", len: len as u32, max: MAX_RECORD_LEN });
        }
        if buf.len() < consumed + 4 + len {
            return Ok(None);
        }
        record.extend_from_slice(&buf[consumed + 4..consumed + 4 + len]);
        consumed += 4 + len;
        if last {
            return Ok(Some((record, consumed)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_call() -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.u32(7); // xid
        enc.u32(0); // CALL
        enc.u32(RPC_VERSION);
        enc.u32(100003); // NFS program
        enc.u32(3); // version
        enc.u32(0); // NULL procedure
        OpaqueAuth::none().encode(&mut enc);
        OpaqueAuth::none().encode(&mut enc);
        enc.into_bytes()
    }

    #[test]
    fn decodes_call_header() {
        let bytes = sample_call();
        let mut dec = Decoder::new(&bytes);
        let header = CallHeader::decode(&mut dec).unwrap();
        assert_eq!(header.xid, 7);
        assert_eq!(header.program, 100003);
        assert_eq!(header.procedure, 0);
        assert_eq!(header.credential.flavor, AuthFlavor::AuthNone);
    }

    #[test]
    fn reassembles_single_fragment_record() {
        let body = sample_call();
        let framed = frame(body.clone());
        let (record, consumed) = take_record(&framed).unwrap().unwrap();
        assert_eq!(record, body);
        assert_eq!(consumed, framed.len());
    }

    #[test]
    fn reassembles_multi_fragment_record() {
        let body = sample_call();
        let (first, second) = body.split_at(body.len() / 2);
        let mut framed = Vec::new();
        let marker1 = (first.len() as u32) & 0x7fff_ffff;
        framed.extend_from_slice(&marker1.to_be_bytes());
        framed.extend_from_slice(first);
        let marker2 = 0x8000_0000 | (second.len() as u32);
        framed.extend_from_slice(&marker2.to_be_bytes());
        framed.extend_from_slice(second);

        let (record, consumed) = take_record(&framed).unwrap().unwrap();
        assert_eq!(record, body);
        assert_eq!(consumed, framed.len());
    }

    #[test]
    fn incomplete_record_returns_none() {
        let framed = frame(sample_call());
        let partial = &framed[..framed.len() - 2];
        assert_eq!(take_record(partial).unwrap(), None);
    }
}
