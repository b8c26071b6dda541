//! Per-call authentication context derived from RPC credentials (§3.1
//! "Auth context").

use std::net::IpAddr;

use crate::export::SquashMode;
use crate::xdr::rpc::{AuthFlavor, AuthSysCredential, OpaqueAuth};

/// Conventional anonymous identity used by squash and by any credential
/// flavor the server does not parse.
pub const ANONYMOUS_UID: u32 = 65534;
pub const ANONYMOUS_GID: u32 = 65534;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub client_ip: IpAddr,
    pub client_port: u16,
    pub uid: u32,
    pub gid: u32,
    pub aux_gids: Vec<u32>,
    pub hostname: Option<String>,
}

impl AuthContext {
    /// Builds a context from the peer address and the call's credential.
    /// AUTH_NONE and any flavor other than AUTH_SYS are treated as
    /// anonymous; a malformed AUTH_SYS body also falls back to anonymous
    /// rather than rejecting the call (the RFC leaves credential rejection
    /// to the application layer).
    pub fn from_credential(client_ip: IpAddr, client_port: u16, credential: &OpaqueAuth) -> Self {
        if credential.flavor == AuthFlavor::AuthSys {
            if let Ok(sys) = AuthSysCredential::decode(&credential.body) {
                return AuthContext {
                    client_ip,
                    client_port,
                    uid: sys.uid,
                    gid: sys.gid,
                    aux_gids: sys.gids,
                    hostname: Some(sys.machine_name),
                };
            }
        }
        AuthContext::anonymous(client_ip, client_port)
    }

    pub fn anonymous(client_ip: IpAddr, client_port: u16) -> Self {
        AuthContext {
            client_ip,
            client_port,
            uid: ANONYMOUS_UID,
            gid: ANONYMOUS_GID,
            aux_gids: Vec::new(),
            hostname: None,
        }
    }

    /// Applies the export's squash mode, remapping uid/gid to the anonymous
    /// identity before any permission check runs.
    pub fn apply_squash(&mut self, mode: SquashMode) {
        match mode {
            SquashMode::None => {}
            SquashMode::Root if self.uid == 0 => {
                self.uid = ANONYMOUS_UID;
                self.gid = ANONYMOUS_GID;
            }
            SquashMode::Root => {}
            SquashMode::All => {
                self.uid = ANONYMOUS_UID;
                self.gid = ANONYMOUS_GID;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn loopback() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
    }

    #[test]
    fn root_squash_only_remaps_uid_zero() {
        let mut ctx = AuthContext { uid: 0, gid: 0, ..AuthContext::anonymous(loopback(), 111) };
        ctx.apply_squash(SquashMode::Root);
        assert_eq!(ctx.uid, ANONYMOUS_UID);

        let mut ctx = AuthContext { uid: 1000, gid: 1000, ..AuthContext::anonymous(loopback(), 111) };
        ctx.apply_squash(SquashMode::Root);
        assert_eq!(ctx.uid, 1000);
    }

    #[test]
    fn all_squash_remaps_every_uid() {
        let mut ctx = AuthContext { uid: 1000, gid: 1000, ..AuthContext::anonymous(loopback(), 111) };
        ctx.apply_squash(SquashMode::All);
        assert_eq!(ctx.uid, ANONYMOUS_UID);
        assert_eq!(ctx.gid, ANONYMOUS_GID);
    }

    #[test]
    fn unknown_flavor_is_anonymous() {
        let cred = OpaqueAuth { flavor: AuthFlavor::AuthDh, body: vec![1, 2, 3] };
        let ctx = AuthContext::from_credential(loopback(), 111, &cred);
        assert_eq!(ctx.uid, ANONYMOUS_UID);
    }
}
