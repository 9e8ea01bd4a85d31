//! Connect-time authentication hook.

use std::future::Future;
use std::pin::Pin;

use crate::net::NetworkAddress;

pub type AuthFuture<'a> = Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

/// Decides whether a CONNECT is admitted. Implementations may consult
/// credentials carried out of band (the wire protocol itself has none).
pub trait Authenticator: Send + Sync {
    fn authenticate<'a>(&'a self, client_id: &'a str, address: &'a NetworkAddress)
        -> AuthFuture<'a>;
}

/// Admits everyone; the default when `allowAnonymous` is on.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAnonymous;

impl Authenticator for AllowAnonymous {
    fn authenticate<'a>(
        &'a self,
        _client_id: &'a str,
        _address: &'a NetworkAddress,
    ) -> AuthFuture<'a> {
        Box::pin(async { true })
    }
}

/// Rejects everyone; the fallback when anonymous access is disabled and no
/// authenticator was supplied.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

impl Authenticator for DenyAll {
    fn authenticate<'a>(
        &'a self,
        _client_id: &'a str,
        _address: &'a NetworkAddress,
    ) -> AuthFuture<'a> {
        Box::pin(async { false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allow_and_deny() {
        let address = NetworkAddress::Local(1);
        assert!(AllowAnonymous.authenticate("a", &address).await);
        assert!(!DenyAll.authenticate("a", &address).await);
    }
}
