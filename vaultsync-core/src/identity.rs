//! Owner identity and master key material supplied by the host.

use crate::crypto::MasterSecret;
use crate::pointer::Capability;

/// Source of the owner id and the master key material
///
/// The session asks for the key material each time it encrypts or
/// decrypts and never stores it.
pub trait IdentityProvider: Send + Sync {
    fn owner_id(&self) -> String;

    fn master_key_material(&self) -> MasterSecret;

    /// Capability known from a previous session, if any
    fn capability(&self) -> Option<Capability> {
        None
    }
}

/// Identity fixed at construction time
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    owner_id: String,
    secret: MasterSecret,
    capability: Option<Capability>,
}

impl StaticIdentity {
    pub fn new(owner_id: impl Into<String>, secret: impl Into<MasterSecret>) -> Self {
        Self {
            owner_id: owner_id.into(),
            secret: secret.into(),
            capability: None,
        }
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capability = Some(capability);
        self
    }
}

impl IdentityProvider for StaticIdentity {
    fn owner_id(&self) -> String {
        self.owner_id.clone()
    }

    fn master_key_material(&self) -> MasterSecret {
        self.secret.clone()
    }

    fn capability(&self) -> Option<Capability> {
        self.capability.clone()
    }
}
