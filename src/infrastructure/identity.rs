//! Static identity provider.
//!
//! Trivial [`Identity`] implementation for tests and for embedders whose
//! auth layer resolves the user once at startup.

use crate::domain::{Identity, ParticipantRole};

/// Fixed identity resolved ahead of time by the auth collaborator.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    user_id: String,
    display_name: String,
    role: ParticipantRole,
}

impl StaticIdentity {
    pub fn new(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        role: ParticipantRole,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            role,
        }
    }
}

impl Identity for StaticIdentity {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn role(&self) -> ParticipantRole {
        self.role
    }
}
