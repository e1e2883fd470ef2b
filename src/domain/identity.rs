//! Identity provider seam.
//!
//! Supplies the calling user's id, display name and role. The engine is
//! instantiated once per signed-in user; every service resolves "the
//! caller" through this trait.

use super::entities::ParticipantRole;

/// Identity of the calling user.
pub trait Identity: Send + Sync + 'static {
    fn user_id(&self) -> &str;
    fn display_name(&self) -> &str;
    fn role(&self) -> ParticipantRole;
}
