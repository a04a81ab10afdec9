//! Owner token generation

use uuid::Uuid;

/// Generate an unguessable owner token (a v4 UUID, hex encoded)
pub fn generate_owner_token() -> String {
    Uuid::new_v4().simple().to_string()
}
