//! Direct Postgres role lookups against the `profiles` table.
//!
//! NOTE: runtime-checked `sqlx::query()` because the table belongs to the
//! hosted backend's schema and may not exist at compile time.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use storefront_gate::{Identity, LookupError, Role, RoleDirectory};
use uuid::Uuid;

pub struct PgRoleDirectory {
    pool: PgPool,
}

impl PgRoleDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleDirectory for PgRoleDirectory {
    async fn role_of(&self, identity: &Identity) -> Result<Role, LookupError> {
        // Provider ids are UUIDs; anything else cannot have a profile row.
        let Ok(id) = Uuid::parse_str(identity.id.as_str()) else {
            return Err(LookupError::ProfileMissing(identity.id.to_string()));
        };

        let row = sqlx::query(r#"SELECT role::text AS role FROM profiles WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| LookupError::Unreachable(e.to_string()))?;

        let Some(row) = row else {
            return Err(LookupError::ProfileMissing(identity.id.to_string()));
        };
        let role: Option<String> = row
            .try_get("role")
            .map_err(|e| LookupError::Unreachable(e.to_string()))?;
        Ok(role.as_deref().map(Role::from_column).unwrap_or(Role::Standard))
    }
}
