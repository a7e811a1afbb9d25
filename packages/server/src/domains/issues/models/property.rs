use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use typed_builder::TypedBuilder;

use crate::common::{HandymanId, PropertyId};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Property {
    #[builder(default = PropertyId::new())]
    pub id: PropertyId,
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}

impl Property {
    /// "City, State", the form city coverage areas are declared in.
    pub fn city_state(&self) -> String {
        format!("{}, {}", self.city.trim(), self.state.trim())
    }

    pub fn full_address(&self) -> String {
        format!(
            "{}, {}, {} {}",
            self.address.trim(),
            self.city.trim(),
            self.state.trim(),
            self.zip_code.trim()
        )
    }

    pub async fn find_by_id(id: PropertyId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM properties WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn insert(&self, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO properties (id, name, address, city, state, zip_code, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(&self.name)
        .bind(&self.address)
        .bind(&self.city)
        .bind(&self.state)
        .bind(&self.zip_code)
        .bind(self.created_at)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    /// Properties the handyman is not yet attached to (candidates for matching).
    pub async fn find_unassigned_to(handyman_id: HandymanId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT p.* FROM properties p
            WHERE NOT EXISTS (
                SELECT 1 FROM property_handymen ph
                WHERE ph.property_id = p.id AND ph.handyman_id = $1
            )
            ORDER BY p.created_at ASC
            "#,
        )
        .bind(handyman_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Attach a handyman to a property. Re-attaching is a no-op.
    pub async fn attach_handyman(
        id: PropertyId,
        handyman_id: HandymanId,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO property_handymen (property_id, handyman_id)
             VALUES ($1, $2)
             ON CONFLICT (property_id, handyman_id) DO NOTHING",
        )
        .bind(id)
        .bind(handyman_id)
        .execute(pool)
        .await?;
        Ok(())
    }
}
