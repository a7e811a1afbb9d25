use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::BTreeSet;
use typed_builder::TypedBuilder;

use crate::common::HandymanId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "handyman_availability", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityStatus {
    Available,
    Busy,
    OffDuty,
    OnVacation,
    Unavailable,
}

impl AvailabilityStatus {
    /// Busy handymen still receive offers; the others are skipped by auto-match.
    pub fn accepts_offers(&self) -> bool {
        matches!(self, Self::Available | Self::Busy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, TypedBuilder)]
pub struct Handyman {
    #[builder(default = HandymanId::new())]
    pub id: HandymanId,
    #[builder(setter(into))]
    pub name: String,
    /// Raw contact number as entered; normalized before every send.
    #[builder(setter(into))]
    pub phone: String,
    #[builder(default, setter(strip_option, into))]
    pub email: Option<String>,
    #[builder(default)]
    pub specialties: Vec<String>,
    #[builder(default = AvailabilityStatus::Available)]
    pub availability_status: AvailabilityStatus,
    #[builder(default, setter(strip_option))]
    pub rating: Option<f64>,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}

impl Handyman {
    /// Number of distinct, non-empty specialties (case-insensitive).
    pub fn specialty_count(&self) -> usize {
        self.specialties
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub async fn find_by_id(id: HandymanId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM handymen WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Find by E.164 phone, matching stored numbers regardless of formatting.
    ///
    /// Stored North American numbers may lack the country code, so both digit
    /// forms are compared.
    pub async fn find_by_phone(e164: &str, pool: &PgPool) -> Result<Option<Self>> {
        let digits: String = e164.chars().filter(|c| c.is_ascii_digit()).collect();
        let national = match digits.strip_prefix('1') {
            Some(rest) if digits.len() == 11 => rest.to_string(),
            _ => digits.clone(),
        };

        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM handymen
            WHERE regexp_replace(phone, '\D', '', 'g') IN ($1, $2)
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(&digits)
        .bind(&national)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_all(pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM handymen ORDER BY id ASC")
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn insert(&self, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO handymen (
                id, name, phone, email, specialties, availability_status, rating, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(&self.name)
        .bind(&self.phone)
        .bind(&self.email)
        .bind(&self.specialties)
        .bind(self.availability_status)
        .bind(self.rating)
        .bind(self.created_at)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specialty_count_ignores_duplicates_and_blanks() {
        let handyman = Handyman::builder()
            .name("Sam")
            .phone("+15550000001")
            .specialties(vec![
                "Plumbing".into(),
                "plumbing ".into(),
                "".into(),
                "Electrical".into(),
            ])
            .build();
        assert_eq!(handyman.specialty_count(), 2);
    }

    #[test]
    fn only_available_and_busy_accept_offers() {
        assert!(AvailabilityStatus::Available.accepts_offers());
        assert!(AvailabilityStatus::Busy.accepts_offers());
        assert!(!AvailabilityStatus::OffDuty.accepts_offers());
        assert!(!AvailabilityStatus::OnVacation.accepts_offers());
        assert!(!AvailabilityStatus::Unavailable.accepts_offers());
    }
}
