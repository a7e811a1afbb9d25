use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use typed_builder::TypedBuilder;

use crate::common::{CoverageAreaId, HandymanId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "coverage_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CoverageType {
    ZipCode,
    City,
    Radius,
}

/// A region a handyman declares they will work in.
///
/// `value` is a zip code, a "City, State" string, or the radius centre
/// depending on `area_type`. Lower `priority` is preferred.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, TypedBuilder)]
pub struct CoverageArea {
    #[builder(default = CoverageAreaId::new())]
    pub id: CoverageAreaId,
    pub handyman_id: HandymanId,
    pub area_type: CoverageType,
    #[builder(setter(into))]
    pub value: String,
    #[builder(default, setter(strip_option))]
    pub radius_miles: Option<f64>,
    #[builder(default = 1)]
    pub priority: i32,
    #[builder(default = false)]
    pub is_primary: bool,
}

impl CoverageArea {
    /// Order in which areas are scanned: priority, then primary areas first.
    pub fn sort_for_scan(areas: &mut [CoverageArea]) {
        areas.sort_by_key(|a| (a.priority, !a.is_primary));
    }

    pub async fn find_for_handyman(handyman_id: HandymanId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM coverage_areas
            WHERE handyman_id = $1
            ORDER BY priority ASC, is_primary DESC
            "#,
        )
        .bind(handyman_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn insert(&self, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO coverage_areas (
                id, handyman_id, area_type, value, radius_miles, priority, is_primary
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.handyman_id)
        .bind(self.area_type)
        .bind(&self.value)
        .bind(self.radius_miles)
        .bind(self.priority)
        .bind(self.is_primary)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    /// Returns true if a row was removed.
    pub async fn delete(id: CoverageAreaId, pool: &PgPool) -> Result<bool> {
        let result = sqlx::query("DELETE FROM coverage_areas WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_order_prefers_priority_then_primary() {
        let handyman_id = HandymanId::new();
        let area = |priority, is_primary, value: &str| {
            CoverageArea::builder()
                .handyman_id(handyman_id)
                .area_type(CoverageType::ZipCode)
                .value(value)
                .priority(priority)
                .is_primary(is_primary)
                .build()
        };
        let mut areas = vec![area(2, true, "c"), area(1, false, "b"), area(1, true, "a")];
        CoverageArea::sort_for_scan(&mut areas);
        let order: Vec<&str> = areas.iter().map(|a| a.value.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }
}
