use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use typed_builder::TypedBuilder;

use crate::common::{HandymanId, IssueId, PropertyId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "issue_priority", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IssuePriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl IssuePriority {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Urgent => "Urgent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "issue_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    InProgress,
    Resolved,
}

/// Maintenance request raised against a property.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, TypedBuilder)]
pub struct Issue {
    #[builder(default = IssueId::new())]
    pub id: IssueId,
    pub property_id: PropertyId,
    #[builder(setter(into))]
    pub title: String,
    #[builder(default, setter(strip_option, into))]
    pub description: Option<String>,
    #[builder(default = IssuePriority::Medium)]
    pub priority: IssuePriority,
    #[builder(default = IssueStatus::Open)]
    pub status: IssueStatus,
    #[builder(default, setter(strip_option))]
    pub assigned_handyman_id: Option<HandymanId>,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}

impl Issue {
    pub async fn find_by_id(id: IssueId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM issues WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn insert(&self, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO issues (
                id, property_id, title, description, priority, status,
                assigned_handyman_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.property_id)
        .bind(&self.title)
        .bind(&self.description)
        .bind(self.priority)
        .bind(self.status)
        .bind(self.assigned_handyman_id)
        .bind(self.created_at)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    /// Record the accepting handyman and move the issue into progress.
    /// Runs on a pool or inside the accept transaction.
    pub async fn mark_assigned<'e, E>(id: IssueId, handyman_id: HandymanId, executor: E) -> Result<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            UPDATE issues
            SET assigned_handyman_id = $2,
                status = CASE WHEN status = 'open' THEN 'in_progress'::issue_status ELSE status END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(handyman_id)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Completed jobs per property for one handyman (feeds the workload score).
    pub async fn completed_counts_by_property(
        handyman_id: HandymanId,
        pool: &PgPool,
    ) -> Result<Vec<(PropertyId, i64)>> {
        sqlx::query_as::<_, (PropertyId, i64)>(
            r#"
            SELECT property_id, COUNT(*)
            FROM issues
            WHERE assigned_handyman_id = $1 AND status = 'resolved'
            GROUP BY property_id
            "#,
        )
        .bind(handyman_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }
}
