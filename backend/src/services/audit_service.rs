//! Audit logging service.
//!
//! Records every admin mutation plus notable public events (quotes, chat)
//! so changes to pricing and CRM data can be traced back to a key.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::net::IpAddr;
use uuid::Uuid;

use crate::error::Result;
use crate::models::audit_log::AuditLog;

/// Audit action types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Created,
    Updated,
    Deleted,
    StatusChanged,
    Moved,
    Closed,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "CREATED",
            AuditAction::Updated => "UPDATED",
            AuditAction::Deleted => "DELETED",
            AuditAction::StatusChanged => "STATUS_CHANGED",
            AuditAction::Moved => "MOVED",
            AuditAction::Closed => "CLOSED",
        }
    }
}

/// Resource types for audit logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Service,
    Package,
    ScopingFactor,
    ScopingRule,
    Quote,
    Conversation,
    Company,
    Contact,
    Deal,
    Project,
    Task,
    TaskflowProject,
    TaskflowTask,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Service => "service",
            ResourceType::Package => "package",
            ResourceType::ScopingFactor => "scoping_factor",
            ResourceType::ScopingRule => "scoping_rule",
            ResourceType::Quote => "quote",
            ResourceType::Conversation => "conversation",
            ResourceType::Company => "company",
            ResourceType::Contact => "contact",
            ResourceType::Deal => "deal",
            ResourceType::Project => "project",
            ResourceType::Task => "task",
            ResourceType::TaskflowProject => "taskflow_project",
            ResourceType::TaskflowTask => "taskflow_task",
        }
    }
}

/// Audit log entry builder
#[derive(Debug)]
pub struct AuditEntry {
    actor: String,
    action: AuditAction,
    resource_type: ResourceType,
    resource_id: Option<Uuid>,
    details: Option<serde_json::Value>,
    ip_address: Option<IpAddr>,
    correlation_id: Option<String>,
}

impl AuditEntry {
    pub fn new(action: AuditAction, resource_type: ResourceType) -> Self {
        Self {
            actor: "system".to_string(),
            action,
            resource_type,
            resource_id: None,
            details: None,
            ip_address: None,
            correlation_id: None,
        }
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn resource(mut self, resource_id: Uuid) -> Self {
        self.resource_id = Some(resource_id);
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn ip(mut self, ip_address: IpAddr) -> Self {
        self.ip_address = Some(ip_address);
        self
    }

    pub fn correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// Filters for listing audit entries.
#[derive(Debug, Default, Clone)]
pub struct AuditQuery {
    pub actor: Option<String>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Audit service
pub struct AuditService {
    db: PgPool,
}

impl AuditService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Log an audit entry
    pub async fn log(&self, entry: AuditEntry) -> Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO audit_log (actor, action, resource_type, resource_id, details, ip_address, correlation_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&entry.actor)
        .bind(entry.action.as_str())
        .bind(entry.resource_type.as_str())
        .bind(entry.resource_id)
        .bind(&entry.details)
        .bind(entry.ip_address.map(|ip| ip.to_string()))
        .bind(&entry.correlation_id)
        .fetch_one(&self.db)
        .await?;

        Ok(id)
    }

    /// Log an entry without failing the caller; errors are only traced.
    pub async fn record(&self, entry: AuditEntry) {
        let action = entry.action.as_str();
        let resource_type = entry.resource_type.as_str();
        if let Err(e) = self.log(entry).await {
            tracing::warn!(action, resource_type, "Failed to write audit log: {}", e);
        }
    }

    /// Query audit logs, newest first
    pub async fn query(
        &self,
        filter: &AuditQuery,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<AuditLog>, i64)> {
        let entries = sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT
                id, actor, action, resource_type, resource_id,
                details, ip_address, correlation_id, created_at
            FROM audit_log
            WHERE ($1::text IS NULL OR actor = $1)
              AND ($2::text IS NULL OR action = $2)
              AND ($3::text IS NULL OR resource_type = $3)
              AND ($4::uuid IS NULL OR resource_id = $4)
              AND ($5::timestamptz IS NULL OR created_at >= $5)
              AND ($6::timestamptz IS NULL OR created_at <= $6)
            ORDER BY created_at DESC
            OFFSET $7
            LIMIT $8
            "#,
        )
        .bind(&filter.actor)
        .bind(&filter.action)
        .bind(&filter.resource_type)
        .bind(filter.resource_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM audit_log
            WHERE ($1::text IS NULL OR actor = $1)
              AND ($2::text IS NULL OR action = $2)
              AND ($3::text IS NULL OR resource_type = $3)
              AND ($4::uuid IS NULL OR resource_id = $4)
              AND ($5::timestamptz IS NULL OR created_at >= $5)
              AND ($6::timestamptz IS NULL OR created_at <= $6)
            "#,
        )
        .bind(&filter.actor)
        .bind(&filter.action)
        .bind(&filter.resource_type)
        .bind(filter.resource_id)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_one(&self.db)
        .await?;

        Ok((entries, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_audit_action_as_str() {
        assert_eq!(AuditAction::Created.as_str(), "CREATED");
        assert_eq!(AuditAction::Updated.as_str(), "UPDATED");
        assert_eq!(AuditAction::Deleted.as_str(), "DELETED");
        assert_eq!(AuditAction::StatusChanged.as_str(), "STATUS_CHANGED");
        assert_eq!(AuditAction::Moved.as_str(), "MOVED");
        assert_eq!(AuditAction::Closed.as_str(), "CLOSED");
    }

    #[test]
    fn test_resource_type_as_str_all_variants() {
        assert_eq!(ResourceType::Service.as_str(), "service");
        assert_eq!(ResourceType::Package.as_str(), "package");
        assert_eq!(ResourceType::ScopingFactor.as_str(), "scoping_factor");
        assert_eq!(ResourceType::ScopingRule.as_str(), "scoping_rule");
        assert_eq!(ResourceType::Quote.as_str(), "quote");
        assert_eq!(ResourceType::Conversation.as_str(), "conversation");
        assert_eq!(ResourceType::Company.as_str(), "company");
        assert_eq!(ResourceType::Contact.as_str(), "contact");
        assert_eq!(ResourceType::Deal.as_str(), "deal");
        assert_eq!(ResourceType::Project.as_str(), "project");
        assert_eq!(ResourceType::Task.as_str(), "task");
        assert_eq!(ResourceType::TaskflowProject.as_str(), "taskflow_project");
        assert_eq!(ResourceType::TaskflowTask.as_str(), "taskflow_task");
    }

    #[test]
    fn test_audit_entry_new_defaults() {
        let entry = AuditEntry::new(AuditAction::Created, ResourceType::Service);
        assert_eq!(entry.actor, "system");
        assert!(entry.resource_id.is_none());
        assert!(entry.details.is_none());
        assert!(entry.ip_address.is_none());
        assert!(entry.correlation_id.is_none());
    }

    #[test]
    fn test_audit_entry_builder_full_chain() {
        let resource_id = Uuid::new_v4();
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let details = serde_json::json!({"slug": "revops-audit"});

        let entry = AuditEntry::new(AuditAction::Updated, ResourceType::Package)
            .actor("key:1a2b3c4d")
            .resource(resource_id)
            .details(details.clone())
            .ip(ip)
            .correlation("req-123");

        assert_eq!(entry.actor, "key:1a2b3c4d");
        assert_eq!(entry.resource_id, Some(resource_id));
        assert_eq!(entry.details, Some(details));
        assert_eq!(entry.ip_address, Some(ip));
        assert_eq!(entry.correlation_id.as_deref(), Some("req-123"));
    }

    #[test]
    fn test_audit_entry_builder_ip_v6() {
        let ip = IpAddr::V6(Ipv6Addr::LOCALHOST);
        let entry = AuditEntry::new(AuditAction::Deleted, ResourceType::Deal).ip(ip);
        assert_eq!(entry.ip_address, Some(ip));
    }

    #[test]
    fn test_audit_query_default_is_unfiltered() {
        let q = AuditQuery::default();
        assert!(q.actor.is_none());
        assert!(q.action.is_none());
        assert!(q.resource_type.is_none());
        assert!(q.resource_id.is_none());
        assert!(q.from.is_none() && q.to.is_none());
    }
}
