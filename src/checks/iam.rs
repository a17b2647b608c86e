//! IAM baseline check
//!
//! Control Tower accounts authenticate through IAM Identity Center, so any
//! IAM user is a finding. Roles created by AWS or the landing zone are
//! filtered out; whatever remains is reported for review.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use super::{FindingSink, Scope};
use crate::config::IamExpectations;
use crate::error::BoxError;
use crate::pagination::{drain, Page};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IamUserInfo {
    pub name: String,
    pub arn: String,
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IamRoleInfo {
    pub name: String,
    pub arn: String,
    pub created: Option<DateTime<Utc>>,
}

/// Seam over IAM. Both listings are marker-paginated.
#[async_trait]
pub trait IamApi: Send + Sync {
    async fn list_users(&self, marker: Option<String>) -> Result<Page<IamUserInfo>, BoxError>;

    async fn list_roles(&self, marker: Option<String>) -> Result<Page<IamRoleInfo>, BoxError>;
}

pub fn is_excluded_role(name: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| name.contains(p.as_str()))
}

/// Roles not matching any excluded pattern, in listing order
pub fn interesting_roles<'a>(roles: &'a [IamRoleInfo], patterns: &[String]) -> Vec<&'a IamRoleInfo> {
    roles
        .iter()
        .filter(|r| !is_excluded_role(&r.name, patterns))
        .collect()
}

fn created(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Report IAM users and non-managed roles, returning the number of findings
pub async fn audit_iam(
    api: &dyn IamApi,
    scope: &Scope,
    expectations: &IamExpectations,
    sink: &dyn FindingSink,
) -> anyhow::Result<usize> {
    let prefix = scope.prefix();

    let users = drain(|marker| api.list_users(marker))
        .await
        .map_err(|e| anyhow!(e.source))
        .context("Error listing IAM users")?;

    let mut count = 0;

    if users.is_empty() {
        info!(account_id = %scope.account_id, "{} No users found", prefix);
    }
    for user in &users {
        sink.record(scope.finding(format!(
            "IAM user found: {} (created {})",
            user.name,
            created(user.created)
        )));
        count += 1;
    }

    // Users are already reported if the role listing fails
    let roles = drain(|marker| api.list_roles(marker))
        .await
        .map_err(|e| anyhow!(e.source))
        .context("Error listing IAM roles")?;

    let interesting = interesting_roles(&roles, &expectations.excluded_role_patterns);
    info!(
        account_id = %scope.account_id,
        roles = roles.len(),
        interesting = interesting.len(),
        "{} Listed roles",
        prefix
    );
    for role in interesting {
        sink.record(scope.finding(format!(
            "Interesting role: {} (created {})",
            role.name,
            created(role.created)
        )));
        count += 1;
    }

    Ok(count)
}
