//! Schema identifier validation.
//!
//! Schema names cannot be bound as query parameters, so they are the one
//! thing this crate interpolates into SQL text. Everything that does so goes
//! through [`SchemaName`], and the only statement built from one is the
//! transaction-local search path rendered by [`ScopePath`].

use std::fmt;

use super::error::TenancyError;

/// PostgreSQL truncates identifiers past `NAMEDATALEN - 1` bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// A validated, quotable schema name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaName(String);

impl SchemaName {
    /// Compose `prefix + tenant_id`, rejecting anything outside the allow-list.
    pub fn for_tenant(prefix: &str, tenant_id: &str) -> Result<Self, TenancyError> {
        if tenant_id.is_empty() {
            return Err(TenancyError::MissingTenantContext);
        }
        validate_tenant_id(tenant_id)?;

        let name = format!("{}{}", prefix, tenant_id);
        if !is_allowed(prefix) {
            return Err(TenancyError::MalformedIdentifier(tenant_id.to_string()));
        }
        if name.len() > MAX_IDENTIFIER_LEN {
            tracing::warn!(
                target: "tenancy::security",
                tenant_id = ?tenant_id,
                len = name.len(),
                "rejected tenant identifier too long for a schema name"
            );
            return Err(TenancyError::MalformedIdentifier(tenant_id.to_string()));
        }
        Ok(Self(name))
    }

    /// Validate a configured schema name used verbatim (e.g. `public`).
    pub fn shared(name: &str) -> Result<Self, TenancyError> {
        if name.is_empty() || !is_allowed(name) || name.len() > MAX_IDENTIFIER_LEN {
            return Err(TenancyError::MalformedIdentifier(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted identifier form.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0.replace('"', "\"\""))
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check a raw tenant id against the allow-list: ASCII letters, digits,
/// hyphen and underscore, non-empty.
pub fn validate_tenant_id(tenant_id: &str) -> Result<(), TenancyError> {
    if tenant_id.is_empty() || !is_allowed(tenant_id) {
        tracing::warn!(
            target: "tenancy::security",
            tenant_id = ?tenant_id,
            "rejected malformed tenant identifier"
        );
        return Err(TenancyError::MalformedIdentifier(tenant_id.to_string()));
    }
    Ok(())
}

fn is_allowed(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Ordered lookup scope for one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopePath {
    tenant: Option<SchemaName>,
    shared: SchemaName,
}

impl ScopePath {
    pub fn tenant(tenant: SchemaName, shared: SchemaName) -> Self {
        Self {
            tenant: Some(tenant),
            shared,
        }
    }

    pub fn shared_only(shared: SchemaName) -> Self {
        Self {
            tenant: None,
            shared,
        }
    }

    pub fn tenant_schema(&self) -> Option<&SchemaName> {
        self.tenant.as_ref()
    }

    pub fn shared_schema(&self) -> &SchemaName {
        &self.shared
    }

    /// The schema unqualified table names resolve against first.
    pub fn primary(&self) -> &SchemaName {
        self.tenant.as_ref().unwrap_or(&self.shared)
    }

    /// `SET LOCAL` keeps the path bound to the current transaction, so a
    /// pooled connection reverts on commit or rollback.
    pub fn set_local_statement(&self) -> String {
        match &self.tenant {
            Some(tenant) => format!(
                "SET LOCAL search_path TO {}, {}",
                tenant.quoted(),
                self.shared.quoted()
            ),
            None => format!("SET LOCAL search_path TO {}", self.shared.quoted()),
        }
    }
}
