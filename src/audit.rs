//! Security audit events.
//!
//! Audit records go to the `audit` tracing target with `audit = true`, so a
//! subscriber can route them apart from application logs. Each component gets
//! its own [`Audit`] handle at construction time.

use std::fmt::Display;

/// Kinds of security-relevant events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent {
    /// Malformed token, bad signature, wrong algorithm or bad key.
    JwtError,
    /// Token structurally fine but failed a claim check other than expiry.
    JwtValidation,
    /// Failure count crossed the maximum and an account lock was created.
    LoginAttemptsExceeded,
    /// Lock state could not be read, login proceeded without it.
    LockoutCacheUnavailable,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEvent::JwtError => "jwt-error",
            AuditEvent::JwtValidation => "jwt-validation",
            AuditEvent::LoginAttemptsExceeded => "login-attempts-exceeded",
            AuditEvent::LockoutCacheUnavailable => "lockout-cache-unavailable",
        }
    }
}

/// Audit logging handle for one component.
#[derive(Debug, Clone)]
pub struct Audit {
    component: &'static str,
}

impl Audit {
    pub fn new(component: &'static str) -> Self {
        Self { component }
    }

    pub fn component(&self) -> &'static str {
        self.component
    }

    /// Emit an audit event with a free-form detail.
    pub fn record(&self, event: AuditEvent, detail: impl Display) {
        tracing::error!(
            target: "audit",
            audit = true,
            component = self.component,
            event = event.as_str(),
            %detail,
            "security audit event"
        );
    }

    /// Emit an audit event tied to an account identifier.
    pub fn record_for(&self, event: AuditEvent, email: &str, detail: impl Display) {
        tracing::error!(
            target: "audit",
            audit = true,
            component = self.component,
            event = event.as_str(),
            email = %email,
            %detail,
            "security audit event"
        );
    }
}
