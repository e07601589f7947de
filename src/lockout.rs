//! Failed-login counting and time-boxed account locks.
//!
//! Both live in the credential cache under
//! `"{failed_login_cache_key_id}-{email}"` and `"{account_locked_key_id}-{email}"`.
//! Emails are lowercased for keying so case variants share one counter.

use std::sync::Arc;

use tracing::Instrument;

use crate::audit::{Audit, AuditEvent};
use crate::cache::{CredentialCache, cache_key};
use crate::config::LockoutSettings;
use crate::deadline::Deadline;

/// Value stored under a lock key.
pub const LOCK_SENTINEL: &str = "1";

/// Result of counting one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Counted, still at or below the maximum.
    Counted(i64),
    /// Count went over the maximum and the account lock was written.
    JustLocked,
    /// The counter could not be updated.
    Unrecorded,
}

pub struct Lockout {
    cache: Arc<dyn CredentialCache>,
    settings: LockoutSettings,
    audit: Audit,
    span: tracing::Span,
}

impl Lockout {
    pub fn new(cache: Arc<dyn CredentialCache>, settings: LockoutSettings, audit: Audit) -> Self {
        Self {
            cache,
            settings,
            audit,
            span: tracing::info_span!("lockout"),
        }
    }

    pub fn counter_key(&self, email: &str) -> String {
        cache_key(&self.settings.failed_login_cache_key_id, email.to_lowercase())
    }

    pub fn lock_key(&self, email: &str) -> String {
        cache_key(&self.settings.account_locked_key_id, email.to_lowercase())
    }

    /// Whether a lock is present. Cache errors and timeouts read as "not
    /// locked" and are audited.
    pub async fn is_locked(&self, email: &str, deadline: Deadline) -> bool {
        let key = self.lock_key(email);
        let result = deadline
            .run(self.cache.get(&key))
            .instrument(self.span.clone())
            .await;

        match result {
            Ok(Ok(value)) => value.as_deref() == Some(LOCK_SENTINEL),
            Ok(Err(e)) => {
                self.audit
                    .record_for(AuditEvent::LockoutCacheUnavailable, email, e);
                false
            }
            Err(e) => {
                self.audit
                    .record_for(AuditEvent::LockoutCacheUnavailable, email, e);
                false
            }
        }
    }

    /// Count a failed attempt and lock the account once the count exceeds the
    /// configured maximum.
    pub async fn record_failure(&self, email: &str, deadline: Deadline) -> FailureOutcome {
        let span = self.span.clone();
        async {
            let key = self.counter_key(email);
            let count = match deadline
                .run(self.cache.incr(&key, self.settings.failed_login_window))
                .await
            {
                Ok(Ok(count)) => count,
                Ok(Err(e)) => {
                    tracing::error!(email = %email, error = %e, "failed to count failed login");
                    return FailureOutcome::Unrecorded;
                }
                Err(e) => {
                    tracing::error!(email = %email, error = %e, "failed to count failed login");
                    return FailureOutcome::Unrecorded;
                }
            };

            if count <= i64::from(self.settings.failed_login_max) {
                tracing::warn!(email = %email, count, "failed login");
                return FailureOutcome::Counted(count);
            }

            let lock = self.lock_key(email);
            match deadline
                .run(
                    self.cache
                        .set(&lock, LOCK_SENTINEL, self.settings.lock_duration),
                )
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(email = %email, error = %e, "failed to write account lock"),
                Err(e) => tracing::error!(email = %email, error = %e, "failed to write account lock"),
            }
            self.audit.record_for(
                AuditEvent::LoginAttemptsExceeded,
                email,
                format_args!("{} failed attempts", count),
            );
            FailureOutcome::JustLocked
        }
        .instrument(span)
        .await
    }

    /// Drop the failure counter after a successful login. Best effort.
    pub async fn clear(&self, email: &str, deadline: Deadline) {
        let key = self.counter_key(email);
        match deadline.run(self.cache.delete(&key)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(email = %email, error = %e, "failed to clear login counter"),
            Err(e) => tracing::warn!(email = %email, error = %e, "failed to clear login counter"),
        }
    }
}
