//! Privilege side effects.
//!
//! Grants and revokes run after the ledger commit and outside any community
//! lock. A failure is logged and swallowed: the count stands, and the next
//! crossing or reconciliation asks again.

use crate::platform::{Platform, PrivilegeRequest};

/// Apply a grant or revoke through the platform.
pub(crate) async fn apply_privilege<P: Platform>(platform: &P, request: &PrivilegeRequest) {
    match platform.apply_privilege(request).await {
        Ok(()) => {
            tracing::info!(
                community = %request.community,
                inviter = %request.inviter,
                action = ?request.action,
                privilege = %request.notice.privilege_name,
                threshold = %request.notice.threshold,
                "privilege applied"
            );
        },
        Err(e) => {
            tracing::warn!(
                community = %request.community,
                inviter = %request.inviter,
                action = ?request.action,
                "privilege not applied, ledger unchanged: {e}"
            );
        },
    }
}
