//! IssueSessionHandler - signs a fresh access and refresh pair.
//!
//! Whatever login flow sits in front of this service calls it once the
//! caller's identity is established.

use std::sync::Arc;

use crate::domain::auth::{jti_prefix, TokenKind, TokenPair};
use crate::domain::foundation::{AuthError, Role, Timestamp, UserId};
use crate::ports::TokenService;

pub struct IssueSessionHandler {
    tokens: Arc<dyn TokenService>,
}

impl IssueSessionHandler {
    pub fn new(tokens: Arc<dyn TokenService>) -> Self {
        Self { tokens }
    }

    pub fn handle(
        &self,
        user_id: &UserId,
        role: Role,
        now: Timestamp,
    ) -> Result<TokenPair, AuthError> {
        let pair = sign_pair(self.tokens.as_ref(), user_id, role, now)?;
        tracing::info!(
            user_id = %user_id,
            refresh_jti = %jti_prefix(&pair.refresh.jti),
            "Session issued"
        );
        Ok(pair)
    }
}

pub(crate) fn sign_pair(
    tokens: &dyn TokenService,
    user_id: &UserId,
    role: Role,
    now: Timestamp,
) -> Result<TokenPair, AuthError> {
    Ok(TokenPair {
        access: tokens.issue(user_id, role, TokenKind::Access, now)?,
        refresh: tokens.issue(user_id, role, TokenKind::Refresh, now)?,
    })
}
