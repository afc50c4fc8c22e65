//! Signin, refresh, combined token verification, and signout.

use tracing::{debug, info};

use super::errors::{AuthError, ResultExt};
use super::types::{RefreshResponse, SessionTokens, SigninRequest, VerifyTokensResponse};
use super::{AuthCoordinator, validate};
use crate::jwt::{TokenError, TokenKind};
use crate::store::{Rotation, StoreError};

impl AuthCoordinator {
    /// Authenticate by email or username and open a session on a new client id.
    pub async fn signin(&self, req: &SigninRequest) -> Result<SessionTokens, AuthError> {
        validate::identifier(&req.identifier)?;
        validate::password(&req.password)?;

        let lookup = if req.identifier.contains('@') {
            self.users.find_by_email(&req.identifier).await
        } else {
            self.users.find_by_username(&req.identifier).await
        };
        let user = match lookup {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                debug!("Signin for unknown identifier");
                return Err(AuthError::InvalidCredential);
            }
            Err(e) => return Err(e).server_err("signin: find user"),
        };

        if !user.active {
            return Err(AuthError::NotActivated);
        }

        let matches = self
            .check_password(&user.password_hash, &req.password, &user.password_salt)
            .await?;
        if !matches {
            debug!(user_id = user.id, "Signin with wrong password");
            return Err(AuthError::InvalidCredential);
        }

        let tokens = self.open_session(&user.info()).await?;
        info!(user_id = user.id, client_id = %tokens.client_id, "User signed in");
        Ok(tokens)
    }

    /// Exchange a refresh token for a new pair, rotating the session's token id.
    ///
    /// The presented token id must still be the one stored for its client.
    /// A replayed or revoked token fails with `SessionInvalid`.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, AuthError> {
        validate::token("refresh_token", refresh_token)?;

        let subject = self
            .tokens
            .verify_refresh(refresh_token)
            .map_err(|e| AuthError::from_token(TokenKind::Refresh, e))?;

        let new_token_id = self.random.new_id();
        let new_expires_at = self.session_expiry()?;

        let user = match self
            .sessions
            .rotate(&Rotation {
                client_id: subject.client_id.clone(),
                old_token_id: subject.token_id,
                new_token_id: new_token_id.clone(),
                new_expires_at,
            })
            .await
        {
            Ok(user) => user,
            Err(StoreError::SessionInvalid) => {
                debug!(client_id = %subject.client_id, "Refresh with stale or revoked token");
                return Err(AuthError::SessionInvalid);
            }
            Err(e) => return Err(e).server_err("refresh: rotate session"),
        };

        let refresh_token = self
            .tokens
            .issue_refresh(&subject.client_id, &new_token_id, new_expires_at)
            .server_err("refresh: issue refresh token")?;
        let access_token = self
            .tokens
            .issue_access(&user)
            .server_err("refresh: issue access token")?;

        debug!(user_id = user.id, client_id = %subject.client_id, "Session rotated");
        Ok(RefreshResponse {
            tokens: SessionTokens {
                access_token,
                refresh_token,
                client_id: subject.client_id,
            },
            user,
        })
    }

    /// Verify an access token. If it has expired and a refresh token is given,
    /// refresh transparently and return the renewed tokens alongside the user.
    pub async fn verify_tokens(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<VerifyTokensResponse, AuthError> {
        validate::token("access_token", access_token)?;

        match self.tokens.verify_access(access_token) {
            Ok(user) => Ok(VerifyTokensResponse {
                user,
                renewed: None,
            }),
            Err(TokenError::Expired) => match refresh_token {
                Some(refresh_token) => {
                    let refreshed = self.refresh(refresh_token).await?;
                    Ok(VerifyTokensResponse {
                        user: refreshed.user,
                        renewed: Some(refreshed.tokens),
                    })
                }
                None => Err(AuthError::TokenExpired {
                    kind: TokenKind::Access,
                }),
            },
            Err(e) => Err(AuthError::from_token(TokenKind::Access, e)),
        }
    }

    /// End the session for `client_id`. Succeeds whether or not it existed.
    pub async fn signout(&self, client_id: &str) -> Result<(), AuthError> {
        validate::client_id(client_id)?;

        self.sessions
            .delete(client_id)
            .await
            .server_err("signout: delete session")?;

        info!(client_id = %client_id, "Client signed out");
        Ok(())
    }
}
