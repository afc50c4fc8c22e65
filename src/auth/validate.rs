//! Input checks run before any flow touches the stores.

use super::errors::AuthError;

const MAX_USERNAME_LENGTH: usize = 32;
const MAX_EMAIL_LENGTH: usize = 254;
/// Bounds the KDF input. Not a strength policy.
const MAX_PASSWORD_LENGTH: usize = 1024;
const MAX_TOKEN_LENGTH: usize = 4096;
const MAX_CLIENT_ID_LENGTH: usize = 64;

pub(super) fn username(username: &str) -> Result<(), AuthError> {
    if username.is_empty() {
        return Err(AuthError::validation("username", "cannot be empty"));
    }
    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(AuthError::validation("username", "must be 32 characters or less"));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(AuthError::validation(
            "username",
            "may only contain letters, numbers, and underscores",
        ));
    }
    Ok(())
}

pub(super) fn email(email: &str) -> Result<(), AuthError> {
    if email.is_empty() {
        return Err(AuthError::validation("email", "cannot be empty"));
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(AuthError::validation("email", "is too long"));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(AuthError::validation("email", "cannot contain whitespace"));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(AuthError::validation("email", "must contain @"));
    };
    if local.is_empty() || domain.contains('@') {
        return Err(AuthError::validation("email", "is not a valid address"));
    }
    let labels_ok = domain.split('.').all(|label| !label.is_empty());
    if !domain.contains('.') || !labels_ok {
        return Err(AuthError::validation("email", "domain is not valid"));
    }
    Ok(())
}

pub(super) fn password(password: &str) -> Result<(), AuthError> {
    if password.is_empty() {
        return Err(AuthError::validation("password", "cannot be empty"));
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AuthError::validation("password", "is too long"));
    }
    Ok(())
}

/// Signin identifier: an email when it contains `@`, otherwise a username.
pub(super) fn identifier(identifier: &str) -> Result<(), AuthError> {
    if identifier.contains('@') {
        email(identifier).map_err(|_| AuthError::validation("identifier", "is not a valid email"))
    } else {
        username(identifier)
            .map_err(|_| AuthError::validation("identifier", "is not a valid username"))
    }
}

pub(super) fn token(field: &'static str, token: &str) -> Result<(), AuthError> {
    if token.is_empty() {
        return Err(AuthError::validation(field, "cannot be empty"));
    }
    if token.len() > MAX_TOKEN_LENGTH {
        return Err(AuthError::validation(field, "is too long"));
    }
    Ok(())
}

pub(super) fn client_id(client_id: &str) -> Result<(), AuthError> {
    if client_id.is_empty() {
        return Err(AuthError::validation("client_id", "cannot be empty"));
    }
    if client_id.len() > MAX_CLIENT_ID_LENGTH {
        return Err(AuthError::validation("client_id", "is too long"));
    }
    Ok(())
}
