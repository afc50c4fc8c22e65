//! Email verification delivery.

use async_trait::async_trait;
use tracing::info;

use crate::store::{Notifier, NotifyError};

/// Writes verification tokens to the log instead of sending mail.
///
/// Development stand-in for a mail transport; the token is the only thing a
/// user needs to activate, so anyone with log access can activate accounts.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, token: &str) -> Result<(), NotifyError> {
        info!(recipient = %to, token = %token, "Email verification token issued");
        Ok(())
    }
}
