use tracing::{debug, warn};

use super::password::verify_password;
use super::session::SessionUser;
use super::validation::Credentials;
use crate::error::AuthError;
use crate::store::AuthStore;

/// Checks an email/password pair against the stored hash.
///
/// Unknown email, an OAuth-only account, a wrong password and an unreadable
/// stored hash all come back as `Ok(None)` so callers cannot tell them apart.
/// `Err` is reserved for store failures.
pub async fn authorize_credentials(
    store: &dyn AuthStore,
    credentials: &Credentials,
) -> Result<Option<SessionUser>, AuthError> {
    let Some(user) = store.find_user_by_email(&credentials.email).await? else {
        debug!("credentials rejected: unknown email");
        return Ok(None);
    };
    let Some(hash) = user.password_hash.as_deref() else {
        debug!(user_id = %user.id, "credentials rejected: account has no password");
        return Ok(None);
    };

    match verify_password(&credentials.password, hash) {
        Ok(true) => Ok(Some(SessionUser::from(&user))),
        Ok(false) => {
            debug!(user_id = %user.id, "credentials rejected: wrong password");
            Ok(None)
        }
        Err(e) => {
            warn!(user_id = %user.id, error = %e, "stored password hash is unreadable");
            Ok(None)
        }
    }
}
