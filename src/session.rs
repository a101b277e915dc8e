use crate::error::AppError;
use crate::model::{Theme, User};
use actix_identity::{config::LogoutBehaviour, Identity, IdentityMiddleware};
use actix_session::{storage::CookieSessionStore, Session, SessionMiddleware};
use actix_web::{
    cookie::{Key, SameSite},
    HttpMessage, HttpRequest,
};
use serde::{Deserialize, Serialize};

pub const SESSION_COOKIE: &str = "watchlist-session";

const EMAIL: &str = "email";
const THEME: &str = "theme";
const FLASHES: &str = "_flashes";

/// Strict same-site cookies keep cross-site form posts unauthenticated.
pub fn session_middleware(key: Key, secure: bool) -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_name(SESSION_COOKIE.to_owned())
        .cookie_secure(secure)
        .cookie_same_site(SameSite::Strict)
        .build()
}

/// Logging out only drops the identity keys so the rest of the session
/// can be handled by [`sign_out`].
pub fn identity_middleware() -> IdentityMiddleware {
    IdentityMiddleware::builder()
        .logout_behaviour(LogoutBehaviour::DeleteIdentityKeys)
        .build()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Flash {
    pub category: String,
    pub message: String,
}

pub fn flash<M: Into<String>>(session: &Session, category: &str, message: M) -> Result<(), AppError> {
    let mut flashes: Vec<Flash> = session.get(FLASHES)?.unwrap_or_default();
    flashes.push(Flash {
        category: category.to_owned(),
        message: message.into(),
    });
    session.insert(FLASHES, flashes)?;
    Ok(())
}

pub fn flash_all<I>(session: &Session, category: &str, messages: I) -> Result<(), AppError>
where
    I: IntoIterator<Item = String>,
{
    for message in messages {
        flash(session, category, message)?;
    }
    Ok(())
}

pub fn take_flashes(session: &Session) -> Result<Vec<Flash>, AppError> {
    let flashes: Vec<Flash> = session.get(FLASHES)?.unwrap_or_default();
    if !flashes.is_empty() {
        session.remove(FLASHES);
    }
    Ok(flashes)
}

pub fn theme(session: &Session) -> Result<Theme, AppError> {
    Ok(session.get(THEME)?.unwrap_or_default())
}

pub fn toggle_theme(session: &Session) -> Result<Theme, AppError> {
    let theme = theme(session)?.toggled();
    session.insert(THEME, theme)?;
    Ok(theme)
}

pub fn email(session: &Session) -> Result<Option<String>, AppError> {
    Ok(session.get(EMAIL)?)
}

/// Anonymous -> Authenticated.
pub fn sign_in(req: &HttpRequest, session: &Session, user: &User) -> Result<(), AppError> {
    Identity::login(&req.extensions(), user.id.clone())
        .map_err(|err| AppError::Identity(err.to_string()))?;
    session.insert(EMAIL, &user.email)?;
    Ok(())
}

/// Authenticated -> Anonymous. The theme survives, everything else is dropped.
pub fn sign_out(identity: Option<Identity>, session: &Session) -> Result<(), AppError> {
    let theme: Option<Theme> = session.get(THEME)?;
    if let Some(identity) = identity {
        identity.logout();
    }
    session.clear();
    if let Some(theme) = theme {
        session.insert(THEME, theme)?;
    }
    Ok(())
}

/// Variables every page template relies on.
pub fn page_context(req: &HttpRequest, session: &Session) -> Result<tera::Context, AppError> {
    let email = email(session)?;
    let current_page = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let mut ctx = tera::Context::new();
    ctx.insert("theme", &theme(session)?);
    ctx.insert("flashes", &take_flashes(session)?);
    ctx.insert("current_page", current_page);
    ctx.insert("logged_in", &email.is_some());
    ctx.insert("email", &email.unwrap_or_default());
    Ok(ctx)
}

/// Redirect target for `current_page`: only paths on this site are followed.
pub fn local_target(target: Option<&str>) -> &str {
    match target {
        Some(target) if target.starts_with('/') && !target.starts_with("//") && !target.contains('\\') => {
            target
        }
        _ => "/",
    }
}
