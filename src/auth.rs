use crate::database::UserDb;
use crate::error::AppError;
use crate::forms::{normalize_email, RegisterForm};
use crate::model::User;
use actix_identity::Identity;
use log::{debug, info};

pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, cost)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    bcrypt::verify(password, hash)
}

/// Id of the signed in user, or a redirect to the login page.
pub fn require_login(identity: Option<Identity>) -> Result<String, AppError> {
    identity
        .and_then(|identity| identity.id().ok())
        .ok_or(AppError::LoginRequired)
}

/// Like [`require_login`], but also loads the user. An identity pointing at a
/// user that no longer exists counts as anonymous.
pub fn current_user(identity: Option<Identity>, db: &sled::Db) -> Result<User, AppError> {
    let user_id = require_login(identity)?;
    match db.get_user(&user_id)? {
        Some(user) => Ok(user),
        None => {
            debug!("Session refers to unknown user {}", user_id);
            Err(AppError::LoginRequired)
        }
    }
}

/// Creates the account. Returns `None` if the email is already registered.
pub fn register(db: &sled::Db, form: &RegisterForm, cost: u32) -> Result<Option<String>, AppError> {
    let user = User {
        id: String::new(),
        name: form.name.trim().to_owned(),
        address: form.address.trim().to_owned(),
        email: normalize_email(&form.email),
        password_hash: hash_password(&form.password, cost)?,
        movies: Vec::new(),
        profile_picture: None,
    };
    let id = db.add_user(user)?;
    match &id {
        Some(id) => info!("Registered user {}", id),
        None => debug!("Registration for existing email {}", normalize_email(&form.email)),
    }
    Ok(id)
}

/// Unknown email and wrong password are indistinguishable to the caller.
pub fn authenticate(db: &sled::Db, email: &str, password: &str) -> Result<Option<User>, AppError> {
    let user = match db.get_user_by_email(&normalize_email(email))? {
        Some(user) => user,
        None => return Ok(None),
    };
    if verify_password(password, &user.password_hash)? {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}
