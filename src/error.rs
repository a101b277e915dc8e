use crate::database::DbError;
use actix_web::{http::header, http::StatusCode, HttpResponse, ResponseError};
use log::error;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("login required")]
    LoginRequired,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Template(#[from] tera::Error),

    #[error(transparent)]
    Password(#[from] bcrypt::BcryptError),

    #[error(transparent)]
    SessionGet(#[from] actix_session::SessionGetError),

    #[error(transparent)]
    SessionInsert(#[from] actix_session::SessionInsertError),

    #[error("identity error: {0}")]
    Identity(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AppError {
    fn public_message(&self) -> &'static str {
        match self {
            AppError::LoginRequired => "Login required",
            AppError::NotFound(_) => "Not found",
            AppError::Database(_) => "Database error",
            AppError::Template(_) => "Template error",
            AppError::Password(_) => "Verification error",
            AppError::SessionGet(_) | AppError::SessionInsert(_) | AppError::Identity(_) => {
                "Session error"
            }
            AppError::Io(_) => "Storage error",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::LoginRequired => StatusCode::FOUND,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::LoginRequired => HttpResponse::Found()
                .insert_header((header::LOCATION, "/login"))
                .finish(),
            AppError::NotFound(what) => HttpResponse::NotFound().body(format!("{} not found", what)),
            _ => {
                error!("{:?}", self);
                HttpResponse::InternalServerError().body(self.public_message())
            }
        }
    }
}
