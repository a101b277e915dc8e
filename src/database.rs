use crate::model::*;
use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{abort, ConflictableTransactionError, TransactionError};
use sled::Transactional;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("index {0} points to a missing record")]
    CorruptIndex(&'static str),
}

pub type DbResult<T> = Result<T, DbError>;

const USERS: &[u8] = b"users";
const USERS_EMAIL: &[u8] = b"users_email";
const MOVIES: &[u8] = b"movies";

pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn decode<T: DeserializeOwned, V: AsRef<[u8]>>(data: V) -> DbResult<T> {
    Ok(bincode::deserialize(data.as_ref())?)
}

fn get_record<T: DeserializeOwned>(tree: &sled::Tree, id: &str) -> DbResult<Option<T>> {
    tree.get(id.as_bytes())?.map(decode).transpose()
}

/// Read, change and write back one record atomically. Returns `None` when
/// there is no record under `id`.
fn modify_record<T, F>(tree: &sled::Tree, id: &str, f: F) -> DbResult<Option<T>>
where
    T: Serialize + DeserializeOwned,
    F: Fn(&mut T),
{
    tree.transaction(|tree| {
        let mut record: T = match tree.get(id.as_bytes())? {
            Some(data) => bincode::deserialize(&data)
                .map_err(|err| ConflictableTransactionError::Abort(DbError::from(err)))?,
            None => return Ok(None),
        };
        f(&mut record);
        let data = bincode::serialize(&record)
            .map_err(|err| ConflictableTransactionError::Abort(DbError::from(err)))?;
        tree.insert(id.as_bytes(), data)?;
        Ok(Some(record))
    })
    .map_err(|err| match err {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => err.into(),
    })
}

pub trait UserDb {
    type Error;
    /// Stores a new user under a fresh id. Returns `None` if the email is taken.
    fn add_user(&self, user: User) -> Result<Option<String>, Self::Error>;
    fn get_user(&self, id: &str) -> Result<Option<User>, Self::Error>;
    fn get_user_by_email(&self, email: &str) -> Result<Option<User>, Self::Error>;
    fn update_user(&self, user: &User) -> Result<(), Self::Error>;
    /// Appends a movie id to the user's watchlist. Returns `false` for an unknown user.
    fn push_movie(&self, user_id: &str, movie_id: &str) -> Result<bool, Self::Error>;
}

impl UserDb for sled::Db {
    type Error = DbError;

    fn add_user(&self, mut user: User) -> DbResult<Option<String>> {
        let users = self.open_tree(USERS)?;
        let users_email = self.open_tree(USERS_EMAIL)?;
        let id = generate_id();
        user.id = id.clone();
        let data = bincode::serialize(&user)?;
        let result = (&users, &users_email).transaction(|(users, users_email)| {
            if users_email
                .insert(user.email.as_bytes(), id.as_bytes())?
                .is_some()
            {
                return abort(());
            }
            users.insert(id.as_bytes(), data.as_slice())?;
            Ok(())
        });
        match result {
            Ok(()) => Ok(Some(id)),
            Err(TransactionError::Abort(())) => Ok(None),
            Err(TransactionError::Storage(err)) => Err(err.into()),
        }
    }

    fn get_user(&self, id: &str) -> DbResult<Option<User>> {
        get_record(&self.open_tree(USERS)?, id)
    }

    fn get_user_by_email(&self, email: &str) -> DbResult<Option<User>> {
        let users_email = self.open_tree(USERS_EMAIL)?;
        let users = self.open_tree(USERS)?;
        if let Some(id) = users_email.get(email.as_bytes())? {
            let data = users.get(&id)?.ok_or(DbError::CorruptIndex("users_email"))?;
            Ok(Some(decode(data)?))
        } else {
            Ok(None)
        }
    }

    fn update_user(&self, user: &User) -> DbResult<()> {
        let users = self.open_tree(USERS)?;
        users.insert(user.id.as_bytes(), bincode::serialize(user)?)?;
        Ok(())
    }

    fn push_movie(&self, user_id: &str, movie_id: &str) -> DbResult<bool> {
        let users = self.open_tree(USERS)?;
        let updated = modify_record(&users, user_id, |user: &mut User| {
            user.movies.push(movie_id.to_owned())
        })?;
        Ok(updated.is_some())
    }
}

pub trait MovieDb {
    type Error;
    fn add_movie(&self, movie: &Movie) -> Result<(), Self::Error>;
    fn get_movie(&self, id: &str) -> Result<Option<Movie>, Self::Error>;
    /// Fetches the given ids in order, skipping ids without a record.
    fn get_movies(&self, ids: &[String]) -> Result<Vec<Movie>, Self::Error>;
    fn update_movie(&self, movie: &Movie) -> Result<(), Self::Error>;
    fn rate_movie(&self, id: &str, rating: u8) -> Result<Option<Movie>, Self::Error>;
    fn watch_movie(
        &self,
        id: &str,
        when: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<Movie>, Self::Error>;
    /// Case-insensitive substring match on title or director over every stored movie.
    fn search_movies(&self, term: &str) -> Result<Vec<Movie>, Self::Error>;
}

impl MovieDb for sled::Db {
    type Error = DbError;

    fn add_movie(&self, movie: &Movie) -> DbResult<()> {
        let movies = self.open_tree(MOVIES)?;
        movies.insert(movie.id.as_bytes(), bincode::serialize(movie)?)?;
        Ok(())
    }

    fn get_movie(&self, id: &str) -> DbResult<Option<Movie>> {
        get_record(&self.open_tree(MOVIES)?, id)
    }

    fn get_movies(&self, ids: &[String]) -> DbResult<Vec<Movie>> {
        let movies = self.open_tree(MOVIES)?;
        let mut ret = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(movie) = get_record(&movies, id)? {
                ret.push(movie);
            }
        }
        Ok(ret)
    }

    fn update_movie(&self, movie: &Movie) -> DbResult<()> {
        self.add_movie(movie)
    }

    fn rate_movie(&self, id: &str, rating: u8) -> DbResult<Option<Movie>> {
        modify_record(&self.open_tree(MOVIES)?, id, |movie: &mut Movie| {
            movie.rating = rating
        })
    }

    fn watch_movie(
        &self,
        id: &str,
        when: chrono::DateTime<chrono::Utc>,
    ) -> DbResult<Option<Movie>> {
        modify_record(&self.open_tree(MOVIES)?, id, |movie: &mut Movie| {
            movie.last_watched = Some(when)
        })
    }

    fn search_movies(&self, term: &str) -> DbResult<Vec<Movie>> {
        let needle = term.to_lowercase();
        let mut ret = Vec::new();
        for entry in self.open_tree(MOVIES)?.iter() {
            let (_id, data) = entry?;
            let movie: Movie = decode(data)?;
            if movie.title.to_lowercase().contains(&needle)
                || movie.director.to_lowercase().contains(&needle)
            {
                ret.push(movie);
            }
        }
        ret.sort_by_cached_key(|movie| movie.title.to_lowercase());
        Ok(ret)
    }
}
