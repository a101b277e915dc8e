use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub address: String,
    pub email: String,
    pub password_hash: String,
    /// Ids of the movies on this user's watchlist, in the order they were added.
    pub movies: Vec<String>,
    pub profile_picture: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Movie {
    pub id: String,
    pub title: String,
    pub director: String,
    pub year: i32,
    pub cast: Vec<String>,
    pub series: Vec<String>,
    pub tags: Vec<String>,
    pub description: String,
    pub video_link: String,
    pub rating: u8,
    pub last_watched: Option<DateTime<Utc>>,
}

impl Movie {
    pub fn new(id: String, title: String, director: String, year: i32) -> Self {
        Movie {
            id,
            title,
            director,
            year,
            cast: Vec::new(),
            series: Vec::new(),
            tags: Vec::new(),
            description: String::new(),
            video_link: String::new(),
            rating: 0,
            last_watched: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

impl Default for Theme {
    fn default() -> Self {
        Theme::Light
    }
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}
