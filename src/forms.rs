use crate::model::{Movie, User};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidateUrl, ValidationError, ValidationErrors};

const EARLIEST_YEAR: i32 = 1878;
const YEAR_MESSAGE: &str = "Please enter a year in the format YYYY.";

/// Flattens validation errors into user facing messages, ordered by field name.
pub fn error_messages(errors: &ValidationErrors) -> Vec<String> {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    fields
        .into_iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| match &error.message {
                Some(message) => message.to_string(),
                None => format!("Invalid value for {}.", field),
            })
        })
        .collect()
}

fn check<T: Validate>(form: &T) -> Result<(), Vec<String>> {
    form.validate().map_err(|errors| error_messages(&errors))
}

fn parse_year(year: &str) -> Result<i32, ValidationError> {
    let year: i32 = year.trim().parse().map_err(|_| {
        let mut error = ValidationError::new("integer");
        error.message = Some("Not a valid integer value.".into());
        error
    })?;
    if year < EARLIEST_YEAR {
        let mut error = ValidationError::new("range");
        error.message = Some(YEAR_MESSAGE.into());
        return Err(error);
    }
    Ok(year)
}

fn validate_year(year: &str) -> Result<(), ValidationError> {
    parse_year(year).map(|_| ())
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    error
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    match name.trim().chars().count() {
        2..=50 => Ok(()),
        _ => Err(invalid("length", "Name must be between 2 and 50 characters long.")),
    }
}

fn validate_required_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        Err(invalid("required", "Name is required."))
    } else {
        Ok(())
    }
}

fn validate_required_address(address: &str) -> Result<(), ValidationError> {
    if address.trim().is_empty() {
        Err(invalid("required", "Address is required."))
    } else {
        Ok(())
    }
}

/// Empty, or an absolute http(s) URL. Anything else would end up in an `href`.
fn validate_video_link(link: &str) -> Result<(), ValidationError> {
    let link = link.trim();
    if link.is_empty() {
        return Ok(());
    }
    let lower = link.to_ascii_lowercase();
    if link.validate_url() && (lower.starts_with("http://") || lower.starts_with("https://")) {
        Ok(())
    } else {
        Err(invalid("url", "Video link must be an http or https URL."))
    }
}

fn validate_address(address: &str) -> Result<(), ValidationError> {
    let address = address.trim();
    let message = if address.is_empty() {
        "Your address is required."
    } else if address.chars().count() > 200 {
        "Address cannot exceed 200 characters."
    } else {
        return Ok(());
    };
    let mut error = ValidationError::new("length");
    error.message = Some(message.into());
    Err(error)
}

fn validate_new_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() || password.chars().count() >= 4 {
        Ok(())
    } else {
        let mut error = ValidationError::new("length");
        error.message = Some("Password must be at least 4 characters long.".into());
        Err(error)
    }
}

/// One entry per non-blank line.
pub fn split_lines(value: &str) -> Vec<String> {
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Serialize, Deserialize, Default, Debug, Validate)]
#[serde(default)]
pub struct RegisterForm {
    #[validate(custom(function = "validate_name"))]
    pub name: String,
    #[validate(custom(function = "validate_address"))]
    pub address: String,
    #[validate(email(message = "Invalid email address."))]
    pub email: String,
    #[validate(length(min = 4, message = "Your password must be minimum 4 characters long."))]
    pub password: String,
    #[validate(must_match(
        other = "password",
        message = "This password did not match the one in the password field."
    ))]
    pub confirm_password: String,
}

impl RegisterForm {
    pub fn check(&self) -> Result<(), Vec<String>> {
        check(self)
    }
}

#[derive(Serialize, Deserialize, Default, Debug, Validate)]
#[serde(default)]
pub struct LoginForm {
    #[validate(email(message = "Invalid email address."))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
}

impl LoginForm {
    pub fn check(&self) -> Result<(), Vec<String>> {
        check(self)
    }
}

#[derive(Serialize, Deserialize, Default, Debug, Validate)]
#[serde(default)]
pub struct MovieForm {
    #[validate(length(min = 1, message = "Title is required."))]
    pub title: String,
    #[validate(length(min = 1, message = "Director is required."))]
    pub director: String,
    #[validate(custom(function = "validate_year"))]
    pub year: String,
}

impl MovieForm {
    pub fn to_movie(&self, id: String) -> Result<Movie, Vec<String>> {
        check(self)?;
        let year = parse_year(&self.year).map_err(|err| vec![err.to_string()])?;
        Ok(Movie::new(
            id,
            self.title.trim().to_owned(),
            self.director.trim().to_owned(),
            year,
        ))
    }
}

#[derive(Serialize, Deserialize, Default, Debug, Validate)]
#[serde(default)]
pub struct ExtendedMovieForm {
    #[validate(length(min = 1, message = "Title is required."))]
    pub title: String,
    #[validate(length(min = 1, message = "Director is required."))]
    pub director: String,
    #[validate(custom(function = "validate_year"))]
    pub year: String,
    pub cast: String,
    pub series: String,
    pub tags: String,
    pub description: String,
    #[validate(custom(function = "validate_video_link"))]
    pub video_link: String,
}

impl ExtendedMovieForm {
    pub fn from_movie(movie: &Movie) -> Self {
        ExtendedMovieForm {
            title: movie.title.clone(),
            director: movie.director.clone(),
            year: movie.year.to_string(),
            cast: movie.cast.join("\n"),
            series: movie.series.join("\n"),
            tags: movie.tags.join("\n"),
            description: movie.description.clone(),
            video_link: movie.video_link.clone(),
        }
    }

    /// Replaces every editable field of `movie`. Rating and watch date are kept.
    pub fn apply(&self, movie: &mut Movie) -> Result<(), Vec<String>> {
        check(self)?;
        movie.year = parse_year(&self.year).map_err(|err| vec![err.to_string()])?;
        movie.title = self.title.trim().to_owned();
        movie.director = self.director.trim().to_owned();
        movie.cast = split_lines(&self.cast);
        movie.series = split_lines(&self.series);
        movie.tags = split_lines(&self.tags);
        movie.description = self.description.trim().to_owned();
        movie.video_link = self.video_link.trim().to_owned();
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Default, Debug, Validate)]
#[serde(default)]
pub struct ProfileForm {
    #[validate(custom(function = "validate_required_name"))]
    pub name: String,
    pub email: String,
    #[validate(custom(function = "validate_required_address"))]
    pub address: String,
    #[validate(custom(function = "validate_new_password"))]
    pub password: String,
}

impl ProfileForm {
    pub fn from_user(user: &User) -> Self {
        ProfileForm {
            name: user.name.clone(),
            email: user.email.clone(),
            address: user.address.clone(),
            password: String::new(),
        }
    }

    pub fn check(&self) -> Result<(), Vec<String>> {
        check(self)
    }

    pub fn new_password(&self) -> Option<&str> {
        if self.password.is_empty() {
            None
        } else {
            Some(&self.password)
        }
    }
}
