use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// Lower-cased extension of `filename` if it is an accepted image type.
pub fn allowed_extension(filename: &str) -> Option<String> {
    let (_stem, extension) = filename.rsplit_once('.')?;
    let extension = extension.to_ascii_lowercase();
    if ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        Some(extension)
    } else {
        None
    }
}

pub fn allowed_file(filename: &str) -> bool {
    allowed_extension(filename).is_some()
}

/// Reduces an uploaded name to ASCII letters, digits, `-`, `_` and `.`,
/// turning whitespace and path separators into `_`.
pub fn secure_filename(filename: &str) -> String {
    let cleaned: String = filename
        .split(|c: char| c.is_whitespace() || c == '/' || c == '\\')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(*c, '-' | '_' | '.'))
        .collect();
    cleaned.trim_matches(|c: char| c == '.' || c == '_').to_owned()
}

/// `<uuid>_<stem>.<ext>`, or `<uuid>.<ext>` when nothing of the stem survives.
pub fn unique_filename(filename: &str) -> Option<String> {
    let extension = allowed_extension(filename)?;
    let (stem, _) = filename.rsplit_once('.')?;
    let stem = secure_filename(stem);
    let prefix = uuid::Uuid::new_v4().simple().to_string();
    Some(if stem.is_empty() {
        format!("{}.{}", prefix, extension)
    } else {
        format!("{}_{}.{}", prefix, stem, extension)
    })
}

pub fn content_type(filename: &str) -> &'static str {
    match allowed_extension(filename).as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

pub struct AvatarStore {
    dir: PathBuf,
}

impl AvatarStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        AvatarStore { dir: dir.into() }
    }

    /// Location of a stored avatar. Names that are not a plain file name are refused.
    pub fn path(&self, filename: &str) -> Option<PathBuf> {
        if filename.is_empty()
            || filename.starts_with('.')
            || filename.contains(|c: char| c == '/' || c == '\\')
        {
            return None;
        }
        Some(self.dir.join(filename))
    }

    /// Stores the file at `source` as the new avatar and removes `previous`.
    /// Returns the generated file name, or `None` if `original_name` does not
    /// carry an allowed extension, in which case nothing is touched.
    pub fn replace(
        &self,
        previous: Option<&str>,
        original_name: &str,
        source: &Path,
    ) -> io::Result<Option<String>> {
        let filename = match unique_filename(original_name) {
            Some(filename) => filename,
            None => return Ok(None),
        };
        if let Some(old_path) = previous.and_then(|previous| self.path(previous)) {
            match fs::remove_file(&old_path) {
                Ok(()) => debug!("Removed old avatar {}", old_path.display()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err),
            }
        }
        fs::create_dir_all(&self.dir)?;
        fs::copy(source, self.dir.join(&filename))?;
        Ok(Some(filename))
    }

    pub fn read(&self, filename: &str) -> io::Result<Vec<u8>> {
        let path = self
            .path(filename)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "invalid avatar name"))?;
        fs::read(path)
    }
}
