//! Files uploaded with a request, as handed over by the transport.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use once_cell::unsync::OnceCell;
use tracing::{debug, warn};

use crate::protocol::mime_table;

/// Outcome the transport reported for one uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadError {
    Ok,
    ExceedsServerLimit,
    ExceedsFormLimit,
    Partial,
    NoFile,
    NoTempDir,
    CantWrite,
    Extension,
    Unknown(i32),
}

impl UploadError {
    /// Maps the numeric upload error codes used by common upload front ends.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::ExceedsServerLimit,
            2 => Self::ExceedsFormLimit,
            3 => Self::Partial,
            4 => Self::NoFile,
            6 => Self::NoTempDir,
            7 => Self::CantWrite,
            8 => Self::Extension,
            other => Self::Unknown(other),
        }
    }

    /// Operator-facing description; not meant for end users.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Ok => "there is no error, the file uploaded with success",
            Self::ExceedsServerLimit => "the uploaded file exceeds the server upload size limit",
            Self::ExceedsFormLimit => "the uploaded file exceeds the size limit specified in the form",
            Self::Partial => "the uploaded file was only partially uploaded",
            Self::NoFile => "no file was uploaded",
            Self::NoTempDir => "missing a temporary folder",
            Self::CantWrite => "failed to write file to disk",
            Self::Extension => "an extension stopped the file upload",
            Self::Unknown(_) => "unknown error",
        }
    }
}

/// Descriptor of one uploaded file sitting in temporary storage.
///
/// Name, type and extension come from the client and are not trustworthy.
#[derive(Debug)]
pub struct UploadedFile {
    name: String,
    client_type: String,
    tmp_path: PathBuf,
    error: UploadError,
    size: u64,
    destination: Option<PathBuf>,
    extension: OnceCell<String>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, client_type: impl Into<String>, tmp_path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            name: name.into(),
            client_type: client_type.into(),
            tmp_path: tmp_path.into(),
            error: UploadError::Ok,
            size,
            destination: None,
            extension: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn with_error(mut self, error: UploadError) -> Self {
        self.error = error;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client_type(&self) -> &str {
        &self.client_type
    }

    /// Extension of the client supplied file name, without the dot.
    pub fn client_extension(&self) -> &str {
        Path::new(&self.name).extension().and_then(|ext| ext.to_str()).unwrap_or_default()
    }

    /// Extension matching the declared media type.
    ///
    /// The client extension wins when it is registered for the media type, otherwise
    /// the canonical extension of that type is used; empty for unknown types.
    pub fn extension(&self) -> &str {
        self.extension.get_or_init(|| {
            let registered = mime_table::extensions_for(&self.client_type);
            let client = self.client_extension().to_ascii_lowercase();
            if registered.contains(&client.as_str()) {
                client
            } else {
                registered.first().map(|ext| (*ext).to_string()).unwrap_or_default()
            }
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }

    pub fn error(&self) -> UploadError {
        self.error
    }

    pub fn destination(&self) -> Option<&Path> {
        self.destination.as_deref()
    }

    pub fn is_moved(&self) -> bool {
        self.destination.is_some()
    }

    /// True when the transport reported success and the temporary file is present.
    pub fn is_valid(&self) -> bool {
        self.error == UploadError::Ok && self.tmp_path.is_file()
    }

    /// Moves the file to `destination`.
    ///
    /// Returns `false`, leaving every file untouched, when `destination` exists and
    /// `overwrite` is off, or when the upload is not valid. Once moved, a further call
    /// renames the already moved file.
    pub fn move_to(&mut self, destination: impl AsRef<Path>, overwrite: bool) -> bool {
        let destination = destination.as_ref();
        if !overwrite && destination.exists() {
            debug!(destination = %destination.display(), "upload destination exists, refusing to overwrite");
            return false;
        }

        let source = match &self.destination {
            Some(moved) => moved.clone(),
            None if self.is_valid() => self.tmp_path.clone(),
            None => {
                warn!(tmp_path = %self.tmp_path.display(), error = ?self.error, "refusing to move invalid upload");
                return false;
            }
        };

        match move_file(&source, destination) {
            Ok(()) => {
                self.destination = Some(destination.to_path_buf());
                true
            }
            Err(e) => {
                warn!(cause = %e, source = %source.display(), destination = %destination.display(), "failed to move upload");
                false
            }
        }
    }
}

fn move_file(source: &Path, destination: &Path) -> io::Result<()> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        // rename cannot cross filesystems, fall back to copy and delete
        Err(_) if source.is_file() => {
            fs::copy(source, destination)?;
            fs::remove_file(source)
        }
        Err(e) => Err(e),
    }
}
