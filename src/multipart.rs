//! Temporary storage left behind by a parsed multipart form.

use std::{fs, io, path::PathBuf};
use tracing::{debug, warn};

/// Request extension listing the files a multipart parser spilled to disk.
///
/// The access logger calls [`MultipartForm::remove_all`] once the handler is
/// done with the request.
#[derive(Clone, Debug, Default)]
pub struct MultipartForm {
    files: Vec<PathBuf>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track another temporary file.
    pub fn push(&mut self, path: impl Into<PathBuf>) {
        self.files.push(path.into());
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Delete every tracked file.
    ///
    /// Files that are already gone are skipped. All files are attempted; the
    /// first other error is returned.
    pub fn remove_all(&self) -> io::Result<()> {
        let mut first_error = None;
        for path in &self.files {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "Removed multipart temp file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl FromIterator<PathBuf> for MultipartForm {
    fn from_iter<I: IntoIterator<Item = PathBuf>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

/// Release a form's storage, logging rather than returning failures.
pub(crate) fn release(form: &MultipartForm) {
    if let Err(e) = form.remove_all() {
        warn!(error = %e, files = form.files().len(), "Failed to remove multipart temp files");
    }
}
