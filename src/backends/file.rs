use crate::backend::Backend;
use crate::errors::BackendError;
use std::fs::File;
use std::io::{BufRead, BufReader};

/// Reads the first line of the file named by the locator
///
/// The line terminator is stripped. An empty file has no first line and is
/// reported as [`BackendError::NotFound`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FileBackend;

impl Backend for FileBackend {
    fn clone_box(&self) -> Box<dyn Backend> {
        Box::new(FileBackend)
    }

    fn resolve(&mut self, locator: &str) -> Result<String, BackendError> {
        if locator.is_empty() {
            return Err(BackendError::InvalidLocator("file path is empty".to_string()));
        }

        let file = File::open(locator)
            .map_err(|e| BackendError::Io(format!("unable to open {}: {}", locator, e)))?;

        let mut line = String::new();
        let read = BufReader::new(file).read_line(&mut line)?;
        if read == 0 {
            return Err(BackendError::NotFound(format!("{} is empty", locator)));
        }

        let trimmed = line.trim_end_matches('\n').trim_end_matches('\r');
        Ok(trimmed.to_string())
    }
}
