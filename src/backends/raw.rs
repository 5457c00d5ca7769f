use crate::backend::Backend;
use crate::errors::BackendError;

/// Identity backend: the locator is the value
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBackend;

impl Backend for RawBackend {
    fn clone_box(&self) -> Box<dyn Backend> {
        Box::new(RawBackend)
    }

    fn resolve(&mut self, locator: &str) -> Result<String, BackendError> {
        Ok(locator.to_string())
    }
}
