use super::{Handler, HandlerBuilder};
use crate::Result;

/// Pass-through handler
pub struct Stub;

impl HandlerBuilder for Stub {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn description(&self) -> &'static str {
        "Do nothing, pass through"
    }

    fn build(&self, _options: &str) -> Result<Box<dyn Handler>> {
        Ok(Box::new(Stub))
    }
}

impl Handler for Stub {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn process(&mut self, buf: &[u8], _decode: bool) -> Result<Vec<u8>> {
        Ok(buf.to_vec())
    }
}
