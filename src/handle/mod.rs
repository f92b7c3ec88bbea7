//! Handlers: byte transforms applied between input and output connectors
//!
//! A handler encodes on the way into the tunnel and decodes on the way out.
//! Handlers keep state across calls (partial base blocks, partial cipher
//! frames), so every direction of a relay builds its own [`HandlerChain`].

pub mod base;
pub mod cipher;
pub mod stub;

use std::collections::BTreeMap;

use crate::{PulsarError, Result};

/// Separator between handler name and options
pub const OPTION_SEPARATOR: char = ':';

/// A configured transform
pub trait Handler: Send {
    fn name(&self) -> &'static str;

    /// Encode `buf`, or decode it when `decode` is set
    ///
    /// Decoders may hold back incomplete input and return an empty buffer
    /// until the rest arrives.
    fn process(&mut self, buf: &[u8], decode: bool) -> Result<Vec<u8>>;
}

/// Registered handler kind, builds configured handlers
pub trait HandlerBuilder: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn build(&self, options: &str) -> Result<Box<dyn Handler>>;
}

/// Ordered handlers applied to every buffer
#[derive(Default)]
pub struct HandlerChain {
    handlers: Vec<Box<dyn Handler>>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handler: Box<dyn Handler>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run `buf` through every handler in order
    ///
    /// Stops early with an empty buffer as soon as a handler produces none.
    pub fn process(&mut self, mut buf: Vec<u8>, decode: bool) -> Result<Vec<u8>> {
        for handler in &mut self.handlers {
            buf = handler.process(&buf, decode)?;
            if buf.is_empty() {
                log::trace!("Handler {} holds back its output", handler.name());
                break;
            }
        }
        Ok(buf)
    }
}

/// Handler kinds by name
#[derive(Default)]
pub struct HandlerRegistry {
    builders: BTreeMap<&'static str, Box<dyn HandlerBuilder>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding stub, base32, base64 and cipher
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let builtins: Vec<Box<dyn HandlerBuilder>> = vec![
            Box::new(stub::Stub),
            Box::new(base::Base::Base32),
            Box::new(base::Base::Base64),
            Box::new(cipher::Cipher),
        ];
        for builder in builtins {
            let registered = registry.register(builder);
            debug_assert!(registered.is_ok(), "built-in names are distinct");
        }
        registry
    }

    /// Add a handler kind, refusing to replace an existing name
    pub fn register(&mut self, builder: Box<dyn HandlerBuilder>) -> Result<()> {
        let name = builder.name();
        if self.builders.contains_key(name) {
            return Err(PulsarError::DuplicateName(format!("handler {}", name)));
        }
        self.builders.insert(name, builder);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn HandlerBuilder> {
        self.builders.get(name).map(|b| b.as_ref())
    }

    /// Registered handler kinds, sorted by name
    pub fn iter(&self) -> impl Iterator<Item = &dyn HandlerBuilder> {
        self.builders.values().map(|b| b.as_ref())
    }

    /// Build a chain from `name[:options]` entries
    pub fn make_chain<S: AsRef<str>>(&self, specs: &[S]) -> Result<HandlerChain> {
        let mut chain = HandlerChain::new();
        for spec in specs {
            let (name, options) = split_handler_options(spec.as_ref());
            let builder = self
                .get(name)
                .ok_or_else(|| PulsarError::UnknownHandler(name.to_string()))?;
            chain.push(builder.build(options)?);
        }
        Ok(chain)
    }
}

/// Split `name[:options]` at the first separator
pub fn split_handler_options(spec: &str) -> (&str, &str) {
    spec.split_once(OPTION_SEPARATOR).unwrap_or((spec, ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_handler_options() {
        assert_eq!(split_handler_options("base32"), ("base32", ""));
        assert_eq!(split_handler_options("cipher:aes#k:ey"), ("cipher", "aes#k:ey"));
    }

    #[test]
    fn test_unknown_handler() {
        let registry = HandlerRegistry::with_builtins();
        let err = registry.make_chain(&["base32", "rot13"]).err();
        assert_eq!(
            err.map(|e| e.to_string()),
            Some("Handler rot13 does not exist".to_string())
        );
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = HandlerRegistry::with_builtins();
        assert!(matches!(
            registry.register(Box::new(stub::Stub)),
            Err(PulsarError::DuplicateName(_))
        ));
        assert_eq!(registry.iter().count(), 4);
    }

    #[test]
    fn test_chain_roundtrip() {
        let registry = HandlerRegistry::with_builtins();
        let specs = ["base64", "cipher:chacha#secret", "base32"];
        let mut encoder = registry.make_chain(&specs).unwrap();
        assert_eq!(encoder.len(), 3);

        let mut decoder = HandlerChain::new();
        for spec in specs.iter().rev() {
            let (name, options) = split_handler_options(spec);
            decoder.push(registry.get(name).unwrap().build(options).unwrap());
        }

        let plain = b"attack at dawn".to_vec();
        let wire = encoder.process(plain.clone(), false).unwrap();
        assert_ne!(wire, plain);
        assert_eq!(decoder.process(wire, true).unwrap(), plain);
    }

    #[test]
    fn test_empty_output_short_circuits() {
        let registry = HandlerRegistry::with_builtins();
        let mut chain = registry.make_chain(&["base32", "stub"]).unwrap();

        // half a base32 block is held back
        assert!(chain.process(b"MFRG".to_vec(), true).unwrap().is_empty());
        assert_eq!(chain.process(b"GZDF".to_vec(), true).unwrap(), b"abcde");
    }

    #[test]
    fn test_empty_chain_passes_through() {
        let mut chain = HandlerChain::new();
        assert!(chain.is_empty());
        assert_eq!(chain.process(b"as is".to_vec(), false).unwrap(), b"as is");
    }
}
