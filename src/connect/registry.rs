//! Connector registry

use std::collections::BTreeMap;
use std::sync::Arc;

use super::console::Console;
use super::dns::Dns;
#[cfg(unix)]
use super::icmp::Icmp;
use super::tcp::Tcp;
use super::udp::Udp;
use super::{Connector, Transport};
use crate::{PulsarError, Result};

/// Separator between connector name and address
pub const ADDRESS_SEPARATOR: char = ':';

/// Transports by name
#[derive(Default)]
pub struct ConnectorRegistry {
    transports: BTreeMap<&'static str, Box<dyn Transport>>,
}

impl ConnectorRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding console, tcp, udp, icmp and dns
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let mut builtins: Vec<Box<dyn Transport>> =
            vec![Box::new(Console), Box::new(Tcp), Box::new(Udp), Box::new(Dns)];
        #[cfg(unix)]
        builtins.push(Box::new(Icmp));

        for transport in builtins {
            let registered = registry.register(transport);
            debug_assert!(registered.is_ok(), "built-in names are distinct");
        }
        registry
    }

    /// Add a transport, refusing to replace an existing name
    pub fn register(&mut self, transport: Box<dyn Transport>) -> Result<()> {
        let name = transport.name();
        if self.transports.contains_key(name) {
            return Err(PulsarError::DuplicateName(format!("connector {}", name)));
        }
        self.transports.insert(name, transport);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Transport> {
        self.transports.get(name).map(|t| t.as_ref())
    }

    /// Registered transports, sorted by name
    pub fn iter(&self) -> impl Iterator<Item = &dyn Transport> {
        self.transports.values().map(|t| t.as_ref())
    }

    /// Connect from a `name[:address]` string
    pub async fn make_connect(
        &self,
        spec: &str,
        listen: bool,
        plain: bool,
    ) -> Result<Arc<dyn Connector>> {
        let (name, address) = split_connector_spec(spec);
        let transport = self
            .get(name)
            .ok_or_else(|| PulsarError::UnknownConnector(name.to_string()))?;

        log::debug!(
            "Connecting {} (address: {:?}, listen: {}, plain: {})",
            name,
            address,
            listen,
            plain
        );
        transport.connect(listen, plain, address).await
    }
}

/// Split `name[:address]` at the first separator
pub fn split_connector_spec(spec: &str) -> (&str, &str) {
    spec.split_once(ADDRESS_SEPARATOR).unwrap_or((spec, ""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connect::console::Console;

    #[test]
    fn test_split_connector_spec() {
        assert_eq!(split_connector_spec("console"), ("console", ""));
        assert_eq!(
            split_connector_spec("udp:127.0.0.1:9000"),
            ("udp", "127.0.0.1:9000")
        );
        assert_eq!(
            split_connector_spec("dns:t.example.com@10.0.0.1:53"),
            ("dns", "t.example.com@10.0.0.1:53")
        );
    }

    #[test]
    fn test_builtins() {
        let registry = ConnectorRegistry::with_builtins();
        let names: Vec<_> = registry.iter().map(|t| t.name()).collect();

        assert!(names.contains(&"console"));
        assert!(names.contains(&"dns"));
        assert!(names.contains(&"tcp"));
        assert!(names.contains(&"udp"));
        #[cfg(unix)]
        assert!(names.contains(&"icmp"));
        assert!(registry.iter().all(|t| !t.description().is_empty()));
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = ConnectorRegistry::with_builtins();
        let err = registry.register(Box::new(Console)).unwrap_err();
        assert_eq!(err.to_string(), "connector console already exists");
    }

    #[tokio::test]
    async fn test_unknown_connector() {
        let registry = ConnectorRegistry::with_builtins();
        let err = registry.make_connect("carrier-pigeon:1.2.3.4", false, false).await;
        assert!(matches!(err, Err(PulsarError::UnknownConnector(name)) if name == "carrier-pigeon"));
    }

    #[tokio::test]
    async fn test_make_connect_udp() {
        let registry = ConnectorRegistry::with_builtins();
        let connector = registry
            .make_connect("udp:127.0.0.1:0", true, false)
            .await
            .unwrap();
        assert_eq!(connector.name(), "udp");
        assert!(registry.make_connect("udp:nowhere", true, false).await.is_err());
    }
}
