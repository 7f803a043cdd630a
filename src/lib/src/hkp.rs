//! Key retrieval over the HTTP Keyserver Protocol (HKP).
//!
//! A partial client: it only supports the `op=get` lookup that returns
//! key material for a key id. See the HKP draft,
//! <https://tools.ietf.org/html/draft-shaw-openpgp-hkp-00>.

use std::time::Duration;

use log::*;

use crate::error::*;
use crate::pgp::{self, KeyRing};

/// Resolves a more specific network location for a key server host, in
/// the way an `_hkp._tcp` SRV record would. Injected where available; the
/// client uses server URLs verbatim without one.
pub trait SrvResolver: Send + Sync {
    fn resolve(&self, host: &str) -> Option<(String, u16)>;
}

/// HKP lookup client.
pub struct KeyClient {
    agent: ureq::Agent,
    resolver: Option<Box<dyn SrvResolver>>,
}

impl KeyClient {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            agent,
            resolver: None,
        }
    }

    /// Attach a service discovery resolver.
    pub fn with_resolver(mut self, resolver: Box<dyn SrvResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Look up key material for `key_id`, trying each server in order and
    /// stopping at the first that answers with parseable key rings.
    ///
    /// Exhausting the list is a missed opportunity to augment the trust
    /// store, not an error.
    pub fn retrieve(&self, key_id: &str, key_servers: &[String]) -> Option<Vec<KeyRing>> {
        for server in key_servers {
            let base = self.rebase(server);
            let url = format!("{}/pks/lookup?op=get&search={}", base, key_id);
            debug!("Looking up key {} at {}", key_id, url);
            match self.lookup(&url) {
                Ok(rings) if !rings.is_empty() => {
                    debug!("Key server {} returned {} key ring(s)", server, rings.len());
                    return Some(rings);
                }
                Ok(_) => debug!("Key server {} returned no key rings", server),
                Err(e) => debug!("Key lookup at {} failed: {}", server, e),
            }
        }
        warn!("Key {} was not found on any configured key server", key_id);
        None
    }

    fn lookup(&self, url: &str) -> Result<Vec<KeyRing>, SyncError> {
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| SyncError::Network(format!("{}: {}", url, e)))?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(SyncError::HttpStatus(status, url.to_string()));
        }
        let mut reader = response.into_body().into_reader();
        pgp::read_keyrings(&mut reader)
    }

    /// Swap the authority part of a server URL for the resolver's answer,
    /// keeping the scheme.
    fn rebase(&self, server: &str) -> String {
        let server = server.trim_end_matches('/');
        let Some(resolver) = &self.resolver else {
            return server.to_string();
        };
        let Some((scheme, rest)) = server.split_once("://") else {
            return server.to_string();
        };
        let authority = rest.split('/').next().unwrap_or(rest);
        let host = authority.split(':').next().unwrap_or(authority);
        match resolver.resolve(host) {
            Some((resolved_host, port)) => format!("{}://{}:{}", scheme, resolved_host, port),
            None => server.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticResolver;

    impl SrvResolver for StaticResolver {
        fn resolve(&self, host: &str) -> Option<(String, u16)> {
            (host == "keys.example.com").then(|| ("pool.example.com".to_string(), 11371))
        }
    }

    #[test]
    fn test_rebase_without_resolver() {
        let client = KeyClient::new(Duration::from_millis(100));
        assert_eq!(
            client.rebase("https://keys.example.com/"),
            "https://keys.example.com"
        );
    }

    #[test]
    fn test_rebase_with_resolver() {
        let client =
            KeyClient::new(Duration::from_millis(100)).with_resolver(Box::new(StaticResolver));
        assert_eq!(
            client.rebase("https://keys.example.com"),
            "https://pool.example.com:11371"
        );
        // Unresolved hosts keep the configured URL
        assert_eq!(
            client.rebase("http://other.example.com:8080"),
            "http://other.example.com:8080"
        );
    }

    #[test]
    fn test_retrieve_all_servers_down() {
        let client = KeyClient::new(Duration::from_millis(100));
        let servers = vec![
            "http://127.0.0.1:9".to_string(),
            "http://127.0.0.1:10".to_string(),
        ];
        assert!(client.retrieve("0x1234", &servers).is_none());
    }

    #[test]
    fn test_retrieve_no_servers() {
        let client = KeyClient::new(Duration::from_millis(100));
        assert!(client.retrieve("0x1234", &[]).is_none());
    }
}
