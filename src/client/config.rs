//! Client configuration

use std::time::Duration;

use url::Url;

use crate::error::Result;

/// Client configuration options
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server URL (`ws://host:port`)
    pub url: String,

    /// Identity to reconnect under; server-assigned when absent
    pub client_id: Option<String>,

    /// Display name; server-generated when absent
    pub display_name: Option<String>,

    /// How long to wait for a response before a request fails
    pub request_timeout: Duration,

    /// Depth of the push-event queue handed to the caller
    pub event_buffer: usize,
}

impl ClientConfig {
    /// Create a new config for the given server URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client_id: None,
            display_name: None,
            request_timeout: Duration::from_secs(10),
            event_buffer: 64,
        }
    }

    /// Reconnect under a previously assigned identity
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    /// Set the display name announced to other participants
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Set the per-request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the push-event queue depth
    pub fn event_buffer(mut self, depth: usize) -> Self {
        self.event_buffer = depth.max(1);
        self
    }

    /// Build the connect URL with identity query parameters attached
    pub fn connect_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.url)?;
        // Borrowing query_pairs_mut writes a `?` even when nothing is
        // appended, so skip it entirely for an anonymous connect.
        if self.client_id.is_some() || self.display_name.is_some() {
            let mut pairs = url.query_pairs_mut();
            if let Some(ref id) = self.client_id {
                pairs.append_pair("id", id);
            }
            if let Some(ref name) = self.display_name {
                pairs.append_pair("name", name);
            }
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_url_without_identity() {
        let config = ClientConfig::new("ws://127.0.0.1:4000");
        let url = config.connect_url().unwrap();

        assert_eq!(url.query(), None);
    }

    #[test]
    fn test_connect_url_with_name_only() {
        let config = ClientConfig::new("ws://127.0.0.1:4000").display_name("Ada");
        let url = config.connect_url().unwrap();

        assert_eq!(url.query(), Some("name=Ada"));
    }

    #[test]
    fn test_connect_url_appends_identity() {
        let config = ClientConfig::new("ws://127.0.0.1:4000")
            .client_id("peer-1")
            .display_name("Jane Doe");
        let url = config.connect_url().unwrap();

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("id".to_string(), "peer-1".to_string())));
        assert!(pairs.contains(&("name".to_string(), "Jane Doe".to_string())));
    }

    #[test]
    fn test_connect_url_rejects_garbage() {
        let config = ClientConfig::new("not a url");

        assert!(config.connect_url().is_err());
    }

    #[test]
    fn test_builder_chaining() {
        let config = ClientConfig::new("ws://localhost:4000")
            .request_timeout(Duration::from_secs(2))
            .event_buffer(8);

        assert_eq!(config.request_timeout, Duration::from_secs(2));
        assert_eq!(config.event_buffer, 8);
    }
}
