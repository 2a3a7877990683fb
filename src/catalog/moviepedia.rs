//! Moviepedia catalog client.

use std::time::Duration;

use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::catalog::{
    CatalogError, IdentifyRequest, IdentifyResult, MediaCast, MediaResolverApi, ResolverMedia,
};
use crate::config::CatalogConfig;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<ResolverMedia>,
}

/// Moviepedia client backed by `ureq`.
pub struct MoviepediaClient {
    http_client: ureq::Agent,
    base_url: String,
}

impl MoviepediaClient {
    pub fn new(config: &CatalogConfig) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(config.connect_timeout_secs))
            .timeout_read(Duration::from_secs(config.read_timeout_secs))
            .timeout_write(Duration::from_secs(config.read_timeout_secs))
            .user_agent(concat!("moviepedia/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            http_client,
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn read_response<T: DeserializeOwned>(
        result: Result<ureq::Response, ureq::Error>,
        what: &str,
    ) -> Result<T, CatalogError> {
        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                return Err(CatalogError::Status { status, body });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(CatalogError::Transport(format!("{what}: {transport}")));
            }
        };
        response
            .into_json()
            .map_err(|err| CatalogError::Decode(format!("{what}: {err}")))
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, CatalogError> {
        let url = self.url(path);
        debug!("Catalog GET {}", url);
        Self::read_response(
            self.http_client
                .get(&url)
                .set("Accept", "application/json")
                .call(),
            path,
        )
    }
}

impl MediaResolverApi for MoviepediaClient {
    fn search(&self, query: &str) -> Result<Vec<ResolverMedia>, CatalogError> {
        let response: SearchResponse =
            self.get_json(&format!("search?query={}", urlencoding::encode(query)))?;
        Ok(response.results)
    }

    fn search_media_batch(
        &self,
        requests: &[IdentifyRequest],
    ) -> Result<Vec<IdentifyResult>, CatalogError> {
        let url = self.url("search-media/identify");
        debug!("Catalog POST {} ({} media)", url, requests.len());
        Self::read_response(
            self.http_client
                .post(&url)
                .set("Accept", "application/json")
                .send_json(requests),
            "search-media/identify",
        )
    }

    fn get_media(&self, media_id: &str) -> Result<ResolverMedia, CatalogError> {
        self.get_json(&format!("media/{}", urlencoding::encode(media_id)))
    }

    fn get_media_cast(&self, media_id: &str) -> Result<MediaCast, CatalogError> {
        self.get_json(&format!("media/{}/cast", urlencoding::encode(media_id)))
    }
}
