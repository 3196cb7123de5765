use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;
use reqwest::{Client, Url};

use crate::{error::HubdlError, fs_utils};

/// Index host used when none is configured.
pub const DEFAULT_BASE_URL: &str = "https://huggingface.co";

/// Hrefs carrying this marker point at downloadable files rather than
/// navigation links within the listing.
const RESOURCE_LINK_MARKER: &str = "/resolve/main/";

static HREF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"href\s*=\s*"([^"]+)""#).unwrap());

/// One downloadable file within a collection. Produced by [`Lister::list`],
/// consumed once by the downloader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    locator: Url,
    display_name: String,
}

impl Resource {
    pub fn new(locator: Url) -> Self {
        let display_name = infer_display_name(&locator);
        Self {
            locator,
            display_name,
        }
    }

    pub fn locator(&self) -> &Url {
        &self.locator
    }

    /// File name this resource is saved under, derived from the last path
    /// segment of the locator.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

fn infer_display_name(locator: &Url) -> String {
    if let Some(name) = locator
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
    {
        let decoded = percent_decode_str(name)
            .decode_utf8()
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| name.to_string());
        return fs_utils::cleanup_filename(&decoded);
    }
    "download".to_string()
}

/// Scrapes a collection's index page for downloadable resource links.
pub struct Lister {
    client: Client,
    base_url: Url,
}

impl Lister {
    pub fn new(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// Lists the collection's resources in document order. Duplicate links
    /// are kept as-is, mirroring the source listing. A single best-effort
    /// attempt; any fetch failure is reported as [`HubdlError::Retrieval`]
    /// and retrying is up to the caller.
    pub async fn list(&self, collection: &str) -> Result<Vec<Resource>, HubdlError> {
        let index_url = self.index_url(collection)?;
        let document = self
            .fetch_index(&index_url)
            .await
            .map_err(|source| HubdlError::Retrieval {
                url: index_url.to_string(),
                source: Box::new(source),
            })?;
        Ok(self.extract_resources(&document))
    }

    fn index_url(&self, collection: &str) -> Result<Url, HubdlError> {
        let collection = collection.trim_end_matches('/');
        if collection.is_empty() {
            return Err(HubdlError::EmptyCollection);
        }
        let joined = format!(
            "{}/{}/tree/main",
            self.base_url.as_str().trim_end_matches('/'),
            collection
        );
        Url::parse(&joined).map_err(|e| HubdlError::InvalidUrl {
            message: e.to_string(),
        })
    }

    async fn fetch_index(&self, url: &Url) -> Result<String, HubdlError> {
        let resp = self.client.get(url.clone()).send().await?;
        if !resp.status().is_success() {
            return Err(HubdlError::ResponseStatusNotSuccess {
                status_code: resp.status().to_string(),
            });
        }
        Ok(resp.text().await?)
    }

    fn extract_resources(&self, document: &str) -> Vec<Resource> {
        let mut resources = Vec::new();
        for caps in HREF_RE.captures_iter(document) {
            let href = &caps[1];
            if !href.contains(RESOURCE_LINK_MARKER) {
                continue;
            }
            let locator = match Url::parse(href) {
                Ok(absolute) => absolute,
                Err(_) => match self.base_url.join(href) {
                    Ok(joined) => joined,
                    Err(_) => continue,
                },
            };
            resources.push(Resource::new(locator));
        }
        resources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn lister_for(base: &str) -> Lister {
        Lister::new(Client::new(), Url::parse(base).unwrap())
    }

    #[tokio::test]
    async fn test_list_extracts_resource_links_in_document_order() {
        let mut server = Server::new_async().await;
        let body = r#"<html><body>
            <a href="/org/model/tree/main/subdir">subdir</a>
            <a href="/org/model/resolve/main/config.json">config.json</a>
            <a href="/org/model/blame/main/README.md">blame</a>
            <a href="/org/model/resolve/main/weights.bin?download=true">weights.bin</a>
            <a href="/org/model/resolve/main/config.json">config.json again</a>
        </body></html>"#;
        let index_mock = server
            .mock("GET", "/org/model/tree/main")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let lister = lister_for(&server.url());
        let resources = lister.list("org/model").await.unwrap();

        let names: Vec<&str> = resources.iter().map(|r| r.display_name()).collect();
        assert_eq!(names, vec!["config.json", "weights.bin", "config.json"]);
        assert_eq!(
            resources[0].locator().as_str(),
            format!("{}/org/model/resolve/main/config.json", server.url())
        );
        index_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_strips_trailing_separator() {
        let mut server = Server::new_async().await;
        let index_mock = server
            .mock("GET", "/org/model/tree/main")
            .with_status(200)
            .with_body(r#"<a href="/org/model/resolve/main/a.bin">a</a>"#)
            .create_async()
            .await;

        let lister = lister_for(&server.url());
        let resources = lister.list("org/model/").await.unwrap();

        assert_eq!(resources.len(), 1);
        index_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_decodes_percent_encoded_names() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/org/model/tree/main")
            .with_status(200)
            .with_body(r#"<a href="/org/model/resolve/main/hello%20world.txt">x</a>"#)
            .create_async()
            .await;

        let lister = lister_for(&server.url());
        let resources = lister.list("org/model").await.unwrap();

        assert_eq!(resources[0].display_name(), "hello world.txt");
    }

    #[tokio::test]
    async fn test_list_keeps_absolute_links() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/org/model/tree/main")
            .with_status(200)
            .with_body(r#"<a href="https://cdn.example.com/org/model/resolve/main/big.bin">x</a>"#)
            .create_async()
            .await;

        let lister = lister_for(&server.url());
        let resources = lister.list("org/model").await.unwrap();

        assert_eq!(
            resources[0].locator().as_str(),
            "https://cdn.example.com/org/model/resolve/main/big.bin"
        );
    }

    #[tokio::test]
    async fn test_list_fails_on_non_success_status() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/org/missing/tree/main")
            .with_status(404)
            .create_async()
            .await;

        let lister = lister_for(&server.url());
        let result = lister.list("org/missing").await;

        assert!(matches!(result, Err(HubdlError::Retrieval { .. })));
    }

    #[tokio::test]
    async fn test_list_rejects_empty_collection() {
        let lister = lister_for("http://localhost:1");
        assert!(matches!(
            lister.list("").await,
            Err(HubdlError::EmptyCollection)
        ));
        assert!(matches!(
            lister.list("///").await,
            Err(HubdlError::EmptyCollection)
        ));
    }
}
