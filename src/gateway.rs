//! Dataset Gateway: the only component that talks to the network.
//!
//! [`DatasetGateway`] is the seam between the controller and the server. Every operation is a
//! single request/response. Non-2xx responses come back as [`SubTreeError::Rejected`] and
//! transport failures as [`SubTreeError::Network`]; the gateway never swallows either; callers
//! decide what is best-effort.
//!
//! With the `client` feature, [`HttpGateway`] implements the seam over HTTP:
//!
//! | Operation       | Request                                   |
//! |-----------------|-------------------------------------------|
//! | `list_subs`     | `GET /api/subs`                           |
//! | `fetch_tree`    | `GET /api/subs/{name}/tree`               |
//! | `upload`        | `POST /api/upload_excel` (multipart)      |
//! | `patch_node`    | `PATCH /api/subs/{name}/nodes/{id}`       |
//! | `get_session`   | `GET /api/state`                          |
//! | `set_session`   | `POST /api/state`                         |

use async_trait::async_trait;

use crate::{
    error::Result,
    model::{NodeId, NodePatch, SessionState, Tree},
};

#[async_trait]
pub trait DatasetGateway: Send + Sync {
    async fn list_subs(&self) -> Result<Vec<String>>;
    async fn fetch_tree(&self, sub_name: &str) -> Result<Tree>;
    /// Upload a source file; the server ingests it and answers with the resulting tree.
    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<Tree>;
    /// Apply `patch` to one node; the server answers with the full updated tree.
    async fn patch_node(&self, sub_name: &str, id: &NodeId, patch: &NodePatch) -> Result<Tree>;
    async fn get_session(&self) -> Result<SessionState>;
    async fn set_session(&self, state: &SessionState) -> Result<()>;
}

#[cfg(feature = "client")]
pub use http_client::HttpGateway;

#[cfg(feature = "client")]
mod http_client {
    use super::*;
    use crate::error::SubTreeError;
    use reqwest::{multipart, Client, Response};
    use serde::de::DeserializeOwned;
    use std::time::Duration;
    use url::Url;

    /// HTTP implementation of [`DatasetGateway`].
    #[derive(Debug, Clone)]
    pub struct HttpGateway {
        base_url: Url,
        client: Client,
    }

    impl HttpGateway {
        pub fn new(base_url: &str) -> Result<Self> {
            let base_url = Url::parse(base_url)?;
            if base_url.cannot_be_a_base() {
                return Err(SubTreeError::Config(format!(
                    "'{base_url}' cannot be used as a base URL"
                )));
            }
            let client = Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()?;
            Ok(HttpGateway { base_url, client })
        }

        pub fn base_url(&self) -> &Url {
            &self.base_url
        }

        /// Build an endpoint URL. Every segment is percent-encoded.
        pub fn endpoint(&self, segments: &[&str]) -> Url {
            let mut url = self.base_url.clone();
            if let Ok(mut path) = url.path_segments_mut() {
                path.pop_if_empty().extend(segments);
            }
            url
        }

        async fn checked(response: Response) -> Result<Response> {
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
                .unwrap_or(body);
            Err(SubTreeError::Rejected {
                status: status.as_u16(),
                message,
            })
        }

        async fn json<T: DeserializeOwned>(response: Response) -> Result<T> {
            Ok(Self::checked(response).await?.json::<T>().await?)
        }
    }

    #[async_trait]
    impl DatasetGateway for HttpGateway {
        async fn list_subs(&self) -> Result<Vec<String>> {
            let url = self.endpoint(&["api", "subs"]);
            tracing::debug!("[HttpGateway] GET {}", url);
            Self::json(self.client.get(url).send().await?).await
        }

        async fn fetch_tree(&self, sub_name: &str) -> Result<Tree> {
            let url = self.endpoint(&["api", "subs", sub_name, "tree"]);
            tracing::debug!("[HttpGateway] GET {}", url);
            Self::json(self.client.get(url).send().await?).await
        }

        async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<Tree> {
            let url = self.endpoint(&["api", "upload_excel"]);
            tracing::debug!("[HttpGateway] POST {} ({} bytes)", url, bytes.len());
            let part = multipart::Part::bytes(bytes).file_name(filename.to_string());
            let form = multipart::Form::new().part("file", part);
            Self::json(self.client.post(url).multipart(form).send().await?).await
        }

        async fn patch_node(&self, sub_name: &str, id: &NodeId, patch: &NodePatch) -> Result<Tree> {
            let url = self.endpoint(&["api", "subs", sub_name, "nodes", id.as_str()]);
            tracing::debug!("[HttpGateway] PATCH {}", url);
            Self::json(self.client.patch(url).json(patch).send().await?).await
        }

        async fn get_session(&self) -> Result<SessionState> {
            let url = self.endpoint(&["api", "state"]);
            Self::json(self.client.get(url).send().await?).await
        }

        async fn set_session(&self, state: &SessionState) -> Result<()> {
            let url = self.endpoint(&["api", "state"]);
            Self::checked(self.client.post(url).json(state).send().await?).await?;
            Ok(())
        }
    }

}
