//! Blocking Batch REST client.
//!
//! Every call is a single synchronous HTTP request against the account URL
//! (`https://{account}.{region}.batch.azure.com`). List calls follow
//! `odata.nextLink` until the last page.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::credentials::ServicePrincipalCredentials;
use crate::error::{BatchError, BatchResult, ErrorDetail};
use crate::models::*;
use crate::service::BatchService;

/// Batch REST API version the request shapes in `models` follow.
pub const API_VERSION: &str = "2023-05-01.17.0";

const ODATA_JSON: &str = "application/json; odata=minimalmetadata";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// One page of a list response.
#[derive(Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Deserialize)]
struct ErrorMessage {
    #[serde(default)]
    value: String,
}

/// Error body returned by the Batch service.
#[derive(Deserialize)]
struct ErrorBody {
    code: String,
    message: Option<ErrorMessage>,
    #[serde(default)]
    values: Vec<ErrorDetail>,
}

/// [`BatchService`] over the Batch REST API.
pub struct RestBatchClient {
    http: Client,
    base_url: Url,
    credentials: ServicePrincipalCredentials,
}

impl RestBatchClient {
    /// Create a client for the account at `base_url`.
    pub fn new(base_url: &str, credentials: ServicePrincipalCredentials) -> BatchResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| BatchError::Transport(format!("invalid account URL {base_url}: {e}")))?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BatchError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            credentials,
        })
    }

    /// Request URL for a resource path. Each segment is percent-encoded.
    fn url(&self, segments: &[&str]) -> BatchResult<String> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                BatchError::Transport(format!("account URL {} cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut().append_pair("api-version", API_VERSION);
        Ok(url.into())
    }

    /// Attach auth and the content type, send, and turn non-2xx answers
    /// into [`BatchError::Service`].
    fn send(&self, request: RequestBuilder) -> BatchResult<Response> {
        let token = self.credentials.token(&self.http)?;
        let resp = request
            .bearer_auth(token)
            .header(CONTENT_TYPE, ODATA_JSON)
            .send()
            .map_err(|e| BatchError::Transport(e.to_string()))?;

        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(service_error(resp))
        }
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> BatchResult<T> {
        let resp = self.send(self.http.get(url))?;
        resp.json().map_err(|e| BatchError::Decode(e.to_string()))
    }

    fn list<T: DeserializeOwned>(&self, path: &[&str]) -> BatchResult<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(self.url(path)?);
        while let Some(url) = next {
            let page: Page<T> = self.get_json(&url)?;
            items.extend(page.value);
            next = page.next_link;
        }
        debug!(path = %path.join("/"), count = items.len(), "listed batch resources");
        Ok(items)
    }

    fn post<B: serde::Serialize + ?Sized>(&self, path: &[&str], body: &B) -> BatchResult<()> {
        // `send` sets the content type; `RequestBuilder::json` would add a second one.
        let body = serde_json::to_vec(body).map_err(|e| BatchError::Encode(e.to_string()))?;
        self.send(self.http.post(self.url(path)?).body(body))?;
        Ok(())
    }

    fn post_empty(&self, path: &[&str]) -> BatchResult<()> {
        // The service requires an explicit zero-length body on action calls.
        self.send(self.http.post(self.url(path)?).body(Vec::new()))?;
        Ok(())
    }

    fn delete(&self, path: &[&str]) -> BatchResult<()> {
        self.send(self.http.delete(self.url(path)?))?;
        Ok(())
    }
}

fn service_error(resp: Response) -> BatchError {
    let status = resp.status();
    let text = resp.text().unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => BatchError::Service {
            status: status.as_u16(),
            code: body.code,
            message: body.message.map(|m| m.value).unwrap_or_default(),
            values: body.values,
        },
        Err(_) => BatchError::Service {
            status: status.as_u16(),
            code: fallback_code(status).to_string(),
            message: text,
            values: Vec::new(),
        },
    }
}

fn fallback_code(status: StatusCode) -> &'static str {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => "AuthenticationFailed",
        StatusCode::NOT_FOUND => "NotFound",
        StatusCode::CONFLICT => "Conflict",
        s if s.is_server_error() => "ServerError",
        _ => "Unknown",
    }
}

impl BatchService for RestBatchClient {
    fn list_pools(&self) -> BatchResult<Vec<Pool>> {
        self.list(&["pools"])
    }

    fn get_pool(&self, pool_id: &str) -> BatchResult<Pool> {
        self.get_json(&self.url(&["pools", pool_id])?)
    }

    fn add_pool(&self, pool: &PoolAddParameter) -> BatchResult<()> {
        self.post(&["pools"], pool)
    }

    fn delete_pool(&self, pool_id: &str) -> BatchResult<()> {
        self.delete(&["pools", pool_id])
    }

    fn resize_pool(&self, pool_id: &str, resize: &PoolResizeParameter) -> BatchResult<()> {
        self.post(&["pools", pool_id, "resize"], resize)
    }

    fn stop_resize_pool(&self, pool_id: &str) -> BatchResult<()> {
        self.post_empty(&["pools", pool_id, "stopresize"])
    }

    fn remove_nodes(&self, pool_id: &str, remove: &NodeRemoveParameter) -> BatchResult<()> {
        self.post(&["pools", pool_id, "removenodes"], remove)
    }

    fn list_compute_nodes(&self, pool_id: &str) -> BatchResult<Vec<ComputeNode>> {
        self.list(&["pools", pool_id, "nodes"])
    }

    fn reboot_compute_node(&self, pool_id: &str, node_id: &str) -> BatchResult<()> {
        self.post_empty(&["pools", pool_id, "nodes", node_id, "reboot"])
    }

    fn get_node_file(
        &self,
        pool_id: &str,
        node_id: &str,
        file_path: &str,
    ) -> BatchResult<String> {
        let mut path = vec!["pools", pool_id, "nodes", node_id, "files"];
        path.extend(file_path.split('/').filter(|part| !part.is_empty()));
        let resp = self.send(self.http.get(self.url(&path)?))?;
        resp.text().map_err(|e| BatchError::Decode(e.to_string()))
    }

    fn add_job(&self, job: &JobAddParameter) -> BatchResult<()> {
        self.post(&["jobs"], job)
    }

    fn delete_job(&self, job_id: &str) -> BatchResult<()> {
        self.delete(&["jobs", job_id])
    }

    fn add_task(&self, job_id: &str, task: &TaskAddParameter) -> BatchResult<()> {
        self.post(&["jobs", job_id, "tasks"], task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubServer, token_reply};

    const TOKEN_PATH: &str = "/tenant/oauth2/token";

    fn client_for(base: &str) -> RestBatchClient {
        let creds = ServicePrincipalCredentials::new("app", "secret", &format!("{base}/tenant"));
        RestBatchClient::new(base, creds).unwrap()
    }

    fn client() -> RestBatchClient {
        let creds = ServicePrincipalCredentials::new(
            "app",
            "secret",
            "https://login.microsoftonline.com/tenant",
        );
        RestBatchClient::new("https://contoso.westus2.batch.azure.com/", creds).unwrap()
    }

    #[test]
    fn url_appends_api_version() {
        assert_eq!(
            client().url(&["pools", "p1"]).unwrap(),
            format!("https://contoso.westus2.batch.azure.com/pools/p1?api-version={API_VERSION}")
        );
    }

    #[test]
    fn url_encodes_each_segment() {
        assert_eq!(
            client().url(&["pools", "a b#c/d"]).unwrap(),
            format!(
                "https://contoso.westus2.batch.azure.com/pools/a%20b%23c%2Fd?api-version={API_VERSION}"
            )
        );
    }

    #[test]
    fn rejects_invalid_account_url() {
        let creds = ServicePrincipalCredentials::new("app", "secret", "https://login/tenant");
        assert!(matches!(
            RestBatchClient::new("not a url", creds),
            Err(BatchError::Transport(_))
        ));
    }

    #[test]
    fn parse_list_page() {
        let page: Page<Pool> = serde_json::from_str(
            r#"{
                "odata.metadata": "https://contoso.westus2.batch.azure.com/$metadata#pools",
                "value": [{"id": "p1", "vmSize": "standard_f8"}],
                "odata.nextLink": "https://contoso.westus2.batch.azure.com/pools?skiptoken=abc"
            }"#,
        )
        .unwrap();
        assert_eq!(page.value.len(), 1);
        assert_eq!(page.value[0].id, "p1");
        assert!(page.next_link.is_some());
    }

    #[test]
    fn fallback_codes() {
        assert_eq!(fallback_code(StatusCode::FORBIDDEN), "AuthenticationFailed");
        assert_eq!(fallback_code(StatusCode::BAD_GATEWAY), "ServerError");
        assert_eq!(fallback_code(StatusCode::BAD_REQUEST), "Unknown");
    }

    #[test]
    fn write_carries_one_content_type_and_bearer_token() {
        let server = StubServer::start(|req, _| match req.path() {
            TOKEN_PATH => token_reply("tok-1", 3600),
            _ => (202, String::new()),
        });
        let client = client_for(server.base());

        let resize = PoolResizeParameter {
            target_dedicated_nodes: 5,
            target_low_priority_nodes: 0,
        };
        client.resize_pool("p1", &resize).unwrap();

        let requests = server.requests();
        let sent = requests
            .iter()
            .find(|r| r.path() == "/pools/p1/resize")
            .unwrap();
        assert_eq!(sent.method, "POST");
        assert_eq!(sent.header_values("content-type"), vec![ODATA_JSON]);
        assert_eq!(sent.header_values("authorization"), vec!["Bearer tok-1"]);
        assert!(sent.target.ends_with(&format!("api-version={API_VERSION}")));

        let body: serde_json::Value = serde_json::from_str(&sent.body).unwrap();
        assert_eq!(body["targetDedicatedNodes"], 5);
        assert_eq!(body["targetLowPriorityNodes"], 0);
    }

    #[test]
    fn action_call_sends_empty_body() {
        let server = StubServer::start(|req, _| match req.path() {
            TOKEN_PATH => token_reply("tok-1", 3600),
            _ => (202, String::new()),
        });
        client_for(server.base()).stop_resize_pool("p1").unwrap();

        let requests = server.requests();
        let sent = requests
            .iter()
            .find(|r| r.path() == "/pools/p1/stopresize")
            .unwrap();
        assert!(sent.body.is_empty());
        assert_eq!(sent.header_values("content-type").len(), 1);
    }

    #[test]
    fn error_body_becomes_service_error() {
        let server = StubServer::start(|req, _| match req.path() {
            TOKEN_PATH => token_reply("tok-1", 3600),
            _ => (
                404,
                r#"{
                    "code": "PoolNotFound",
                    "message": {"lang": "en-US", "value": "The specified pool does not exist."},
                    "values": [{"key": "RequestId", "value": "1f0c"}]
                }"#
                .to_string(),
            ),
        });

        let err = client_for(server.base()).get_pool("gone").unwrap_err();
        match err {
            BatchError::Service {
                status,
                code,
                message,
                values,
            } => {
                assert_eq!(status, 404);
                assert_eq!(code, "PoolNotFound");
                assert_eq!(message, "The specified pool does not exist.");
                assert_eq!(values.len(), 1);
                assert_eq!(values[0].key, "RequestId");
                assert_eq!(values[0].value, "1f0c");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unparseable_error_body_uses_status_code() {
        let server = StubServer::start(|req, _| match req.path() {
            TOKEN_PATH => token_reply("tok-1", 3600),
            _ => (503, "upstream unavailable".to_string()),
        });

        let err = client_for(server.base()).delete_job("j1").unwrap_err();
        assert!(err.has_code("ServerError"));
        assert!(err.to_string().contains("upstream unavailable"));
        assert!(err.details().is_empty());
    }

    #[test]
    fn list_follows_next_link_and_reuses_token() {
        let server = StubServer::start(|req, base| {
            if req.path() == TOKEN_PATH {
                return token_reply("tok-1", 3600);
            }
            if req.target.contains("skiptoken=page2") {
                (200, r#"{"value": [{"id": "p2", "vmSize": "standard_f8"}]}"#.to_string())
            } else {
                let next = format!("{base}/pools?api-version={API_VERSION}&skiptoken=page2");
                (
                    200,
                    format!(
                        r#"{{"value": [{{"id": "p1", "vmSize": "standard_f8"}}], "odata.nextLink": "{next}"}}"#
                    ),
                )
            }
        });
        let client = client_for(server.base());

        let pools = client.list_pools().unwrap();
        let ids: Vec<_> = pools.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
        assert_eq!(server.hits("/pools"), 2);

        client.list_pools().unwrap();
        assert_eq!(server.hits("/pools"), 4);
        assert_eq!(server.hits(TOKEN_PATH), 1);
    }

    #[test]
    fn node_file_path_keeps_separators() {
        let server = StubServer::start(|req, _| match req.path() {
            TOKEN_PATH => token_reply("tok-1", 3600),
            "/pools/p1/nodes/tvm-1/files/startup/wd/hostname.txt" => {
                (200, "render-07\n".to_string())
            }
            _ => (404, r#"{"code": "FileNotFound"}"#.to_string()),
        });

        let text = client_for(server.base())
            .get_node_file("p1", "tvm-1", "/startup/wd/hostname.txt")
            .unwrap();
        assert_eq!(text, "render-07\n");
    }
}
