use std::time::Duration;

use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Result, WallError};
use crate::model::{Comment, NewComment, NewPost, Post, StoredObject};

const REST_PREFIX: &str = "rest/v1/";
const STORAGE_PREFIX: &str = "storage/v1/object/";
const POSTS_TABLE: &str = "posts";
const COMMENTS_TABLE: &str = "comments";

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub user_agent: String,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

/// Thin client for a hosted backend exposing PostgREST-style tables and an
/// object-storage bucket API.
pub struct Client {
    http: HttpClient,
    base_url: Url,
    api_key: String,
    user_agent: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(WallError::validation("backend url required"));
        }
        if config.user_agent.trim().is_empty() {
            return Err(WallError::validation("backend user agent required"));
        }
        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|err| WallError::validation(format!("invalid backend url {base}: {err}")))?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(Duration::from_secs(20)))
                .build()?,
        };

        Ok(Client {
            http,
            base_url,
            api_key: config.api_key,
            user_agent: config.user_agent,
        })
    }

    pub fn list_posts(&self) -> Result<Vec<Post>> {
        let params = [("select", "*"), ("order", "created_at.desc")];
        self.fetch_rows(POSTS_TABLE, &params)
    }

    pub fn insert_post(&self, post: &NewPost) -> Result<Post> {
        self.insert_row(POSTS_TABLE, post)
    }

    pub fn delete_post(&self, id: &str) -> Result<()> {
        let filter = format!("eq.{id}");
        let url = self.rest_url(POSTS_TABLE, &[("id", filter.as_str())])?;
        self.send(self.request(Method::DELETE, url))?;
        Ok(())
    }

    pub fn list_comments(&self, post_id: &str) -> Result<Vec<Comment>> {
        let filter = format!("eq.{post_id}");
        let params = [
            ("select", "*"),
            ("post_id", filter.as_str()),
            ("order", "created_at.asc"),
        ];
        self.fetch_rows(COMMENTS_TABLE, &params)
    }

    pub fn insert_comment(&self, comment: &NewComment) -> Result<Comment> {
        self.insert_row(COMMENTS_TABLE, comment)
    }

    pub fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject> {
        if bucket.trim().is_empty() || key.trim().is_empty() {
            return Err(WallError::validation("storage bucket and key are required"));
        }
        let url = self.storage_url(&[bucket, key])?;
        let size = bytes.len();
        let req = self
            .request(Method::POST, url)
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes);
        self.send(req)?;
        debug!(bucket, key, size, "uploaded object");
        Ok(StoredObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            public_url: self.public_url(bucket, key)?,
        })
    }

    pub fn public_url(&self, bucket: &str, key: &str) -> Result<String> {
        Ok(self.storage_url(&["public", bucket, key])?.to_string())
    }

    fn fetch_rows<T>(&self, table: &str, params: &[(&str, &str)]) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let url = self.rest_url(table, params)?;
        let resp = self.send(self.request(Method::GET, url))?;
        let rows: Vec<T> = resp.json()?;
        Ok(rows)
    }

    fn insert_row<P, T>(&self, table: &str, payload: &P) -> Result<T>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let url = self.rest_url(table, &[])?;
        let req = self
            .request(Method::POST, url)
            .header("Prefer", "return=representation")
            .json(&[payload]);
        let resp = self.send(req)?;
        let rows: Vec<T> = resp.json()?;
        rows.into_iter()
            .next()
            .ok_or_else(|| WallError::backend(format!("{table}: insert returned no rows")))
    }

    fn rest_url(&self, table: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.join(&format!("{REST_PREFIX}{table}"))?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    fn storage_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.join(STORAGE_PREFIX)?;
        url.path_segments_mut()
            .map_err(|_| WallError::validation("backend url cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|err| WallError::validation(format!("invalid backend path {path}: {err}")))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut req = self
            .http
            .request(method, url)
            .header(USER_AGENT, self.user_agent.clone());
        if !self.api_key.is_empty() {
            req = req
                .header("apikey", self.api_key.clone())
                .header(AUTHORIZATION, format!("Bearer {}", self.api_key));
        }
        req
    }

    fn send(&self, req: RequestBuilder) -> Result<Response> {
        let resp = req.send()?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        let message = error_message(&body)
            .unwrap_or_else(|| format!("backend error {status}: {}", body.trim()));
        warn!(status = status.as_u16(), %message, "backend request failed");
        Err(WallError::Backend {
            status: Some(status.as_u16()),
            message,
        })
    }
}

fn error_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed
        .message
        .or(parsed.error)
        .filter(|message| !message.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Client {
        Client::new(ClientConfig {
            base_url: "https://project.example.co".into(),
            api_key: "anon".into(),
            user_agent: "wall-tui/test".into(),
            timeout: None,
            http_client: None,
        })
        .unwrap()
    }

    #[test]
    fn requires_base_url() {
        let err = Client::new(ClientConfig {
            user_agent: "wall-tui/test".into(),
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(err.is_validation());
    }

    #[test]
    fn builds_table_urls_with_filters() {
        let url = client()
            .rest_url(
                COMMENTS_TABLE,
                &[("post_id", "eq.42"), ("order", "created_at.asc")],
            )
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://project.example.co/rest/v1/comments?post_id=eq.42&order=created_at.asc"
        );
    }

    #[test]
    fn builds_public_object_url() {
        let url = client().public_url("post-images", "1700-abc.png").unwrap();
        assert_eq!(
            url,
            "https://project.example.co/storage/v1/object/public/post-images/1700-abc.png"
        );
    }

    #[test]
    fn extracts_error_messages() {
        assert_eq!(
            error_message(r#"{"code":"23505","message":"duplicate key"}"#).as_deref(),
            Some("duplicate key")
        );
        assert_eq!(
            error_message(r#"{"statusCode":"404","error":"Bucket not found"}"#).as_deref(),
            Some("Bucket not found")
        );
        assert_eq!(error_message("<html>"), None);
    }
}
