//! Stash-box GraphQL client.
//!
//! Thin wrapper over the handful of queries and mutations the importer
//! needs. Every request carries the `ApiKey` header; a non-200 answer or a
//! non-empty `errors` array is an error.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stashtools::stashbox::{SceneApi, StashBoxClient};
//!
//! let client = StashBoxClient::from_env()?;
//! if !client.scene_exists("https://example.com/scene/1").await? {
//!     let id = client.create_scene(&input).await?;
//! }
//! ```

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

use crate::config::StashBoxConfig;
use crate::error::{ClientError, ClientResult};

/// Request timeout
const REQUEST_TIMEOUT_SECS: u64 = 60;

const SCENE_CREATE: &str = r#"
mutation sceneCreate($input: SceneCreateInput!) {
  sceneCreate(input: $input) {
    id
  }
}"#;

const QUERY_SCENES: &str = r#"
query queryScenes($scene_filter: SceneFilterType, $querySpec: QuerySpec) {
  queryScenes(scene_filter: $scene_filter, filter: $querySpec) {
    count
  }
}"#;

const QUERY_PERFORMERS: &str = r#"
query queryPerformers($performer_filter: PerformerFilterType, $querySpec: QuerySpec) {
  queryPerformers(performer_filter: $performer_filter, filter: $querySpec) {
    performers {
      id
    }
  }
}"#;

const FIND_STUDIO: &str = r#"
query findStudio($name: String) {
  findStudio(name: $name) {
    id
  }
}"#;

const FIND_TAG: &str = r#"
query findTag($name: String) {
  findTag(name: $name) {
    id
  }
}"#;

const IMAGE_CREATE: &str = r#"
mutation imageCreate($input: ImageCreateInput!) {
  imageCreate(input: $input) {
    id
  }
}"#;

/// Entities that can be looked up by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Performer,
    Studio,
    Tag,
}

impl EntityKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "performer" | "performers" => Some(EntityKind::Performer),
            "studio" | "studios" => Some(EntityKind::Studio),
            "tag" | "tags" => Some(EntityKind::Tag),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Performer => "performer",
            EntityKind::Studio => "studio",
            EntityKind::Tag => "tag",
        };
        f.write_str(name)
    }
}

/// Operations the importer needs from a stash-box server.
#[allow(async_fn_in_trait)]
pub trait SceneApi {
    /// Whether a scene with this URL is already present.
    async fn scene_exists(&self, url: &str) -> ClientResult<bool>;

    /// Create a scene, returning its id.
    async fn create_scene(&self, input: &Value) -> ClientResult<String>;

    /// Id of the entity with exactly this name.
    async fn find_id_by_name(&self, kind: EntityKind, name: &str) -> ClientResult<Option<String>>;

    /// Upload an image, returning its id.
    async fn create_image(&self, bytes: Vec<u8>, filename: &str) -> ClientResult<String>;
}

/// GraphQL response envelope
#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<Value>,
}

/// Async stash-box client
#[derive(Clone)]
pub struct StashBoxClient {
    config: StashBoxConfig,
    http: reqwest::Client,
}

impl StashBoxClient {
    pub fn new(config: StashBoxConfig) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ClientError::RequestFailed(e.to_string()))?;
        Ok(Self { config, http })
    }

    /// Client configured from `STASHBOX_URL` and `STASHBOX_API_KEY`
    pub fn from_env() -> ClientResult<Self> {
        Self::new(StashBoxConfig::from_env()?)
    }

    pub fn server_url(&self) -> &str {
        &self.config.server_url
    }

    async fn call(&self, query: &str, variables: Value) -> ClientResult<Value> {
        let response = self
            .http
            .post(&self.config.server_url)
            .header("ApiKey", &self.config.api_key)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| ClientError::RequestFailed(e.to_string()))?;

        read_response(response).await
    }

    async fn call_multipart(&self, form: Form) -> ClientResult<Value> {
        let response = self
            .http
            .post(&self.config.server_url)
            .header("ApiKey", &self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::RequestFailed(e.to_string()))?;

        read_response(response).await
    }
}

impl SceneApi for StashBoxClient {
    async fn scene_exists(&self, url: &str) -> ClientResult<bool> {
        let data = self.call(QUERY_SCENES, scene_exists_variables(url)).await?;
        let count = data
            .pointer("/queryScenes/count")
            .and_then(Value::as_u64)
            .ok_or_else(|| ClientError::InvalidResponse("missing queryScenes.count".into()))?;
        Ok(count > 0)
    }

    async fn create_scene(&self, input: &Value) -> ClientResult<String> {
        let data = self.call(SCENE_CREATE, json!({ "input": input })).await?;
        extract_id(&data, "/sceneCreate/id")
    }

    async fn find_id_by_name(&self, kind: EntityKind, name: &str) -> ClientResult<Option<String>> {
        let (query, variables) = find_by_name_request(kind, name);
        let data = self.call(query, variables).await?;
        Ok(found_id(&data, kind))
    }

    async fn create_image(&self, bytes: Vec<u8>, filename: &str) -> ClientResult<String> {
        let part = Part::bytes(bytes).file_name(filename.to_string());
        let form = Form::new()
            .text("operations", image_operations().to_string())
            .text("map", json!({ "0": ["variables.input.file"] }).to_string())
            .part("0", part);

        let data = self.call_multipart(form).await?;
        extract_id(&data, "/imageCreate/id")
    }
}

async fn read_response(response: reqwest::Response) -> ClientResult<Value> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ClientError::RequestFailed(e.to_string()))?;

    if status != reqwest::StatusCode::OK {
        return Err(ClientError::Http {
            status: status.as_u16(),
            body,
        });
    }

    parse_response(&body)
}

/// Unwrap the `data` member, turning `errors` into a [`ClientError`].
fn parse_response(body: &str) -> ClientResult<Value> {
    let response: GraphQlResponse = serde_json::from_str(body)?;

    if !response.errors.is_empty() {
        let messages = response
            .errors
            .iter()
            .map(|e| match e.get("message").and_then(Value::as_str) {
                Some(message) => message.to_string(),
                None => e.to_string(),
            })
            .collect();
        return Err(ClientError::GraphQl(messages));
    }

    match response.data {
        Some(Value::Null) | None => Err(ClientError::InvalidResponse("missing data".into())),
        Some(data) => Ok(data),
    }
}

/// Exact-match filters are quoted.
fn exact(value: &str) -> String {
    format!("\"{}\"", value)
}

fn scene_exists_variables(url: &str) -> Value {
    json!({
        "querySpec": { "per_page": 1 },
        "scene_filter": { "url": exact(url) }
    })
}

fn find_by_name_request(kind: EntityKind, name: &str) -> (&'static str, Value) {
    match kind {
        EntityKind::Performer => (
            QUERY_PERFORMERS,
            json!({
                "querySpec": { "per_page": 1 },
                "performer_filter": { "name": exact(name) }
            }),
        ),
        EntityKind::Studio => (FIND_STUDIO, json!({ "name": name })),
        EntityKind::Tag => (FIND_TAG, json!({ "name": name })),
    }
}

fn found_id(data: &Value, kind: EntityKind) -> Option<String> {
    let pointer = match kind {
        EntityKind::Performer => "/queryPerformers/performers/0/id",
        EntityKind::Studio => "/findStudio/id",
        EntityKind::Tag => "/findTag/id",
    };
    data.pointer(pointer)
        .and_then(Value::as_str)
        .map(String::from)
}

fn image_operations() -> Value {
    json!({
        "query": IMAGE_CREATE,
        "variables": { "input": { "file": null } }
    })
}

fn extract_id(data: &Value, pointer: &str) -> ClientResult<String> {
    data.pointer(pointer)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| ClientError::InvalidResponse(format!("missing {}", pointer)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_returns_data() {
        let data = parse_response(r#"{"data": {"sceneCreate": {"id": "abc"}}}"#).unwrap();
        assert_eq!(extract_id(&data, "/sceneCreate/id").unwrap(), "abc");
    }

    #[test]
    fn test_parse_response_collects_errors() {
        let body = r#"{"errors": [{"message": "first"}, {"message": "second"}], "data": null}"#;
        match parse_response(body).unwrap_err() {
            ClientError::GraphQl(messages) => assert_eq!(messages, vec!["first", "second"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_response_without_data() {
        assert!(matches!(
            parse_response(r#"{"data": null}"#).unwrap_err(),
            ClientError::InvalidResponse(_)
        ));
        assert!(matches!(parse_response("not json").unwrap_err(), ClientError::Json(_)));
    }

    #[test]
    fn test_scene_filter_is_exact_match() {
        let variables = scene_exists_variables("https://x/1");
        assert_eq!(variables["scene_filter"]["url"], "\"https://x/1\"");
        assert_eq!(variables["querySpec"]["per_page"], 1);
    }

    #[test]
    fn test_find_by_name_requests() {
        let (query, variables) = find_by_name_request(EntityKind::Performer, "Jane");
        assert!(query.contains("queryPerformers"));
        assert_eq!(variables["performer_filter"]["name"], "\"Jane\"");

        let (query, variables) = find_by_name_request(EntityKind::Studio, "Acme");
        assert!(query.contains("findStudio"));
        assert_eq!(variables["name"], "Acme");

        let (query, _) = find_by_name_request(EntityKind::Tag, "outdoor");
        assert!(query.contains("findTag"));
    }

    #[test]
    fn test_found_id() {
        let performers = json!({"queryPerformers": {"performers": [{"id": "p1"}]}});
        assert_eq!(found_id(&performers, EntityKind::Performer), Some("p1".into()));

        let none = json!({"queryPerformers": {"performers": []}});
        assert_eq!(found_id(&none, EntityKind::Performer), None);

        let studio = json!({"findStudio": null});
        assert_eq!(found_id(&studio, EntityKind::Studio), None);

        let tag = json!({"findTag": {"id": "t1"}});
        assert_eq!(found_id(&tag, EntityKind::Tag), Some("t1".into()));
    }

    #[test]
    fn test_image_operations_leave_file_for_multipart() {
        let ops = image_operations();
        assert!(ops["query"].as_str().unwrap().contains("imageCreate"));
        assert!(ops["variables"]["input"]["file"].is_null());
    }

    #[test]
    fn test_entity_kind_parse() {
        assert_eq!(EntityKind::parse("Tags"), Some(EntityKind::Tag));
        assert_eq!(EntityKind::parse("studio"), Some(EntityKind::Studio));
        assert_eq!(EntityKind::parse("scene"), None);
        assert_eq!(EntityKind::Performer.to_string(), "performer");
    }
}
