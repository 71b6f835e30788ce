//! Firestore REST client.
//!
//! Documents are exchanged in Firestore's typed value encoding
//! (`{"stringValue": ...}`, `{"doubleValue": ...}`, ...). Queries go through
//! `documents:runQuery` with a structured query; several equality filters are
//! combined with a composite `AND`.

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::{json, Map, Value};
use std::sync::RwLock;

use super::{Document, DocumentStore, Fields, Filter, RemoteError};

const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";
const DEFAULT_DATABASE: &str = "(default)";

/// Location of a Firestore database.
#[derive(Debug, Clone, PartialEq)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub database: String,
    /// API root, overridable for the local emulator.
    pub base_url: String,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database: DEFAULT_DATABASE.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/{}/documents",
            self.base_url, self.project_id, self.database
        )
    }

    fn collection_url(&self, collection: &str) -> String {
        format!(
            "{}/{}",
            self.documents_url(),
            urlencoding::encode(collection)
        )
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!(
            "{}/{}",
            self.collection_url(collection),
            urlencoding::encode(id)
        )
    }

    fn update_url(&self, collection: &str, id: &str, fields: &Fields) -> String {
        let mut url = self.document_url(collection, id);
        url.push_str("?currentDocument.exists=true");
        for name in fields.keys() {
            url.push_str("&updateMask.fieldPaths=");
            url.push_str(&urlencoding::encode(name));
        }
        url
    }
}

/// Document store talking to the hosted Firestore REST API.
#[derive(Debug)]
pub struct FirestoreStore {
    client: reqwest::Client,
    config: FirestoreConfig,
    id_token: RwLock<Option<String>>,
}

impl FirestoreStore {
    pub fn new(config: FirestoreConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            id_token: RwLock::new(None),
        }
    }

    /// Set the bearer token sent with every request (`None` for anonymous
    /// access, e.g. against the emulator).
    pub fn set_id_token(&self, token: Option<String>) {
        *self.id_token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self
            .id_token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(
        &self,
        request: RequestBuilder,
        collection: &str,
        id: Option<&str>,
    ) -> Result<Response, RemoteError> {
        let response = self.authorized(request).send().await.map_err(transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body, collection, id))
    }
}

fn transport(e: reqwest::Error) -> RemoteError {
    if e.is_connect() || e.is_timeout() {
        RemoteError::Unavailable(e.to_string())
    } else {
        RemoteError::Backend(e.to_string())
    }
}

/// Map a non-success HTTP response to a `RemoteError`.
fn status_error(status: StatusCode, body: &str, collection: &str, id: Option<&str>) -> RemoteError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| format!("HTTP {}", status));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::PermissionDenied(message),
        StatusCode::NOT_FOUND => match id {
            Some(id) => RemoteError::not_found(collection, id),
            None => RemoteError::Backend(message),
        },
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => RemoteError::Unavailable(message),
        _ => RemoteError::Backend(message),
    }
}

/// Encode a JSON value as a Firestore typed value.
pub(crate) fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

fn encode_fields(fields: &Fields) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), encode_value(v)))
            .collect(),
    )
}

/// Decode a Firestore typed value into plain JSON.
pub(crate) fn decode_value(value: &Value) -> Result<Value, RemoteError> {
    let obj = value
        .as_object()
        .ok_or_else(|| RemoteError::Decode(format!("expected typed value, got {}", value)))?;
    let (kind, inner) = obj
        .iter()
        .next()
        .ok_or_else(|| RemoteError::Decode("empty typed value".to_string()))?;

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" | "doubleValue" => Ok(inner.clone()),
        "integerValue" => {
            let parsed = match inner {
                Value::String(s) => s.parse::<i64>().ok(),
                other => other.as_i64(),
            };
            parsed
                .map(Value::from)
                .ok_or_else(|| RemoteError::Decode(format!("bad integer: {}", inner)))
        }
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => Ok(inner.clone()),
        "geoPointValue" => Ok(inner.clone()),
        "arrayValue" => {
            let values = match inner.get("values").and_then(Value::as_array) {
                Some(values) => values.iter().map(decode_value).collect::<Result<_, _>>()?,
                None => Vec::new(),
            };
            Ok(Value::Array(values))
        }
        "mapValue" => Ok(Value::Object(decode_fields(inner.get("fields"))?)),
        other => Err(RemoteError::Decode(format!("unknown value type: {}", other))),
    }
}

fn decode_fields(fields: Option<&Value>) -> Result<Fields, RemoteError> {
    let mut out = Map::new();
    if let Some(map) = fields.and_then(Value::as_object) {
        for (k, v) in map {
            out.insert(k.clone(), decode_value(v)?);
        }
    }
    Ok(out)
}

/// Decode a REST document (`{"name": ".../documents/lieux/ID", "fields": ...}`).
pub(crate) fn decode_document(value: &Value) -> Result<Document, RemoteError> {
    let name = value["name"]
        .as_str()
        .ok_or_else(|| RemoteError::Decode("document without name".to_string()))?;
    let id = name.rsplit('/').next().unwrap_or(name);
    Ok(Document {
        id: id.to_string(),
        fields: decode_fields(value.get("fields"))?,
    })
}

/// Body of a `runQuery` request.
pub(crate) fn structured_query(collection: &str, filters: &[Filter]) -> Value {
    let field_filter = |f: &Filter| {
        json!({
            "fieldFilter": {
                "field": { "fieldPath": f.field },
                "op": "EQUAL",
                "value": encode_value(&f.value),
            }
        })
    };

    let mut query = json!({ "from": [{ "collectionId": collection }] });
    match filters {
        [] => {}
        [single] => query["where"] = field_filter(single),
        many => {
            let filters: Vec<Value> = many.iter().map(field_filter).collect();
            query["where"] = json!({ "compositeFilter": { "op": "AND", "filters": filters } });
        }
    }
    json!({ "structuredQuery": query })
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn insert(&self, collection: &str, fields: Fields) -> Result<String, RemoteError> {
        let request = self
            .client
            .post(self.config.collection_url(collection))
            .json(&json!({ "fields": encode_fields(&fields) }));
        let response = self.send(request, collection, None).await?;
        let body: Value = response.json().await.map_err(transport)?;
        let doc = decode_document(&body)?;
        tracing::debug!("Created {}/{}", collection, doc.id);
        Ok(doc.id)
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), RemoteError> {
        let request = self
            .client
            .patch(self.config.update_url(collection, id, &fields))
            .json(&json!({ "fields": encode_fields(&fields) }));
        self.send(request, collection, Some(id)).await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
        let request = self.client.delete(self.config.document_url(collection, id));
        self.send(request, collection, Some(id)).await?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        filters: &[Filter],
    ) -> Result<Vec<Document>, RemoteError> {
        let url = format!("{}:runQuery", self.config.documents_url());
        let request = self
            .client
            .post(url)
            .json(&structured_query(collection, filters));
        let response = self.send(request, collection, None).await?;
        let rows: Vec<Value> = response.json().await.map_err(transport)?;

        rows.iter()
            .filter_map(|row| row.get("document"))
            .map(decode_document)
            .collect()
    }
}
