use reqwest::header::{HeaderMap, HeaderValue, IF_MATCH};
use reqwest::Method;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

use super::collection::CollectionWalker;
use super::redpath::{Filter, RedPath, Segment};
use super::service::{check_status, RedfishService, ServiceInner};
use super::transport::RequestBody;
use crate::error::{RedfishError, Result};

/// One JSON resource, fetched from a service or built locally.
///
/// A fetched payload remembers the URI it came from (its origin) and is the
/// target of `patch`, `post` and `delete`. Payloads derived by navigating an
/// embedded value, or parsed from a string, have no origin.
#[derive(Clone)]
pub struct Payload {
    json: Value,
    origin: Option<String>,
    service: Weak<ServiceInner>,
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("origin", &self.origin)
            .field("json", &self.json)
            .finish()
    }
}

/// `{:#}` renders the indented form.
impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            write!(f, "{:#}", self.json)
        } else {
            write!(f, "{}", self.json)
        }
    }
}

/// `@odata.id` of an object value, if it has one.
fn reference(value: &Value) -> Option<&str> {
    value.as_object()?.get("@odata.id")?.as_str()
}

impl Payload {
    pub(crate) fn new(json: Value, origin: Option<String>, service: Weak<ServiceInner>) -> Self {
        Self {
            json,
            origin,
            service,
        }
    }

    pub async fn fetch(service: &RedfishService, uri: &str) -> Result<Payload> {
        service.fetch(uri).await
    }

    /// Parses `content` without touching the network.
    pub fn from_json_str(service: &RedfishService, content: &str) -> Result<Payload> {
        let json: Value = serde_json::from_str(content)?;
        Ok(Payload::new(json, None, service.downgrade()))
    }

    pub(crate) async fn fetch_from(service: &Arc<ServiceInner>, uri: &str) -> Result<Payload> {
        let json = service.get_json(uri).await?;
        Ok(Payload::new(json, Some(uri.to_string()), Arc::downgrade(service)))
    }

    pub(crate) fn service(&self) -> Result<Arc<ServiceInner>> {
        let service = self.service.upgrade().ok_or(RedfishError::UseAfterClose)?;
        service.ensure_open()?;
        Ok(service)
    }

    fn derive(&self, json: Value) -> Payload {
        Payload::new(json, None, self.service.clone())
    }

    async fn resolve(&self, service: &Arc<ServiceInner>, value: &Value) -> Result<Payload> {
        match reference(value) {
            Some(uri) => Payload::fetch_from(service, uri).await,
            None => Ok(self.derive(value.clone())),
        }
    }

    pub(crate) async fn fetch_related(&self, uri: &str) -> Result<Payload> {
        let service = self.service()?;
        Payload::fetch_from(&service, uri).await
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn odata_id(&self) -> Option<&str> {
        reference(&self.json)
    }

    pub fn json(&self) -> &Value {
        &self.json
    }

    pub fn into_json(self) -> Value {
        self.json
    }

    fn members(&self) -> Option<&Vec<Value>> {
        self.json.get("Members")?.as_array()
    }

    pub fn is_collection(&self) -> bool {
        self.members().is_some()
    }

    pub fn collection_size(&self) -> Result<usize> {
        self.members()
            .map(Vec::len)
            .ok_or_else(|| RedfishError::TypeError("payload is not a collection".to_string()))
    }

    pub fn next_link(&self) -> Option<&str> {
        self.json.get("Members@odata.nextLink")?.as_str()
    }

    /// Canonical text of a scalar value.
    pub fn string_value(&self) -> Result<String> {
        match &self.json {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Null => Ok("null".to_string()),
            Value::Array(_) | Value::Object(_) => Err(RedfishError::TypeError(
                "string value requested from an object or array".to_string(),
            )),
        }
    }

    pub fn int_value(&self) -> Result<i64> {
        let Value::Number(n) = &self.json else {
            return Err(RedfishError::TypeError(format!(
                "integer value requested from {}",
                self.json
            )));
        };
        if let Some(value) = n.as_i64() {
            return Ok(value);
        }
        if n.is_u64() {
            return Err(RedfishError::RangeError(format!("{} does not fit in i64", n)));
        }
        let value = n.as_f64().unwrap_or(f64::NAN);
        if value.fract() != 0.0 || value.is_nan() {
            return Err(RedfishError::TypeError(format!("{} is not an integer", n)));
        }
        if value < i64::MIN as f64 || value >= i64::MAX as f64 {
            return Err(RedfishError::RangeError(format!("{} does not fit in i64", n)));
        }
        Ok(value as i64)
    }

    /// Child property. A child object carrying `@odata.id` is fetched;
    /// anything else is returned as a local payload.
    pub async fn get(&self, name: &str) -> Result<Payload> {
        let service = self.service()?;
        let value = self
            .json
            .get(name)
            .ok_or_else(|| RedfishError::NotFound(format!("property {}", name)))?;
        self.resolve(&service, value).await
    }

    /// Member `index` of a collection, fetched through its `@odata.id`.
    pub async fn get_index(&self, index: usize) -> Result<Payload> {
        let service = self.service()?;
        let members = self
            .members()
            .ok_or_else(|| RedfishError::TypeError("payload is not a collection".to_string()))?;
        let member = members.get(index).ok_or(RedfishError::IndexError {
            index,
            size: members.len(),
        })?;
        self.resolve(&service, member).await
    }

    /// Element `index` of a plain JSON array; references are fetched.
    pub async fn get_element(&self, index: usize) -> Result<Payload> {
        let service = self.service()?;
        let items = self
            .json
            .as_array()
            .ok_or_else(|| RedfishError::TypeError("payload is not an array".to_string()))?;
        let item = items.get(index).ok_or(RedfishError::IndexError {
            index,
            size: items.len(),
        })?;
        self.resolve(&service, item).await
    }

    /// Resolves a RedPath. Absolute paths start at the service root,
    /// relative ones at this payload.
    pub async fn get_path(&self, path: &str) -> Result<Payload> {
        let path: RedPath = path.parse()?;
        let service = self.service()?;
        let start = if path.absolute {
            Payload::fetch_from(&service, service.root_uri()).await?
        } else {
            self.clone()
        };
        start.navigate(&path.segments).await
    }

    pub(crate) async fn navigate(self, segments: &[Segment]) -> Result<Payload> {
        self.service()?;
        let mut current = self;
        for segment in segments {
            let next = match segment {
                Segment::Property(name) => current.step_property(name).await,
                Segment::Index(index) => current.step_index(*index).await,
                Segment::Filter(filter) => current.apply_filter(filter).await,
            };
            current = next.map_err(|e| match e {
                RedfishError::NotFound(_)
                | RedfishError::IndexError { .. }
                | RedfishError::HttpError { status: 404, .. } => {
                    RedfishError::NotFound(format!("path segment {:?}: {}", segment, e))
                }
                other => other,
            })?;
        }
        Ok(current)
    }

    async fn step_property(&self, name: &str) -> Result<Payload> {
        if let Ok(index) = name.parse::<usize>() {
            if self.is_collection() || self.json.is_array() {
                return self.step_index(index).await;
            }
        }
        self.get(name).await
    }

    async fn step_index(&self, index: usize) -> Result<Payload> {
        if self.is_collection() {
            self.get_index(index).await
        } else if self.json.is_array() {
            self.get_element(index).await
        } else {
            Err(RedfishError::NotFound(format!(
                "index {} into a value that is neither a collection nor an array",
                index
            )))
        }
    }

    async fn apply_filter(&self, filter: &Filter) -> Result<Payload> {
        let service = self.service()?;

        let candidates = if self.is_collection() {
            if *filter == Filter::Last {
                let size = self.collection_size()?;
                if size == 0 {
                    return Err(RedfishError::NotFound("last() of an empty collection".to_string()));
                }
                return self.get_index(size - 1).await;
            }
            CollectionWalker::new(self.clone())?.collect().await?
        } else if let Some(items) = self.json.as_array() {
            let mut resolved = Vec::with_capacity(items.len());
            for item in items {
                resolved.push(self.resolve(&service, item).await?);
            }
            resolved
        } else {
            return if filter.matches(&self.json) {
                Ok(self.clone())
            } else {
                Err(RedfishError::NotFound(format!("no match for {:?}", filter)))
            };
        };

        let mut matched: Vec<Payload> = match filter {
            Filter::Last => candidates.into_iter().last().into_iter().collect(),
            _ => candidates
                .into_iter()
                .filter(|candidate| filter.matches(&candidate.json))
                .collect(),
        };

        match matched.len() {
            0 => Err(RedfishError::NotFound(format!("no match for {:?}", filter))),
            1 => Ok(matched.remove(0)),
            count => {
                let members: Vec<Value> = matched.into_iter().map(Payload::into_json).collect();
                let mut collection = Map::new();
                collection.insert("Members".to_string(), Value::Array(members));
                collection.insert("Members@odata.count".to_string(), Value::from(count));
                Ok(self.derive(Value::Object(collection)))
            }
        }
    }

    fn require_origin(&self, operation: &str) -> Result<&str> {
        self.origin.as_deref().ok_or_else(|| {
            RedfishError::StateError(format!(
                "cannot {} a payload without an origin URI",
                operation
            ))
        })
    }

    /// PATCH `{name: value}` to the origin. An empty response body is
    /// answered by re-fetching the resource.
    pub async fn patch_string_property(&self, name: &str, value: &str) -> Result<Payload> {
        let uri = self.require_origin("patch")?;
        let service = self.service()?;

        let mut body = Map::new();
        body.insert(name.to_string(), Value::String(value.to_string()));
        let body = Value::Object(body);

        let mut headers = HeaderMap::new();
        if let Some(etag) = self.json.get("@odata.etag").and_then(Value::as_str) {
            if let Ok(etag) = HeaderValue::from_str(etag) {
                headers.insert(IF_MATCH, etag);
            }
        }

        let response = service
            .execute(Method::PATCH, uri, headers, Some(RequestBody::Json(&body)))
            .await?;
        check_status(&response, uri)?;

        if response.is_empty() {
            debug!("PATCH {} returned no body, re-fetching", uri);
            return Payload::fetch_from(&service, uri).await;
        }
        Ok(Payload::new(response.json()?, Some(uri.to_string()), self.service.clone()))
    }

    /// POSTs `body` to this payload's origin and returns the created resource.
    pub async fn post(&self, body: &Payload) -> Result<Payload> {
        self.require_origin("post to")?;
        if !body.json.is_object() {
            return Err(RedfishError::TypeError("POST body must be a JSON object".to_string()));
        }
        self.post_body(RequestBody::Json(&body.json)).await
    }

    /// POSTs raw `content` of type `content_type`, e.g. a firmware image
    /// to an update service.
    pub async fn post_content(&self, content: &[u8], content_type: &str) -> Result<Payload> {
        self.post_body(RequestBody::Raw {
            content,
            content_type,
        })
        .await
    }

    async fn post_body(&self, body: RequestBody<'_>) -> Result<Payload> {
        let uri = self.require_origin("post to")?;
        let service = self.service()?;

        let response = service
            .execute(Method::POST, uri, HeaderMap::new(), Some(body))
            .await?;
        check_status(&response, uri)?;

        let location = response.header("Location").map(str::to_string);
        if response.is_empty() {
            let location = location.ok_or_else(|| {
                RedfishError::ProtocolError(format!(
                    "POST to {} returned neither a body nor a Location",
                    uri
                ))
            })?;
            return Payload::fetch_from(&service, &location).await;
        }

        let json = response.json()?;
        let origin = location.or_else(|| reference(&json).map(str::to_string));
        Ok(Payload::new(json, origin, self.service.clone()))
    }

    /// DELETE the origin; `false` for any non-2xx status.
    pub async fn delete(&self) -> Result<bool> {
        let uri = self.require_origin("delete")?;
        let service = self.service()?;
        let response = service
            .execute(Method::DELETE, uri, HeaderMap::new(), None)
            .await?;
        Ok(response.is_success())
    }

    pub fn to_json_string(&self, pretty: bool) -> String {
        if pretty {
            format!("{:#}", self.json)
        } else {
            self.json.to_string()
        }
    }

    /// Drops the payload. Purely local.
    pub fn release(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn detached(json: Value) -> Payload {
        Payload::new(json, None, Weak::new())
    }

    #[test]
    fn test_is_collection_and_size() {
        let payload = detached(json!({
            "Id": "root",
            "Members": [{"@odata.id": "/r/1"}, {"@odata.id": "/r/2"}],
            "Members@odata.count": 2
        }));
        assert!(payload.is_collection());
        assert_eq!(payload.collection_size().unwrap(), 2);

        let plain = detached(json!({"Members": "not an array"}));
        assert!(!plain.is_collection());
        assert!(matches!(plain.collection_size(), Err(RedfishError::TypeError(_))));
    }

    #[test]
    fn test_string_value() {
        assert_eq!(detached(json!("Enabled")).string_value().unwrap(), "Enabled");
        assert_eq!(detached(json!(42)).string_value().unwrap(), "42");
        assert_eq!(detached(json!(true)).string_value().unwrap(), "true");
        assert_eq!(detached(Value::Null).string_value().unwrap(), "null");
        assert!(matches!(
            detached(json!({"State": "Enabled"})).string_value(),
            Err(RedfishError::TypeError(_))
        ));
        assert!(matches!(
            detached(json!([1])).string_value(),
            Err(RedfishError::TypeError(_))
        ));
    }

    #[test]
    fn test_int_value() {
        assert_eq!(detached(json!(-7)).int_value().unwrap(), -7);
        assert_eq!(detached(json!(64.0)).int_value().unwrap(), 64);
        assert!(matches!(detached(json!(1.5)).int_value(), Err(RedfishError::TypeError(_))));
        assert!(matches!(detached(json!("12")).int_value(), Err(RedfishError::TypeError(_))));
        assert!(matches!(
            detached(json!(u64::MAX)).int_value(),
            Err(RedfishError::RangeError(_))
        ));
        assert!(matches!(
            detached(json!(1e19)).int_value(),
            Err(RedfishError::RangeError(_))
        ));
    }

    #[test]
    fn test_serialization_forms() {
        let content = json!({"Id": "1", "Status": {"State": "Enabled", "Health": "OK"}, "Count": [1, 2]});
        let payload = detached(content.clone());

        let compact = payload.to_json_string(false);
        assert!(!compact.contains('\n'));
        assert_eq!(serde_json::from_str::<Value>(&compact).unwrap(), content);

        let pretty = payload.to_json_string(true);
        assert!(pretty.contains("\n  "));
        assert_eq!(serde_json::from_str::<Value>(&pretty).unwrap(), content);

        assert_eq!(payload.to_string(), compact);
        assert_eq!(format!("{:#}", payload), pretty);
    }

    #[test]
    fn test_odata_id_and_next_link() {
        let payload = detached(json!({
            "@odata.id": "/redfish/v1/Systems",
            "Members": [],
            "Members@odata.nextLink": "/redfish/v1/Systems?$skip=2"
        }));
        assert_eq!(payload.odata_id(), Some("/redfish/v1/Systems"));
        assert_eq!(payload.next_link(), Some("/redfish/v1/Systems?$skip=2"));
        assert_eq!(payload.origin(), None);
    }

    /// Any JSON document without floats, nested a few levels deep.
    fn json_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            any::<u64>().prop_map(Value::from),
            any::<String>().prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 64, 8, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
                prop::collection::btree_map(any::<String>(), inner, 0..8)
                    .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn serialization_round_trips(content in json_value()) {
            let payload = detached(content.clone());
            for pretty in [false, true] {
                let text = payload.to_json_string(pretty);
                prop_assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), content.clone());
            }
        }

        #[test]
        fn out_of_range_index_is_index_error(size in 0usize..16, past_end in 0usize..10_000) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let index = size + past_end;
            let result = runtime.block_on(async {
                // No auth and no in-range index, so nothing reaches the network.
                let service = RedfishService::builder("http://127.0.0.1:9")
                    .connect()
                    .await
                    .unwrap();
                let members: Vec<Value> = (0..size)
                    .map(|i| json!({"@odata.id": format!("/r/{}", i)}))
                    .collect();
                let collection = Payload::new(json!({ "Members": members }), None, service.downgrade());
                collection.get_index(index).await
            });
            match result {
                Err(RedfishError::IndexError { index: i, size: s }) => {
                    prop_assert_eq!(i, index);
                    prop_assert_eq!(s, size);
                }
                other => prop_assert!(false, "expected IndexError, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_detached_payload_is_use_after_close() {
        let payload = detached(json!({"Status": {"State": "Enabled"}}));
        assert!(matches!(payload.get("Status").await, Err(RedfishError::UseAfterClose)));
    }

    #[tokio::test]
    async fn test_mutations_require_origin() {
        let payload = detached(json!({"Id": "local"}));
        assert!(matches!(
            payload.patch_string_property("AssetTag", "x").await,
            Err(RedfishError::StateError(_))
        ));
        assert!(matches!(payload.delete().await, Err(RedfishError::StateError(_))));
        assert!(matches!(
            payload.post(&detached(json!({}))).await,
            Err(RedfishError::StateError(_))
        ));
    }
}
