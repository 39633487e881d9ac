use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::form_urlencoded;

use crate::FetchError;

/// Request verb.
///
/// `GET` reads; every other verb writes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
}

impl Method {
    pub fn is_write(&self) -> bool {
        !matches!(self, Method::GET)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::PATCH => "PATCH",
            Method::DELETE => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request handed to a [`Transport`](crate::Transport).
///
/// `path` is relative to the transport's base URL.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Request {
    #[serde(default)]
    pub method: Method,

    #[serde(default)]
    pub path: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// JSON body, sent only with write verbs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_json_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.insert(name.into(), value.to_string());
        self
    }

    /// Attach operation params.
    ///
    /// Write verbs carry params as the JSON body. Read verbs flatten a params
    /// object into query pairs: strings verbatim, other scalars via their JSON
    /// text, nested values as JSON, nulls dropped. `()` and `None` add nothing.
    pub fn with_params<P: Serialize + ?Sized>(mut self, params: &P) -> Result<Self, FetchError> {
        let value = serde_json::to_value(params).map_err(|e| FetchError::Params {
            message: e.to_string(),
        })?;

        if value.is_null() {
            return Ok(self);
        }

        if self.method.is_write() {
            self.body = Some(value);
            return Ok(self);
        }

        let fields = match value {
            Value::Object(fields) => fields,
            other => {
                return Err(FetchError::Params {
                    message: format!(
                        "{} params must serialize to an object, got {}",
                        self.method, other
                    ),
                })
            }
        };

        for (name, field) in fields {
            let text = match field {
                Value::Null => continue,
                Value::String(s) => s,
                other => other.to_string(),
            };
            self.query.insert(name, text);
        }
        Ok(self)
    }

    /// The path with its query string, used to key single-flight reads.
    pub fn target(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish();
        format!("{}?{}", self.path, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Filter {
        status: String,
        limit: u32,
        archived: Option<bool>,
    }

    #[test]
    fn read_params_become_query_pairs() {
        let request = Request::get("/orders")
            .with_params(&Filter {
                status: "open".to_string(),
                limit: 5,
                archived: None,
            })
            .unwrap();

        assert_eq!(request.query.get("status"), Some(&"open".to_string()));
        assert_eq!(request.query.get("limit"), Some(&"5".to_string()));
        assert!(!request.query.contains_key("archived"));
        assert!(request.body.is_none());
    }

    #[test]
    fn write_params_become_body() {
        let request = Request::post("/orders")
            .with_params(&json!({"sku": "a-1", "qty": 2}))
            .unwrap();

        assert_eq!(request.body, Some(json!({"sku": "a-1", "qty": 2})));
        assert!(request.query.is_empty());
    }

    #[test]
    fn unit_params_add_nothing() {
        let request = Request::get("/orders").with_params(&()).unwrap();
        assert!(request.query.is_empty());
        assert!(request.body.is_none());
    }

    #[test]
    fn scalar_read_params_are_rejected() {
        let result = Request::get("/orders").with_params(&42);
        assert!(matches!(result, Err(FetchError::Params { .. })));
    }

    #[test]
    fn target_includes_sorted_query() {
        let request = Request::get("/orders/42")
            .with_query("page", 0)
            .with_query("limit", 10);
        assert_eq!(request.target(), "/orders/42?limit=10&page=0");
        assert_eq!(Request::get("/orders").target(), "/orders");
    }

    #[test]
    fn target_encodes_query_values() {
        let joined = Request::get("/search").with_query("q", "a&b=c");
        let split = Request::get("/search")
            .with_query("q", "a")
            .with_query("b", "c");

        assert_eq!(joined.target(), "/search?q=a%26b%3Dc");
        assert_ne!(joined.target(), split.target());
    }

    #[test]
    fn method_serializes_uppercase() {
        let json = serde_json::to_value(Request::patch("/x")).unwrap();
        assert_eq!(json["method"], "PATCH");
        assert!(Method::DELETE.is_write());
        assert!(!Method::GET.is_write());
    }
}
