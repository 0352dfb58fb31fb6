//! Subscription requests and their deduplication keys.
//!
//! A request is a publication name plus an ordered parameter list. Two requests
//! with structurally equal parameters share one [`Fingerprint`], whatever the
//! key order of object-shaped parameters.

use std::fmt::{self, Write as _};

use serde::Serialize;
use serde_json::Value;

use super::error::SubsError;

/// Canonical key derived from a request's name and parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A server-side publication with typed parameters.
///
/// ```ignore
/// struct SalesByShift;
///
/// impl Publication for SalesByShift {
///     const NAME: &'static str = "sales.byShift";
///     type Params = (u32, bool);
/// }
///
/// let request = SubscriptionRequest::typed::<SalesByShift>(&(3, true))?;
/// ```
pub trait Publication {
    const NAME: &'static str;
    type Params: Serialize;
}

/// A request to materialize a named, parameterized subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionRequest {
    name: String,
    params: Vec<Value>,
}

impl SubscriptionRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(name: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Append one parameter.
    pub fn param(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Build a request for a typed publication.
    ///
    /// Params that serialize to an array are spread into the parameter list,
    /// `()`/`null` yields no parameters, anything else is the single parameter.
    pub fn typed<P: Publication>(params: &P::Params) -> Result<Self, SubsError> {
        let encoded =
            serde_json::to_value(params).map_err(|err| SubsError::params(P::NAME, err))?;
        let params = match encoded {
            Value::Array(values) => values,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        Ok(Self::with_params(P::NAME, params))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// An empty name means "do not subscribe".
    pub fn is_noop(&self) -> bool {
        self.name.is_empty()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let mut out = String::with_capacity(self.name.len() + 16);
        out.push('[');
        write_canonical(&mut out, &Value::String(self.name.clone()));
        for param in &self.params {
            out.push(',');
            write_canonical(&mut out, param);
        }
        out.push(']');
        Fingerprint(out)
    }

    /// Human-readable rendering used in log lines: strings quoted, everything
    /// else as JSON.
    pub fn identifier(&self) -> String {
        let mut out = format!("\"{}\"", self.name);
        for param in &self.params {
            out.push_str(", ");
            match param {
                Value::String(text) => {
                    let _ = write!(out, "\"{text}\"");
                }
                other => {
                    let _ = write!(out, "{other}");
                }
            }
        }
        out
    }
}

/// JSON with object keys sorted at every depth.
fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (index, key) in keys.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(out, &Value::String(key.clone()));
                out.push(':');
                if let Some(inner) = map.get(key) {
                    write_canonical(out, inner);
                }
            }
            out.push('}');
        }
        Value::Array(values) => {
            out.push('[');
            for (index, inner) in values.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(out, inner);
            }
            out.push(']');
        }
        scalar => {
            let _ = write!(out, "{scalar}");
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Serialize;
    use serde_json::json;

    use super::*;

    #[test]
    fn equal_params_share_fingerprint() {
        let first = SubscriptionRequest::new("products").param("beer").param(5);
        let second = SubscriptionRequest::new("products").param("beer").param(5);
        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn object_key_order_does_not_matter() {
        let first = SubscriptionRequest::new("sales").param(json!({"shift": 2, "bar": "north"}));
        let second =
            SubscriptionRequest::new("sales").param(json!({"bar": "north", "shift": 2}));
        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn nested_objects_are_canonical() {
        let first = SubscriptionRequest::new("stock")
            .param(json!({"filter": {"b": [1, {"y": 1, "x": 2}], "a": null}}));
        let second = SubscriptionRequest::new("stock")
            .param(json!({"filter": {"a": null, "b": [1, {"x": 2, "y": 1}]}}));
        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn parameter_order_matters() {
        let first = SubscriptionRequest::new("products").param(1).param(2);
        let second = SubscriptionRequest::new("products").param(2).param(1);
        assert_ne!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn name_is_part_of_the_key() {
        assert_ne!(
            SubscriptionRequest::new("a").fingerprint(),
            SubscriptionRequest::new("b").fingerprint()
        );
    }

    #[test]
    fn fingerprint_is_json_array() {
        let request = SubscriptionRequest::new("products").param(json!({"b": 1, "a": "x"}));
        assert_eq!(
            request.fingerprint().as_str(),
            r#"["products",{"a":"x","b":1}]"#
        );
    }

    #[test]
    fn identifier_quotes_strings_only() {
        let request = SubscriptionRequest::new("z")
            .param("north")
            .param(3)
            .param(json!({"open": true}));
        assert_eq!(request.identifier(), r#""z", "north", 3, {"open":true}"#);
    }

    #[test]
    fn empty_name_is_noop() {
        assert!(SubscriptionRequest::new("").is_noop());
        assert!(!SubscriptionRequest::new("products").is_noop());
    }

    struct SalesByShift;

    impl Publication for SalesByShift {
        const NAME: &'static str = "sales.byShift";
        type Params = (u32, bool);
    }

    #[derive(Serialize)]
    struct StockFilter {
        category: &'static str,
    }

    struct StockLevels;

    impl Publication for StockLevels {
        const NAME: &'static str = "stock.levels";
        type Params = StockFilter;
    }

    struct AllProducts;

    impl Publication for AllProducts {
        const NAME: &'static str = "products";
        type Params = ();
    }

    #[test]
    fn typed_tuple_params_are_spread() {
        let request = SubscriptionRequest::typed::<SalesByShift>(&(3, true)).expect("encodes");
        assert_eq!(request.name(), "sales.byShift");
        assert_eq!(request.params(), &[json!(3), json!(true)]);
    }

    #[test]
    fn typed_struct_params_become_single_param() {
        let request = SubscriptionRequest::typed::<StockLevels>(&StockFilter { category: "wine" })
            .expect("encodes");
        assert_eq!(request.params(), &[json!({"category": "wine"})]);
        assert_eq!(
            request.fingerprint(),
            SubscriptionRequest::new("stock.levels")
                .param(json!({"category": "wine"}))
                .fingerprint()
        );
    }

    #[test]
    fn typed_unit_params_are_empty() {
        let request = SubscriptionRequest::typed::<AllProducts>(&()).expect("encodes");
        assert!(request.params().is_empty());
    }
}
