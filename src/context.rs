//! Layered variable bindings.
//!
//! A [`Context`] is one immutable frame. Child frames are full copies of the
//! parent with new bindings laid over them, so nothing a child does can reach
//! back into its parent.

use std::collections::HashMap;

use crate::value::Value;

/// Ordered name/value pairs, e.g. include arguments or declarations in
/// source order. Later entries win over earlier ones when applied.
pub type Bindings = Vec<(String, Value)>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    vars: HashMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style binding for constructing a base context.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// New frame with `bindings` laid over a copy of this one.
    pub fn child<'b, I>(&self, bindings: I) -> Context
    where
        I: IntoIterator<Item = &'b (String, Value)>,
    {
        let mut vars = self.vars.clone();
        for (name, value) in bindings {
            vars.insert(name.clone(), value.clone());
        }
        Context { vars }
    }

    /// New frame with every binding of `other` laid over this one.
    pub fn overlay(&self, other: &Context) -> Context {
        let mut vars = self.vars.clone();
        vars.extend(other.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        Context { vars }
    }

    /// New frame binding a single name, as used for loop variables.
    pub fn bind(&self, name: &str, value: Value) -> Context {
        let mut vars = self.vars.clone();
        vars.insert(name.to_string(), value);
        Context { vars }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Context {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Context {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()
    }
}
