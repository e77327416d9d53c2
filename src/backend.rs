//! Access to backend objects.
//!
//! The engine never inspects backend objects directly. Every read and write
//! goes through the [`Backend`] trait, one path segment at a time. A segment
//! may be a stored field or a computed one; implementors decide.
//!
//! `serde_json::Value` implements [`Backend`] so JSON documents can be used as
//! backend objects without any glue code.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::MappingError;
use crate::types::json_type_name;

/// Shared handle to a backend object.
pub type ObjectRef = Arc<dyn Backend>;

/// Capability the mapping engine needs from a backend object.
pub trait Backend: fmt::Debug + Send + Sync + 'static {
    /// Read one path segment. `None` when the segment is absent or null.
    fn get(&self, segment: &str) -> Option<Node>;

    /// Assign one path segment.
    fn set(&mut self, segment: &str, node: Node) -> Result<(), MappingError>;

    /// Mutable access to a child object, used to reach the parent of a write target.
    fn child_mut(&mut self, segment: &str) -> Option<&mut dyn Backend>;

    /// Plain JSON view of this object, if it has one.
    ///
    /// Needed when an object is assigned into a JSON backend.
    fn to_value(&self) -> Option<Value> {
        None
    }
}

/// A value read from, or written to, one segment of a backend object.
#[derive(Debug, Clone)]
pub enum Node {
    /// Scalar, list or map data.
    Value(Value),
    /// A single related or embedded object.
    Object(ObjectRef),
    /// An ordered collection of related or embedded objects.
    List(Vec<ObjectRef>),
}

impl Node {
    /// Interpret the node as plain data.
    ///
    /// Objects without a JSON view yield `None`.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Node::Value(value) => Some(value),
            Node::Object(object) => object.to_value(),
            Node::List(objects) => objects
                .iter()
                .map(|o| o.to_value())
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
        }
    }

    /// Interpret the node as one or more related objects.
    ///
    /// JSON objects and arrays are wrapped as JSON backends. Any other scalar is
    /// rejected with its type name.
    pub fn into_related(self) -> Result<Related, &'static str> {
        match self {
            Node::Object(object) => Ok(Related::One(object)),
            Node::List(objects) => Ok(Related::Many(objects)),
            Node::Value(Value::Object(map)) => Ok(Related::One(Arc::new(Value::Object(map)))),
            Node::Value(Value::Array(items)) => Ok(Related::Many(
                items
                    .into_iter()
                    .map(|item| Arc::new(item) as ObjectRef)
                    .collect(),
            )),
            Node::Value(other) => Err(json_type_name(&other)),
        }
    }
}

/// Related backend object(s) of a relationship slot.
#[derive(Debug, Clone)]
pub enum Related {
    One(ObjectRef),
    Many(Vec<ObjectRef>),
}

/// Resolve a dot path by reading each segment in turn.
///
/// Short-circuits to `None` as soon as a segment is absent.
pub fn read_path(root: &dyn Backend, path: &[String]) -> Option<Node> {
    let (first, rest) = path.split_first()?;
    let mut current = root.get(first)?;
    for segment in rest {
        current = match current {
            Node::Object(object) => object.get(segment)?,
            Node::Value(value) => Backend::get(&value, segment)?,
            Node::List(_) => return None,
        };
    }
    Some(current)
}

/// Walk all but the last segment of `path` mutably.
///
/// Returns the object owning the final segment.
pub fn parent_mut<'a>(root: &'a mut dyn Backend, path: &[String]) -> Option<&'a mut dyn Backend> {
    let (_, parents) = path.split_last()?;
    let mut current = root;
    for segment in parents {
        current = current.child_mut(segment)?;
    }
    Some(current)
}

/// Split a dot-delimited path into segments.
pub fn split_path(path: &str) -> Vec<String> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl Backend for Value {
    fn get(&self, segment: &str) -> Option<Node> {
        match self.as_object()?.get(segment)? {
            Value::Null => None,
            value => Some(Node::Value(value.clone())),
        }
    }

    fn set(&mut self, segment: &str, node: Node) -> Result<(), MappingError> {
        let actual = json_type_name(self);
        let Some(map) = self.as_object_mut() else {
            return Err(MappingError::Unassignable {
                segment: segment.to_string(),
                reason: format!("target is {}, not an object", actual),
            });
        };
        let value = node.into_value().ok_or_else(|| MappingError::Unassignable {
            segment: segment.to_string(),
            reason: "assigned object has no JSON representation".to_string(),
        })?;
        map.insert(segment.to_string(), value);
        Ok(())
    }

    fn child_mut(&mut self, segment: &str) -> Option<&mut dyn Backend> {
        self.as_object_mut()?
            .get_mut(segment)
            .filter(|child| child.is_object())
            .map(|child| child as &mut dyn Backend)
    }

    fn to_value(&self) -> Option<Value> {
        Some(self.clone())
    }
}
