//! Internal `$ref` resolution.
//!
//! A [`Resolver`] is created for one document and passed explicitly to the stages that need it,
//! its cache never outlives the run.

use std::collections::{HashMap, HashSet};

use serde_yaml::Value;

use crate::{error::UnresolvedReferenceError, loader::Document};

/// Keys that give a schema node a shape of its own. A node carrying a `$ref` and none of these
/// is an alias of its target.
const SHAPE_KEYS: [&str; 10] = [
    "enum",
    "const",
    "oneOf",
    "anyOf",
    "allOf",
    "type",
    "properties",
    "additionalProperties",
    "items",
    "prefixItems",
];

/// The concrete node a reference ends up at, with the pointer it was found under
#[derive(Debug, Clone)]
pub struct Resolved<'doc> {
    pub pointer: String,
    pub node: &'doc Value,
}

pub struct Resolver<'doc> {
    root: &'doc Value,
    cache: HashMap<String, Resolved<'doc>>,
}

impl<'doc> Resolver<'doc> {
    pub fn new(document: &'doc Document) -> Self {
        Self {
            root: document.root(),
            cache: HashMap::new(),
        }
    }

    /// Resolves every `$ref` in the document once, in document order. Generated code can't be
    /// partially typed, so the first dangling reference fails the whole run.
    pub fn check_all(&mut self) -> Result<usize, UnresolvedReferenceError> {
        let mut found = vec![];
        collect_refs(self.root, "#".to_string(), &mut found);
        for (reference, at) in found.iter() {
            self.resolve(reference, at)?;
        }
        log::debug!(
            "resolved {} reference(s) to {} distinct target(s)",
            found.len(),
            self.cache.len()
        );
        Ok(found.len())
    }

    /// Resolves `reference` (found at pointer `at`), following alias chains to the first node
    /// with a shape of its own.
    pub fn resolve(&mut self, reference: &str, at: &str) -> Result<Resolved<'doc>, UnresolvedReferenceError> {
        if let Some(resolved) = self.cache.get(reference) {
            return Ok(resolved.clone());
        }
        let unresolved = |reason: &str| UnresolvedReferenceError {
            reference: reference.to_string(),
            at: at.to_string(),
            reason: reason.to_string(),
        };
        let mut visited = HashSet::new();
        let mut current = reference.to_string();
        let resolved = loop {
            if !current.starts_with('#') {
                return Err(unresolved("only references inside the document are supported"));
            }
            if !visited.insert(current.clone()) {
                return Err(unresolved("the reference chain loops without reaching a schema"));
            }
            let node = lookup(self.root, &current).ok_or_else(|| unresolved("no node at this pointer"))?;
            match alias_target(node) {
                Some(next) => current = next.to_string(),
                None => {
                    break Resolved {
                        pointer: current,
                        node,
                    }
                }
            }
        };
        self.cache.insert(reference.to_string(), resolved.clone());
        Ok(resolved)
    }
}

/// Returns the `$ref` of a node that has no shape of its own
pub fn alias_target(node: &Value) -> Option<&str> {
    let mapping = node.as_mapping()?;
    let target = mapping.get("$ref")?.as_str()?;
    if SHAPE_KEYS.iter().any(|key| mapping.contains_key(*key)) {
        None
    } else {
        Some(target)
    }
}

fn collect_refs(node: &Value, pointer: String, found: &mut Vec<(String, String)>) {
    match node {
        Value::Mapping(mapping) => {
            if let Some(reference) = mapping.get("$ref").and_then(Value::as_str) {
                found.push((reference.to_string(), pointer.clone()));
            }
            for (key, value) in mapping {
                if let Some(key) = key_segment(key) {
                    collect_refs(value, child_pointer(&pointer, &key), found);
                }
            }
        }
        Value::Sequence(items) => {
            for (index, item) in items.iter().enumerate() {
                collect_refs(item, child_pointer(&pointer, &index.to_string()), found);
            }
        }
        Value::Tagged(tagged) => collect_refs(&tagged.value, pointer, found),
        _ => {}
    }
}

/// Renders a mapping key as a pointer segment. YAML allows numeric keys (`200:` in responses).
pub fn key_segment(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

pub fn unescape(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

pub fn child_pointer(parent: &str, segment: &str) -> String {
    format!("{}/{}", parent, escape(segment))
}

/// Looks up a `#/a/b` pointer in the tree
pub fn lookup<'doc>(root: &'doc Value, pointer: &str) -> Option<&'doc Value> {
    let path = pointer.strip_prefix('#')?;
    if path.is_empty() {
        return Some(root);
    }
    let path = path.strip_prefix('/')?;
    path.split('/').try_fold(root, |node, segment| {
        let segment = unescape(segment);
        match node {
            Value::Mapping(mapping) => mapping
                .iter()
                .find(|(key, _)| key_segment(key).as_deref() == Some(segment.as_str()))
                .map(|(_, value)| value),
            Value::Sequence(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    })
}

/// The last segment of a pointer, unescaped
pub fn last_segment(pointer: &str) -> String {
    unescape(pointer.rsplit('/').next().unwrap_or(pointer))
}
