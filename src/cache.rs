//! Resource-path object caches.
//!
//! An [`ObjectCache`] answers "which locally cached entities belong to this
//! resource path?". The loader asks it before a request is sent so that,
//! once the response is mapped, anything that did not come back can be
//! deleted as stale.
//!
//! The default strategy knows no paths. [`RoutedObjectCache`] matches paths
//! against templates such as `/users/:user_id/posts` and turns the captured
//! parameters into a store predicate.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::entity::{Entity, EntityType};
use crate::storage::{ObjectStore, Predicate, StoreError};
use crate::value::Value;

/// Strategy that lists cached entities associated with a resource path.
///
/// Implementations must be idempotent and side-effect free.
pub trait ObjectCache: Send + Sync {
    fn objects_for_resource_path(
        &self,
        resource_path: &str,
        store: &dyn ObjectStore,
    ) -> Result<Vec<Entity>, StoreError>;
}

/// Knows no resource paths; every lookup is empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyObjectCache;

impl ObjectCache for EmptyObjectCache {
    fn objects_for_resource_path(
        &self,
        _resource_path: &str,
        _store: &dyn ObjectStore,
    ) -> Result<Vec<Entity>, StoreError> {
        Ok(Vec::new())
    }
}

/// Parameters captured from a resource path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(HashMap<String, String>);

impl PathParams {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Parameter as a value: integers when the segment is all digits,
    /// strings otherwise, null when absent.
    #[must_use]
    pub fn value(&self, name: &str) -> Value {
        match self.get(name) {
            None => Value::Null,
            Some(raw) => raw
                .parse::<i64>()
                .map_or_else(|_| Value::String(raw.to_string()), Value::Int),
        }
    }
}

/// A resource path template with `:name` placeholders.
///
/// Placeholders match exactly one non-empty path segment. A trailing slash
/// and a query string on the matched path are ignored.
#[derive(Debug, Clone)]
pub struct ResourcePathPattern {
    template: String,
    regex: Regex,
    params: Vec<String>,
}

impl ResourcePathPattern {
    /// # Errors
    /// `StoreError::InvalidPredicate` for blank templates, unnamed or
    /// repeated placeholders.
    pub fn parse(template: &str) -> Result<Self, StoreError> {
        let trimmed = template.trim().trim_end_matches('/');
        if trimmed.is_empty() && !template.trim().starts_with('/') {
            return Err(StoreError::InvalidPredicate(
                "resource path template cannot be empty".to_string(),
            ));
        }

        let mut params = Vec::new();
        let mut source = String::from("^");
        for (idx, segment) in trimmed.split('/').enumerate() {
            if idx > 0 {
                source.push('/');
            }
            if let Some(name) = segment.strip_prefix(':') {
                let valid = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                    && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
                if !valid {
                    return Err(StoreError::InvalidPredicate(format!(
                        "invalid placeholder '{segment}' in '{template}'"
                    )));
                }
                if params.iter().any(|p| p == name) {
                    return Err(StoreError::InvalidPredicate(format!(
                        "placeholder '{name}' repeated in '{template}'"
                    )));
                }
                source.push_str(&format!("(?P<{name}>[^/?#]+)"));
                params.push(name.to_string());
            } else {
                source.push_str(&regex::escape(segment));
            }
        }
        source.push_str("/?$");

        let regex = Regex::new(&source)
            .map_err(|e| StoreError::InvalidPredicate(format!("bad template '{template}': {e}")))?;

        Ok(Self {
            template: template.to_string(),
            regex,
            params,
        })
    }

    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Captured parameters if `resource_path` matches.
    #[must_use]
    pub fn matches(&self, resource_path: &str) -> Option<PathParams> {
        let path = resource_path
            .split(['?', '#'])
            .next()
            .unwrap_or(resource_path);
        let caps = self.regex.captures(path)?;
        let params = self
            .params
            .iter()
            .filter_map(|name| caps.name(name).map(|m| (name.clone(), m.as_str().to_string())))
            .collect();
        Some(PathParams(params))
    }
}

type PredicateFn = dyn Fn(&PathParams) -> Predicate + Send + Sync;

struct Route {
    pattern: ResourcePathPattern,
    predicate: Arc<PredicateFn>,
}

/// Object cache driven by resource path templates.
///
/// Routes are tried in registration order; the first match wins. Paths no
/// route matches yield no cached objects.
///
/// # Examples
///
/// ```
/// use modelsync::cache::{ObjectCache, RoutedObjectCache};
/// use modelsync::{InMemoryObjectStore, Predicate};
///
/// let cache = RoutedObjectCache::new("Post")
///     .route("/users/:user_id/posts", |p| Predicate::eq("user_id", p.value("user_id")))
///     .unwrap();
///
/// let store = InMemoryObjectStore::new();
/// assert!(cache.objects_for_resource_path("/users/42/posts", &store).unwrap().is_empty());
/// ```
pub struct RoutedObjectCache {
    entity_type: EntityType,
    routes: Vec<Route>,
}

impl RoutedObjectCache {
    #[must_use]
    pub fn new(entity_type: impl Into<EntityType>) -> Self {
        Self {
            entity_type: entity_type.into(),
            routes: Vec::new(),
        }
    }

    /// Adds a route.
    ///
    /// # Errors
    /// See [`ResourcePathPattern::parse`].
    pub fn route<F>(mut self, template: &str, predicate: F) -> Result<Self, StoreError>
    where
        F: Fn(&PathParams) -> Predicate + Send + Sync + 'static,
    {
        self.routes.push(Route {
            pattern: ResourcePathPattern::parse(template)?,
            predicate: Arc::new(predicate),
        });
        Ok(self)
    }

    #[must_use]
    pub const fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    /// Predicate for `resource_path`, if any route matches.
    #[must_use]
    pub fn predicate_for(&self, resource_path: &str) -> Option<Predicate> {
        self.routes.iter().find_map(|route| {
            route
                .pattern
                .matches(resource_path)
                .map(|params| (route.predicate)(&params))
        })
    }
}

impl fmt::Debug for RoutedObjectCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutedObjectCache")
            .field("entity_type", &self.entity_type)
            .field(
                "routes",
                &self.routes.iter().map(|r| r.pattern.template()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ObjectCache for RoutedObjectCache {
    fn objects_for_resource_path(
        &self,
        resource_path: &str,
        store: &dyn ObjectStore,
    ) -> Result<Vec<Entity>, StoreError> {
        match self.predicate_for(resource_path) {
            Some(predicate) => store.find_many(&self.entity_type, &predicate),
            None => Ok(Vec::new()),
        }
    }
}
