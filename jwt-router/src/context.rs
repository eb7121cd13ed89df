//! Per-request storage for resolved entities

use crate::entity::EntityTuple;
use axum::extract::FromRequestParts;
use http::request::Parts;
use std::convert::Infallible;

/// Entities resolved for the current request, grouped by table name.
///
/// Created fresh by the router for every authorized request and handed to
/// handlers through the request extensions. Groups and the tuples inside
/// them keep the order in which they were published.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    groups: Vec<(String, Vec<EntityTuple>)>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&mut self, table_name: &str, entity: EntityTuple) {
        match self.groups.iter_mut().find(|(name, _)| name == table_name) {
            Some((_, entities)) => entities.push(entity),
            None => self.groups.push((table_name.to_string(), vec![entity])),
        }
    }

    /// Entities published under `table_name`, empty when there are none
    pub fn entities(&self, table_name: &str) -> &[EntityTuple] {
        self.groups
            .iter()
            .find(|(name, _)| name == table_name)
            .map(|(_, entities)| entities.as_slice())
            .unwrap_or_default()
    }

    pub fn first(&self, table_name: &str) -> Option<&EntityTuple> {
        self.entities(table_name).first()
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[EntityTuple])> {
        self.groups
            .iter()
            .map(|(name, entities)| (name.as_str(), entities.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Extracts the request's context; routes that were not authorized through
/// a token get an empty one.
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default())
    }
}
