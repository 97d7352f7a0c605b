use crate::{
    error::MappingError,
    model::{AttributeData, EntryRecord},
    schema::EntitySchema,
};

///
/// EntityMapping
///
/// Boundary to the external object-mapping framework: conversion between
/// typed entities and raw attribute lists lives behind this trait, never in
/// the persistence core.
///

pub trait EntityMapping {
    type Entity;

    /// Static attribute metadata for the entity type.
    fn schema(&self) -> &EntitySchema;

    /// Distinguished name of an entity instance.
    fn dn(&self, entity: &Self::Entity) -> String;

    fn to_attributes(&self, entity: &Self::Entity) -> Result<Vec<AttributeData>, MappingError>;

    fn from_attributes(&self, record: &EntryRecord) -> Result<Self::Entity, MappingError>;
}
