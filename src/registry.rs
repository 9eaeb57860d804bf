//! Schema Registry
//!
//! Write-once store mapping qualified interface names to schemas.
//!
//! Registration happens in batches. Each batch is resolved in two passes:
//! first every schema in the batch is collected and checked on its own, then
//! nested references are resolved against the registry plus the batch, so
//! forward references inside one batch succeed. The reference graph of the
//! batch is checked for cycles before anything is inserted; a failing batch
//! leaves the registry untouched.
//!
//! After initialisation the registry is frozen behind an `Arc` and read
//! concurrently without locking.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use petgraph::algo::{kosaraju_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::checksum::TypeHash;
use crate::codec::min_encoded_size;
use crate::error::RegistryError;
use crate::schema::{validate_field, FieldType, Schema, SchemaResolver};

/// A registered schema with its registration metadata
#[derive(Debug, Clone)]
pub struct SchemaEntry {
    pub schema: Schema,
    /// Hash over the schema and everything it references
    pub type_hash: TypeHash,
    pub registered_at: DateTime<Utc>,
}

/// The interface registry
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    entries: HashMap<String, SchemaEntry>,
    /// Qualified names in registration order
    order: Vec<String>,
}

fn qualified_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z][a-z0-9_]*/(msg|srv|action)/[A-Z][A-Za-z0-9_]*$")
            .expect("qualified name pattern is valid")
    })
}

fn field_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("field name pattern is valid"))
}

/// Registry contents plus a batch under registration
struct BatchView<'a> {
    registry: &'a SchemaRegistry,
    batch: &'a HashMap<String, Schema>,
}

impl SchemaResolver for BatchView<'_> {
    fn resolve(&self, name: &str) -> Option<&Schema> {
        self.batch.get(name).or_else(|| self.registry.lookup(name))
    }
}

impl SchemaResolver for SchemaRegistry {
    fn resolve(&self, name: &str) -> Option<&Schema> {
        self.lookup(name)
    }
}

impl SchemaRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single schema; its references must already be registered
    pub fn register(&mut self, schema: Schema) -> Result<(), RegistryError> {
        self.register_batch(vec![schema])
    }

    /// Register a batch of schemas atomically
    ///
    /// References may point anywhere in the registry or the batch. On error
    /// nothing from the batch becomes visible.
    pub fn register_batch(&mut self, schemas: Vec<Schema>) -> Result<(), RegistryError> {
        let result = self.try_register_batch(schemas);
        if let Err(ref e) = result {
            warn!(error = %e, "rejected interface batch");
        }
        result
    }

    fn try_register_batch(&mut self, schemas: Vec<Schema>) -> Result<(), RegistryError> {
        // Pass 1: collect
        let mut batch: HashMap<String, Schema> = HashMap::with_capacity(schemas.len());
        let mut batch_order = Vec::with_capacity(schemas.len());
        for schema in schemas {
            if self.entries.contains_key(&schema.name) || batch.contains_key(&schema.name) {
                return Err(RegistryError::DuplicateName { name: schema.name });
            }
            check_structure(&schema)?;
            batch_order.push(schema.name.clone());
            batch.insert(schema.name.clone(), schema);
        }

        // Pass 2: resolve references
        for name in &batch_order {
            let schema = &batch[name];
            for target in schema.references() {
                if !batch.contains_key(target) && !self.entries.contains_key(target) {
                    return Err(RegistryError::UnresolvedReference {
                        from: name.clone(),
                        target: target.to_string(),
                        suggestion: self.suggest(target, batch.keys()),
                    });
                }
            }
        }

        // Registered schemas can never point into the batch, so cycles are
        // confined to the batch's own reference graph.
        let order = dependency_order(&batch, &batch_order)?;

        let view = BatchView {
            registry: self,
            batch: &batch,
        };
        for name in &batch_order {
            check_sequence_widths(&batch[name], &view)?;
            check_defaults(&batch[name], &view)?;
        }

        let mut hashes: HashMap<String, TypeHash> = HashMap::with_capacity(order.len());
        for name in &order {
            let hash = TypeHash::of_schema(&batch[name], |target| {
                hashes
                    .get(target)
                    .cloned()
                    .or_else(|| self.entries.get(target).map(|e| e.type_hash.clone()))
            });
            hashes.insert(name.clone(), hash);
        }

        let count = batch_order.len();
        let now = Utc::now();
        for name in batch_order {
            if let (Some(schema), Some(type_hash)) = (batch.remove(&name), hashes.remove(&name)) {
                debug!(interface = %name, kind = %schema.kind, hash = %type_hash, "registered interface");
                self.entries.insert(
                    name.clone(),
                    SchemaEntry {
                        schema,
                        type_hash,
                        registered_at: now,
                    },
                );
                self.order.push(name);
            }
        }
        info!(count, total = self.entries.len(), "registered interface batch");
        Ok(())
    }

    /// Look up a schema by qualified name
    pub fn lookup(&self, name: &str) -> Option<&Schema> {
        self.entries.get(name).map(|e| &e.schema)
    }

    /// Look up a schema together with its registration metadata
    pub fn entry(&self, name: &str) -> Option<&SchemaEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Qualified names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Registered entries in registration order
    pub fn entries(&self) -> impl Iterator<Item = &SchemaEntry> {
        self.order.iter().filter_map(|name| self.entries.get(name))
    }

    /// Search interface names (fuzzy), best match first
    pub fn search(&self, query: &str, limit: usize) -> Vec<&str> {
        let matcher = SkimMatcherV2::default();
        let mut results: Vec<(i64, &str)> = self
            .names()
            .filter_map(|name| matcher.fuzzy_match(name, query).map(|score| (score, name)))
            .collect();

        // Sort by score descending, then name for stable output
        results.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));

        results.into_iter().take(limit).map(|(_, name)| name).collect()
    }

    /// Transitive dependencies of an interface, dependencies first
    pub fn dependencies(&self, name: &str) -> Vec<&str> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        if let Some(schema) = self.lookup(name) {
            for target in schema.references() {
                self.collect_dependencies(target, &mut seen, &mut out);
            }
        }
        out
    }

    fn collect_dependencies<'a>(&'a self, name: &str, seen: &mut HashSet<&'a str>, out: &mut Vec<&'a str>) {
        let Some(entry) = self.entries.get_key_value(name) else {
            return;
        };
        let (key, entry) = entry;
        if !seen.insert(key.as_str()) {
            return;
        }
        for target in entry.schema.references() {
            self.collect_dependencies(target, seen, out);
        }
        out.push(key.as_str());
    }

    /// End the initialisation phase and share the registry for reading
    pub fn freeze(self) -> Arc<Self> {
        info!(interfaces = self.entries.len(), "schema registry frozen");
        Arc::new(self)
    }

    fn suggest<'a>(&'a self, target: &str, batch: impl Iterator<Item = &'a String>) -> Option<String> {
        let matcher = SkimMatcherV2::default();
        let short = target.rsplit('/').next().unwrap_or(target);
        self.order
            .iter()
            .chain(batch)
            .filter_map(|candidate| {
                matcher
                    .fuzzy_match(candidate, short)
                    .map(|score| (score, candidate))
            })
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(a.1)))
            .map(|(_, name)| name.clone())
    }
}

fn invalid(schema: &Schema, reason: impl Into<String>) -> RegistryError {
    RegistryError::InvalidSchema {
        name: schema.name.clone(),
        reason: reason.into(),
    }
}

/// Checks that need nothing but the schema itself
fn check_structure(schema: &Schema) -> Result<(), RegistryError> {
    if !qualified_name_pattern().is_match(&schema.name) {
        return Err(invalid(schema, "name must look like package/{msg|srv|action}/TypeName"));
    }
    let namespace = schema.name.split('/').nth(1).unwrap_or_default();
    if namespace != schema.kind.namespace() {
        return Err(invalid(
            schema,
            format!("a {} must live under /{}/", schema.kind, schema.kind.namespace()),
        ));
    }

    let mut seen = HashSet::new();
    for field in &schema.fields {
        if !field_name_pattern().is_match(&field.name) {
            return Err(invalid(schema, format!("invalid field name '{}'", field.name)));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(invalid(schema, format!("duplicate field '{}'", field.name)));
        }
        check_field_type(schema, &field.name, &field.field_type)?;
    }
    Ok(())
}

fn check_field_type(schema: &Schema, field: &str, field_type: &FieldType) -> Result<(), RegistryError> {
    match field_type {
        FieldType::Enum(def) => {
            if def.values.is_empty() {
                return Err(invalid(schema, format!("enum {} on '{}' has no members", def.name, field)));
            }
            let mut names = HashSet::new();
            let mut values = HashSet::new();
            for member in &def.values {
                if !names.insert(member.name.as_str()) {
                    return Err(invalid(
                        schema,
                        format!("enum {} declares '{}' twice", def.name, member.name),
                    ));
                }
                if !values.insert(member.value) {
                    return Err(invalid(
                        schema,
                        format!("enum {} reuses value {}", def.name, member.value),
                    ));
                }
                if !def.repr.contains(member.value) {
                    return Err(invalid(
                        schema,
                        format!("enum {} value {} does not fit {}", def.name, member.value, def.repr),
                    ));
                }
            }
            Ok(())
        }
        FieldType::FixedArray { elem, len } => {
            if *len == 0 {
                return Err(invalid(schema, format!("fixed array '{}' has zero length", field)));
            }
            check_field_type(schema, field, elem)
        }
        FieldType::Sequence { elem } => check_field_type(schema, field, elem),
        _ => Ok(()),
    }
}

/// Sequence elements must occupy at least one byte on the wire
fn check_sequence_widths(schema: &Schema, resolver: &dyn SchemaResolver) -> Result<(), RegistryError> {
    fn zero_width_sequence(field_type: &FieldType, resolver: &dyn SchemaResolver) -> bool {
        match field_type {
            FieldType::Sequence { elem } => min_encoded_size(elem, resolver) == 0,
            FieldType::FixedArray { elem, .. } => zero_width_sequence(elem, resolver),
            _ => false,
        }
    }

    for field in &schema.fields {
        if zero_width_sequence(&field.field_type, resolver) {
            return Err(invalid(
                schema,
                format!("sequence '{}' has zero-width elements", field.name),
            ));
        }
    }
    Ok(())
}

fn check_defaults(schema: &Schema, resolver: &dyn SchemaResolver) -> Result<(), RegistryError> {
    for field in &schema.fields {
        if let Some(default) = &field.default {
            validate_field(&field.field_type, default, resolver, &field.name)
                .map_err(|e| invalid(schema, format!("default for '{}' is invalid: {}", field.name, e)))?;
        }
    }
    Ok(())
}

/// Order the batch so dependencies come first, rejecting cycles
fn dependency_order(
    batch: &HashMap<String, Schema>,
    batch_order: &[String],
) -> Result<Vec<String>, RegistryError> {
    let mut graph: DiGraph<&str, ()> = DiGraph::with_capacity(batch.len(), batch.len() * 2);
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::with_capacity(batch.len());
    for name in batch_order {
        nodes.insert(name.as_str(), graph.add_node(name.as_str()));
    }

    // Edges point from dependency to dependent
    for name in batch_order {
        for target in batch[name].references() {
            if let Some(&dep) = nodes.get(target) {
                graph.add_edge(dep, nodes[name.as_str()], ());
            }
        }
    }

    for scc in kosaraju_scc(&graph) {
        let self_ref = scc.len() == 1 && graph.contains_edge(scc[0], scc[0]);
        if scc.len() > 1 || self_ref {
            let mut members: Vec<String> = scc.iter().map(|idx| graph[*idx].to_string()).collect();
            members.sort();
            return Err(RegistryError::CyclicReference { members });
        }
    }

    let sorted = toposort(&graph, None).map_err(|cycle| RegistryError::CyclicReference {
        members: vec![graph[cycle.node_id()].to_string()],
    })?;
    Ok(sorted.into_iter().map(|idx| graph[idx].to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EnumDef, FieldDef, IntKind, SchemaKind};
    use crate::value::Value;

    fn msg(name: &str, fields: Vec<FieldDef>) -> Schema {
        Schema::message(name, fields)
    }

    #[test]
    fn test_create_registry() {
        let registry = SchemaRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.lookup("amr/msg/Anything").is_none());
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(msg("amr/msg/BatteryInfo", vec![FieldDef::new("percentage", FieldType::UInt8)]))
            .unwrap();
        assert_eq!(registry.len(), 1);
        let entry = registry.entry("amr/msg/BatteryInfo").unwrap();
        assert_eq!(entry.schema.fields.len(), 1);
        assert!(entry.type_hash.as_str().starts_with("RIHS01_"));
    }

    #[test]
    fn test_dependency_first_single_registration() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(msg("geo/msg/Point", vec![FieldDef::new("x", FieldType::Float64)]))
            .unwrap();
        registry
            .register(msg("geo/msg/Line", vec![
                FieldDef::new("points", FieldType::fixed_array(FieldType::nested("geo/msg/Point"), 2)),
            ]))
            .unwrap();
        assert_eq!(registry.dependencies("geo/msg/Line"), vec!["geo/msg/Point"]);
    }

    #[test]
    fn test_self_reference_is_cyclic() {
        let mut registry = SchemaRegistry::new();
        let err = registry
            .register(msg("tree/msg/Node", vec![
                FieldDef::new("children", FieldType::sequence(FieldType::nested("tree/msg/Node"))),
            ]))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::CyclicReference {
                members: vec!["tree/msg/Node".to_string()]
            }
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unresolved_reference_suggests_name() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(msg("amr/msg/BatteryInfo", vec![FieldDef::new("percentage", FieldType::UInt8)]))
            .unwrap();
        let err = registry
            .register(msg("amr/msg/RobotStatus", vec![
                FieldDef::new("battery", FieldType::nested("amr/msg/BateryInfo")),
            ]))
            .unwrap_err();
        match err {
            RegistryError::UnresolvedReference { target, suggestion, .. } => {
                assert_eq!(target, "amr/msg/BateryInfo");
                assert_eq!(suggestion.as_deref(), Some("amr/msg/BatteryInfo"));
            }
            other => panic!("Expected UnresolvedReference, got {:?}", other),
        }
    }

    #[test]
    fn test_structural_checks() {
        let mut registry = SchemaRegistry::new();

        let bad_name = registry.register(msg("Amr/BatteryInfo", vec![]));
        assert!(matches!(bad_name, Err(RegistryError::InvalidSchema { .. })));

        let dup_field = registry.register(msg("amr/msg/Twice", vec![
            FieldDef::new("a", FieldType::Bool),
            FieldDef::new("a", FieldType::Bool),
        ]));
        assert!(matches!(dup_field, Err(RegistryError::InvalidSchema { .. })));

        let wide_enum = registry.register(msg("amr/msg/Wide", vec![FieldDef::new(
            "mode",
            FieldType::Enum(EnumDef::new("Mode", IntKind::UInt8, &[("BIG", 300)])),
        )]));
        assert!(matches!(wide_enum, Err(RegistryError::InvalidSchema { .. })));

        let wrong_namespace = registry.register(Schema::new(
            "amr/msg/Mapping_Request",
            SchemaKind::ServiceRequest,
            vec![],
        ));
        assert!(matches!(wrong_namespace, Err(RegistryError::InvalidSchema { .. })));

        let bad_default = registry.register(msg("amr/msg/Defaulted", vec![
            FieldDef::new("level", FieldType::UInt8).with_default(Value::from("high")),
        ]));
        assert!(matches!(bad_default, Err(RegistryError::InvalidSchema { .. })));

        assert!(registry.is_empty());
    }

    #[test]
    fn test_sequence_of_empty_message_rejected() {
        let mut registry = SchemaRegistry::new();
        let result = registry.register_batch(vec![
            msg("amr/msg/Marker", vec![]),
            msg("amr/msg/MarkerList", vec![FieldDef::new(
                "markers",
                FieldType::sequence(FieldType::nested("amr/msg/Marker")),
            )]),
        ]);
        match result {
            Err(RegistryError::InvalidSchema { reason, .. }) => assert!(reason.contains("zero-width")),
            other => panic!("Expected InvalidSchema, got {:?}", other),
        }
        assert!(registry.is_empty());

        // A registered empty message is caught the same way
        registry.register(msg("amr/msg/Marker", vec![])).unwrap();
        let nested = registry.register(msg("amr/msg/MarkerGrid", vec![FieldDef::new(
            "rows",
            FieldType::fixed_array(FieldType::sequence(FieldType::nested("amr/msg/Marker")), 2),
        )]));
        assert!(matches!(nested, Err(RegistryError::InvalidSchema { .. })));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_search() {
        let mut registry = SchemaRegistry::new();
        registry
            .register_batch(vec![
                msg("amr/msg/BatteryInfo", vec![]),
                msg("amr/msg/RobotStatus", vec![]),
                msg("amr/msg/MapInfo", vec![]),
            ])
            .unwrap();
        let hits = registry.search("battery", 5);
        assert_eq!(hits.first().copied(), Some("amr/msg/BatteryInfo"));
    }

    #[test]
    fn test_frozen_registry_is_shareable() {
        fn assert_send_sync<T: Send + Sync>(_: &T) {}
        let registry = SchemaRegistry::new().freeze();
        assert_send_sync(&registry);
    }
}
