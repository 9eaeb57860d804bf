//! Interface manifests
//!
//! The declarative schema source: one JSON document per package listing its
//! messages, services (request/response blocks) and actions
//! (goal/feedback/result blocks).
//!
//! ```json
//! {
//!   "package": "amr_interfaces",
//!   "version": "0.1.0",
//!   "messages": [
//!     { "name": "BatteryInfo", "fields": [
//!       { "name": "percentage", "type": { "kind": "uint8" } },
//!       { "name": "is_charging", "type": { "kind": "bool" } }
//!     ] }
//!   ],
//!   "services": [
//!     { "name": "SaveMap",
//!       "request":  [ { "name": "map_name", "type": { "kind": "string" } } ],
//!       "response": [ { "name": "success",  "type": { "kind": "bool" } } ] }
//!   ]
//! }
//! ```
//!
//! Services expand to `pkg/srv/Name_Request` and `pkg/srv/Name_Response`,
//! actions to `pkg/action/Name_Goal`, `_Feedback` and `_Result`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::InterfacesConfig;
use crate::contract::{bind_action_by_name, bind_service_by_name, ActionContract, ServiceContract};
use crate::error::{InterfaceError, Result};
use crate::registry::SchemaRegistry;
use crate::schema::{FieldDef, FieldType, Schema, SchemaKind};
use crate::value::field_from_json;

/// One field as written in a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSpec {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    #[serde(default)]
    pub request: Vec<FieldSpec>,
    #[serde(default)]
    pub response: Vec<FieldSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    #[serde(default)]
    pub goal: Vec<FieldSpec>,
    #[serde(default)]
    pub feedback: Vec<FieldSpec>,
    #[serde(default)]
    pub result: Vec<FieldSpec>,
}

/// All interfaces declared by one package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceManifest {
    pub package: String,
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub messages: Vec<MessageSpec>,
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
}

impl InterfaceManifest {
    /// Parse a manifest from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a manifest file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| InterfaceError::InvalidManifest {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Qualified name of an interface declared by this package
    pub fn qualified_name(&self, kind: SchemaKind, name: &str) -> String {
        format!("{}/{}/{}{}", self.package, kind.namespace(), name, kind.suffix())
    }

    /// Qualified service names (without request/response suffix)
    pub fn service_names(&self) -> Vec<String> {
        self.services
            .iter()
            .map(|s| format!("{}/srv/{}", self.package, s.name))
            .collect()
    }

    /// Qualified action names (without goal/feedback/result suffix)
    pub fn action_names(&self) -> Vec<String> {
        self.actions
            .iter()
            .map(|a| format!("{}/action/{}", self.package, a.name))
            .collect()
    }

    /// Expand every block into a schema
    pub fn schemas(&self) -> Result<Vec<Schema>> {
        let mut schemas = Vec::new();
        for msg in &self.messages {
            schemas.push(self.build(SchemaKind::Message, &msg.name, &msg.fields)?);
        }
        for srv in &self.services {
            schemas.push(self.build(SchemaKind::ServiceRequest, &srv.name, &srv.request)?);
            schemas.push(self.build(SchemaKind::ServiceResponse, &srv.name, &srv.response)?);
        }
        for action in &self.actions {
            schemas.push(self.build(SchemaKind::ActionGoal, &action.name, &action.goal)?);
            schemas.push(self.build(SchemaKind::ActionFeedback, &action.name, &action.feedback)?);
            schemas.push(self.build(SchemaKind::ActionResult, &action.name, &action.result)?);
        }
        Ok(schemas)
    }

    fn build(&self, kind: SchemaKind, name: &str, specs: &[FieldSpec]) -> Result<Schema> {
        let qualified = self.qualified_name(kind, name);
        // Defaults are literals; nested messages cannot carry one
        let no_schemas: HashMap<String, Schema> = HashMap::new();

        let mut fields = Vec::with_capacity(specs.len());
        for spec in specs {
            let mut field = FieldDef::new(spec.name.clone(), spec.field_type.clone());
            if let Some(json) = &spec.default {
                let value = field_from_json(json, &spec.field_type, &no_schemas, &spec.name).map_err(|e| {
                    InterfaceError::InvalidManifest {
                        path: qualified.clone(),
                        reason: format!("default for '{}': {}", spec.name, e),
                    }
                })?;
                field = field.with_default(value);
            }
            fields.push(field);
        }
        Ok(Schema::new(qualified, kind, fields))
    }
}

/// Read every `*.json` manifest below `dir`, in path order
pub fn read_directory(dir: impl AsRef<Path>) -> Result<Vec<InterfaceManifest>> {
    let dir = dir.as_ref();
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
        .collect();
    paths.sort();

    let mut manifests = Vec::with_capacity(paths.len());
    for path in paths {
        debug!(path = %path.display(), "reading interface manifest");
        manifests.push(InterfaceManifest::from_path(&path)?);
    }
    Ok(manifests)
}

/// A populated registry together with the contracts its manifests declare
#[derive(Debug, Default)]
pub struct InterfaceSet {
    pub registry: SchemaRegistry,
    pub services: Vec<ServiceContract>,
    pub actions: Vec<ActionContract>,
    /// Package name and version of every loaded manifest
    pub packages: Vec<(String, Version)>,
}

impl InterfaceSet {
    /// Register all manifests as one batch and bind their contracts
    ///
    /// Any error aborts loading: an inconsistent interface graph is not usable.
    pub fn load(manifests: &[InterfaceManifest]) -> Result<Self> {
        let mut set = InterfaceSet::default();
        set.extend(manifests)?;
        Ok(set)
    }

    /// Register further manifests on top of what is already loaded
    pub fn extend(&mut self, manifests: &[InterfaceManifest]) -> Result<()> {
        let mut schemas = Vec::new();
        for manifest in manifests {
            schemas.extend(manifest.schemas()?);
        }
        self.registry.register_batch(schemas)?;

        for manifest in manifests {
            for name in manifest.service_names() {
                self.services.push(bind_service_by_name(&self.registry, &name)?);
            }
            for name in manifest.action_names() {
                self.actions.push(bind_action_by_name(&self.registry, &name)?);
            }
            self.packages.push((manifest.package.clone(), manifest.version.clone()));
            info!(
                package = %manifest.package,
                version = %manifest.version,
                messages = manifest.messages.len(),
                services = manifest.services.len(),
                actions = manifest.actions.len(),
                "loaded interface package"
            );
        }
        Ok(())
    }

    /// Load every manifest found below `dir`
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self> {
        Self::load(&read_directory(dir)?)
    }

    /// Load the bundled interfaces (unless disabled) and every configured
    /// manifest directory as one batch
    pub fn from_config(config: &InterfacesConfig) -> Result<Self> {
        let mut manifests = Vec::new();
        if config.registry.include_bundled {
            manifests.extend(crate::bundled::manifests()?);
        }
        for dir in config.manifest_dirs() {
            let found = read_directory(&dir)?;
            debug!(dir = %dir.display(), count = found.len(), "found manifests");
            manifests.extend(found);
        }
        Self::load(&manifests)
    }

    /// Registered schema, or `NotFound`
    pub fn schema(&self, name: &str) -> Result<&Schema> {
        self.registry
            .lookup(name)
            .ok_or_else(|| InterfaceError::NotFound(name.to_string()))
    }

    pub fn service(&self, name: &str) -> Option<&ServiceContract> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn action(&self, name: &str) -> Option<&ActionContract> {
        self.actions.iter().find(|a| a.name == name)
    }
}
