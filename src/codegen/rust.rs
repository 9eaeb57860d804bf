//! Rust Code Emitter
//!
//! Generates Rust source from a populated registry.
//!
//! Key constraints:
//! - Output is deterministic: packages, namespaces and types are sorted by name
//! - Enum fields become `#[repr(..)]` enums matching the declared width
//! - Nested fields reference the target struct by module path, so the
//!   generated tree compiles as a single file

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::registry::{SchemaEntry, SchemaRegistry};
use crate::schema::{EnumDef, FieldDef, FieldType, IntKind, Schema};

use super::{is_rust_keyword, to_pascal_case, CodegenOptions, GeneratedOutput};

/// Longest fixed array serde derives support
const SERDE_ARRAY_LIMIT: usize = 32;

pub const HEADER: &str = "// Generated from interface manifests - DO NOT EDIT\n";

// =============================================================================
// Public API
// =============================================================================

/// Emit Rust bindings for every registered schema
pub fn emit_registry(registry: &SchemaRegistry, options: &CodegenOptions) -> GeneratedOutput {
    // package -> namespace -> entries
    let mut tree: BTreeMap<&str, BTreeMap<&str, Vec<&SchemaEntry>>> = BTreeMap::new();
    for entry in registry.entries() {
        tree.entry(entry.schema.package())
            .or_default()
            .entry(entry.schema.kind.namespace())
            .or_default()
            .push(entry);
    }

    let mut output = String::from(HEADER);
    let mut type_count = 0;

    for (package, namespaces) in &tree {
        let _ = writeln!(output, "\npub mod {} {{", escape_ident(package));
        for (namespace, entries) in namespaces {
            let mut entries = entries.clone();
            entries.sort_by(|a, b| a.schema.name.cmp(&b.schema.name));

            let module = NamespaceModule::new(package, namespace, &entries);
            type_count += module.type_count();
            output.push_str(&module.render(options));
        }
        output.push_str("}\n");
    }

    GeneratedOutput {
        code: output,
        type_count,
    }
}

/// Emit one schema and the enums it declares
///
/// The text is meant to sit in the schema's own `pkg::ns` module; nested
/// references use the same relative paths as [`emit_registry`].
pub fn emit_schema(entry: &SchemaEntry, options: &CodegenOptions) -> String {
    let entries = [entry];
    let module = NamespaceModule::new(entry.schema.package(), entry.schema.kind.namespace(), &entries);
    module.render_items(options)
}

// =============================================================================
// Namespace Modules
// =============================================================================

/// One `pkg::ns` module: its structs and the enums they use
struct NamespaceModule<'a> {
    package: &'a str,
    namespace: &'a str,
    entries: &'a [&'a SchemaEntry],
    enums: EnumTable,
}

impl<'a> NamespaceModule<'a> {
    fn new(package: &'a str, namespace: &'a str, entries: &'a [&'a SchemaEntry]) -> Self {
        let mut enums = EnumTable::default();
        for entry in entries {
            for field in &entry.schema.fields {
                collect_enums(&entry.schema, &field.field_type, &mut enums);
            }
        }
        Self {
            package,
            namespace,
            entries,
            enums,
        }
    }

    fn type_count(&self) -> usize {
        self.entries.len() + self.enums.defs.len()
    }

    fn render(&self, options: &CodegenOptions) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "    pub mod {} {{", self.namespace);
        if options.derive_serde {
            output.push_str("        use serde::{Deserialize, Serialize};\n");
        }
        output.push_str(&self.render_items(options));
        output.push_str("    }\n");
        output
    }

    /// Enums first, then structs, without the module wrapper
    fn render_items(&self, options: &CodegenOptions) -> String {
        let mut output = String::new();
        for (rust_name, def) in &self.enums.defs {
            output.push('\n');
            emit_enum(&mut output, rust_name, def, options);
        }
        for entry in self.entries {
            output.push('\n');
            self.emit_struct(&mut output, entry, options);
        }
        output
    }

    fn emit_struct(&self, output: &mut String, entry: &SchemaEntry, options: &CodegenOptions) {
        let schema = &entry.schema;
        let type_name = struct_name(schema.short_name());

        let _ = writeln!(output, "        /// {}", schema.name);
        output.push_str(&derive_line("Debug, Clone, PartialEq", options));
        let _ = writeln!(output, "        pub struct {} {{", type_name);
        for field in &schema.fields {
            self.emit_field(output, schema, field, options);
        }
        output.push_str("        }\n\n");

        let _ = writeln!(output, "        impl {} {{", type_name);
        let _ = writeln!(
            output,
            "            pub const TYPE_NAME: &'static str = \"{}\";",
            schema.name
        );
        let _ = writeln!(
            output,
            "            pub const TYPE_HASH: &'static str = \"{}\";",
            entry.type_hash
        );
        output.push_str("        }\n");
    }

    fn emit_field(&self, output: &mut String, schema: &Schema, field: &FieldDef, options: &CodegenOptions) {
        if let Some(default) = &field.default {
            let _ = writeln!(output, "            /// Defaults to `{}`", default.to_json());
        }
        if let FieldType::FixedArray { len, .. } = &field.field_type {
            if options.derive_serde && *len > SERDE_ARRAY_LIMIT {
                let _ = writeln!(output, "            /// Exactly {} elements", len);
            }
        }
        let rust_type = self.rust_type(schema, &field.field_type, options);
        let _ = writeln!(output, "            pub {}: {},", escape_ident(&field.name), rust_type);
    }

    fn rust_type(&self, schema: &Schema, field_type: &FieldType, options: &CodegenOptions) -> String {
        match field_type {
            FieldType::Bool => "bool".to_string(),
            FieldType::Float32 => "f32".to_string(),
            FieldType::Float64 => "f64".to_string(),
            FieldType::String => "String".to_string(),
            FieldType::Enum(def) => self.enums.name_of(schema, def),
            FieldType::FixedArray { elem, len } => {
                let inner = self.rust_type(schema, elem, options);
                if options.derive_serde && *len > SERDE_ARRAY_LIMIT {
                    format!("Vec<{}>", inner)
                } else {
                    format!("[{}; {}]", inner, len)
                }
            }
            FieldType::Sequence { elem } => format!("Vec<{}>", self.rust_type(schema, elem, options)),
            FieldType::Nested { schema: target } => self.nested_path(target),
            other => match other.int_kind() {
                Some(kind) => int_type(kind).to_string(),
                None => "()".to_string(),
            },
        }
    }

    /// Path to a referenced struct as seen from this module
    fn nested_path(&self, target: &str) -> String {
        let mut parts = target.splitn(3, '/');
        let (package, namespace, name) = match (parts.next(), parts.next(), parts.next()) {
            (Some(p), Some(n), Some(s)) => (p, n, s),
            _ => return struct_name(target),
        };

        if package == self.package && namespace == self.namespace {
            struct_name(name)
        } else {
            format!(
                "super::super::{}::{}::{}",
                escape_ident(package),
                namespace,
                struct_name(name)
            )
        }
    }
}

// =============================================================================
// Enum Emission
// =============================================================================

/// Distinct enum declarations of one module, in first-use order
#[derive(Default)]
struct EnumTable {
    defs: Vec<(String, EnumDef)>,
}

impl EnumTable {
    fn insert(&mut self, schema: &Schema, def: &EnumDef) {
        if self.defs.iter().any(|(_, d)| d == def) {
            return;
        }
        let mut name = to_pascal_case(&def.name);
        // Same name, different members: qualify with the declaring type
        if self.defs.iter().any(|(n, _)| *n == name) {
            name = format!("{}{}", struct_name(schema.short_name()), name);
        }
        self.defs.push((name, def.clone()));
    }

    fn name_of(&self, schema: &Schema, def: &EnumDef) -> String {
        self.defs
            .iter()
            .find(|(_, d)| d == def)
            .map(|(n, _)| n.clone())
            .unwrap_or_else(|| format!("{}{}", struct_name(schema.short_name()), to_pascal_case(&def.name)))
    }
}

fn collect_enums(schema: &Schema, field_type: &FieldType, table: &mut EnumTable) {
    match field_type {
        FieldType::Enum(def) => table.insert(schema, def),
        FieldType::FixedArray { elem, .. } | FieldType::Sequence { elem } => {
            collect_enums(schema, elem, table)
        }
        _ => {}
    }
}

fn emit_enum(output: &mut String, rust_name: &str, def: &EnumDef, options: &CodegenOptions) {
    let repr = int_type(def.repr);

    let _ = writeln!(output, "        /// {} ({})", def.name, def.repr);
    output.push_str(&derive_line("Debug, Clone, Copy, PartialEq, Eq, Hash", options));
    let _ = writeln!(output, "        #[repr({})]", repr);
    let _ = writeln!(output, "        pub enum {} {{", rust_name);
    for variant in &def.values {
        let _ = writeln!(output, "            {} = {},", variant_name(&variant.name), variant.value);
    }
    output.push_str("        }\n\n");

    let _ = writeln!(output, "        impl {} {{", rust_name);
    output.push_str("            /// Member for a wire value\n");
    let _ = writeln!(output, "            pub fn from_value(value: {}) -> Option<Self> {{", repr);
    output.push_str("                match value {\n");
    for variant in &def.values {
        let _ = writeln!(
            output,
            "                    {} => Some(Self::{}),",
            variant.value,
            variant_name(&variant.name)
        );
    }
    output.push_str("                    _ => None,\n");
    output.push_str("                }\n");
    output.push_str("            }\n");
    output.push_str("        }\n");
}

// =============================================================================
// Helper Utilities
// =============================================================================

fn derive_line(base: &str, options: &CodegenOptions) -> String {
    if options.derive_serde {
        format!("        #[derive({}, Serialize, Deserialize)]\n", base)
    } else {
        format!("        #[derive({})]\n", base)
    }
}

fn int_type(kind: IntKind) -> &'static str {
    match kind {
        IntKind::Int8 => "i8",
        IntKind::Int16 => "i16",
        IntKind::Int32 => "i32",
        IntKind::Int64 => "i64",
        IntKind::UInt8 => "u8",
        IntKind::UInt16 => "u16",
        IntKind::UInt32 => "u32",
        IntKind::UInt64 => "u64",
    }
}

/// `Mapping_Request` -> `MappingRequest`
fn struct_name(short_name: &str) -> String {
    to_pascal_case(short_name)
}

fn variant_name(name: &str) -> String {
    let pascal = to_pascal_case(name);
    if pascal == "Self" {
        format!("{}_", pascal)
    } else {
        pascal
    }
}

/// Raw identifier for reserved words (`type` -> `r#type`)
fn escape_ident(name: &str) -> String {
    if is_rust_keyword(name) {
        format!("r#{}", name)
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaKind;

    fn registry() -> SchemaRegistry {
        let state = EnumDef::new("RobotState", IntKind::UInt8, &[("Idle", 0), ("Fault", 4)]);
        let mut registry = SchemaRegistry::new();
        registry
            .register_batch(vec![
                Schema::message(
                    "amr/msg/Pose2D",
                    vec![
                        FieldDef::new("x", FieldType::Float64),
                        FieldDef::new("y", FieldType::Float64),
                    ],
                ),
                Schema::message(
                    "amr/msg/Status",
                    vec![
                        FieldDef::new("state", FieldType::Enum(state)),
                        FieldDef::new("pose", FieldType::nested("amr/msg/Pose2D")),
                        FieldDef::new("type", FieldType::sequence(FieldType::UInt16)),
                    ],
                ),
                Schema::new(
                    "nav/srv/Goto_Request",
                    SchemaKind::ServiceRequest,
                    vec![
                        FieldDef::new("target", FieldType::nested("amr/msg/Pose2D")),
                        FieldDef::new("covariance", FieldType::fixed_array(FieldType::Float64, 36)),
                        FieldDef::new("tag", FieldType::fixed_array(FieldType::UInt8, 4)),
                    ],
                ),
            ])
            .unwrap();
        registry
    }

    #[test]
    fn test_emit_modules_and_structs() {
        let output = emit_registry(&registry(), &CodegenOptions::default());
        assert!(output.code.starts_with(HEADER));
        assert!(output.code.contains("pub mod amr {"));
        assert!(output.code.contains("pub mod srv {"));
        assert!(output.code.contains("pub struct Pose2D {"));
        assert!(output.code.contains("pub struct GotoRequest {"));
        // 3 structs + 1 enum
        assert_eq!(output.type_count, 4);
    }

    #[test]
    fn test_field_types() {
        let code = emit_registry(&registry(), &CodegenOptions::default()).code;
        assert!(code.contains("pub state: RobotState,"));
        assert!(code.contains("pub pose: Pose2D,"));
        assert!(code.contains("pub r#type: Vec<u16>,"));
        assert!(code.contains("pub target: super::super::amr::msg::Pose2D,"));
        assert!(code.contains("pub tag: [u8; 4],"));
        // Too long for serde's array impls
        assert!(code.contains("pub covariance: Vec<f64>,"));
    }

    #[test]
    fn test_enum_repr() {
        let code = emit_registry(&registry(), &CodegenOptions::default()).code;
        assert!(code.contains("#[repr(u8)]"));
        assert!(code.contains("Fault = 4,"));
        assert!(code.contains("4 => Some(Self::Fault),"));
    }

    #[test]
    fn test_type_constants() {
        let registry = registry();
        let code = emit_registry(&registry, &CodegenOptions::default()).code;
        let hash = &registry.entry("amr/msg/Pose2D").unwrap().type_hash;
        assert!(code.contains("pub const TYPE_NAME: &'static str = \"amr/msg/Pose2D\";"));
        assert!(code.contains(&format!("pub const TYPE_HASH: &'static str = \"{}\";", hash)));
    }

    #[test]
    fn test_without_serde() {
        let options = CodegenOptions { derive_serde: false };
        let code = emit_registry(&registry(), &options).code;
        assert!(!code.contains("Serialize"));
        assert!(code.contains("pub covariance: [f64; 36],"));
    }

    #[test]
    fn test_emit_single_schema() {
        let registry = registry();
        let entry = registry.entry("amr/msg/Status").unwrap();
        let code = emit_schema(entry, &CodegenOptions::default());
        assert!(code.contains("pub enum RobotState {"));
        assert!(code.contains("pub struct Status {"));
        assert!(!code.contains("pub struct Pose2D {"));
        assert!(!code.contains("pub mod"));
    }

    #[test]
    fn test_conflicting_enum_names() {
        let a = EnumDef::new("Status", IntKind::UInt8, &[("Ok", 0)]);
        let b = EnumDef::new("Status", IntKind::Int8, &[("Ok", 0), ("Failed", -1)]);
        let mut registry = SchemaRegistry::new();
        registry
            .register_batch(vec![
                Schema::message("p/msg/A", vec![FieldDef::new("s", FieldType::Enum(a))]),
                Schema::message("p/msg/B", vec![FieldDef::new("s", FieldType::Enum(b))]),
            ])
            .unwrap();

        let code = emit_registry(&registry, &CodegenOptions::default()).code;
        assert!(code.contains("pub enum Status {"));
        assert!(code.contains("pub enum BStatus {"));
        assert!(code.contains("pub s: BStatus,"));
    }
}
