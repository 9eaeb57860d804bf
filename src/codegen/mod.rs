//! Code Generation
//!
//! Pure `registry -> source text` functions for language bindings. Nothing in
//! the registry, codec or contracts depends on generated output.
//!
//! Layout of generated Rust: one module per package, one submodule per
//! namespace (`msg`, `srv`, `action`), one struct per schema, one enum per
//! distinct enum declaration in a namespace.

pub mod rust;

use crate::registry::SchemaRegistry;

/// Options for generated bindings
#[derive(Debug, Clone)]
pub struct CodegenOptions {
    /// Add serde derives to generated types
    pub derive_serde: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self { derive_serde: true }
    }
}

/// Output from code generation
#[derive(Debug, Clone)]
pub struct GeneratedOutput {
    /// Generated code as a string
    pub code: String,
    /// Number of types generated
    pub type_count: usize,
}

/// Generate Rust bindings for every registered interface
pub fn generate_rust(registry: &SchemaRegistry, options: &CodegenOptions) -> GeneratedOutput {
    rust::emit_registry(registry, options)
}

const RUST_KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "static", "struct", "super", "trait", "true", "type",
    "unsafe", "use", "where", "while", "abstract", "become", "box", "do", "final", "macro",
    "override", "priv", "try", "typeof", "unsized", "virtual", "yield",
];

/// Whether `name` is reserved in Rust
pub fn is_rust_keyword(name: &str) -> bool {
    RUST_KEYWORDS.contains(&name)
}

/// Convert string to PascalCase (`Mapping_Request` -> `MappingRequest`,
/// `START_MAPPING` -> `StartMapping`)
pub fn to_pascal_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut capitalize_next = true;

    // SCREAMING_SNAKE_CASE is lowered apart from word starts
    let is_all_caps = s
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');

    for c in s.chars() {
        if c == '_' || c == '-' || c == ' ' {
            capitalize_next = true;
        } else if capitalize_next {
            result.push(c.to_ascii_uppercase());
            capitalize_next = false;
        } else if is_all_caps {
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }

    result
}
