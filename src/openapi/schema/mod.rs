//! Schema compiler: JSON Schema fragments in, ordered declarations out.
//!
//! Fragments are normalized into [`node::SchemaNode`]s, references and
//! `allOf`s are resolved, and the builder turns the result into
//! [`expr::Declaration`]s held in a dependency graph. Rendering to target
//! syntax happens only in [`emit`].

mod brand;
mod builder;
mod emit;
mod expr;
mod graph;
mod merge;
mod node;
mod resolve;

pub use builder::SchemaCompiler;
pub use emit::OutputKind;
pub(crate) use emit::jsdoc;
pub use expr::{Declaration, DeclarationKind};
pub use resolve::{resolve_chain, resolve_ref};
