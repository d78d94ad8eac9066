//! Late-binding offset and address resolution for code that reaches into a
//! host program's objects.
//!
//! Consumers declare the symbols they need on a [`ListenerCollector`], queue
//! it on a binding of the [`BindingRegistry`], and a [`Resolver`] pass fills
//! every slot from host metadata and gamedata.

pub mod accessor;
pub mod config;
pub mod error;
pub mod gamedata;
pub mod host;
pub mod listener;
pub mod memory;
pub mod provider;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod signature;
pub mod slot;
pub mod slot_table;
pub mod symbol;

pub use accessor::Field;
pub use error::{Error, Result};
pub use gamedata::{ConfigSource, ConfigValue, GameConfig, Platform};
pub use host::{ClassHandle, HostMetadata, LayeredHost, ModuleImage, SchemaDump};
pub use listener::{ListenerCollector, Requirement, Writeback};
pub use registry::{BindingId, BindingKind, BindingRegistry, ClassBinding};
pub use resolver::{Diagnostic, DiagnosticKind, LoadReport, Resolver};
pub use signature::Signature;
pub use slot::{AddressSlot, OffsetSlot, Slot};
pub use symbol::{Symbol, SymbolTable};
