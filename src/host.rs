//! The boundary to the live host process.
//!
//! The embedding application supplies a [`HostMetadata`] implementation
//! backed by the host's reflection data. [`SchemaDump`] is an in-memory
//! stand-in loaded from a JSON dump of that data, [`ModuleImage`] answers
//! signature scans over a copy of a module's bytes.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::signature::Signature;

/// Opaque handle to a host class, valid for the metadata source that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassHandle(pub u32);

pub trait HostMetadata {
    fn class_by_name(&self, name: &str) -> Option<ClassHandle>;

    fn field_offset(&self, class: ClassHandle, field: &str) -> Option<i64>;

    /// Absolute address of a global symbol.
    fn address_of(&self, name: &str) -> Option<usize>;

    fn find_signature(&self, _signature: &Signature) -> Option<usize> {
        None
    }

    fn read_bytes(&self, _address: usize, _len: usize) -> Option<Vec<u8>> {
        None
    }
}

// ─── Schema dump ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassDump {
    pub fields: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct SchemaDumpFile {
    classes: BTreeMap<String, ClassDump>,
    globals: BTreeMap<String, u64>,
}

/// Host metadata materialized from a JSON dump:
///
/// ```json
/// { "classes": { "CPointOrient": { "fields": { "m_bActive": 1264 } } },
///   "globals": { "s_GameEventManager": 140737488355328 } }
/// ```
#[derive(Debug, Clone, Default)]
pub struct SchemaDump {
    classes: Vec<(String, ClassDump)>,
    class_index: HashMap<String, ClassHandle>,
    globals: HashMap<String, usize>,
}

impl SchemaDump {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let file: SchemaDumpFile = serde_json::from_str(text)?;
        let mut dump = Self::new();
        for (name, class) in file.classes {
            dump.insert_class(name, class);
        }
        for (name, address) in file.globals {
            match usize::try_from(address) {
                Ok(address) => {
                    dump.globals.insert(name, address);
                }
                Err(_) => warn!("Global {} at 0x{:X} does not fit this platform", name, address),
            }
        }
        Ok(dump)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let dump = Self::from_json(&text)?;
        info!(
            "Loaded schema dump from {} ({} classes, {} globals)",
            path.display(),
            dump.classes.len(),
            dump.globals.len(),
        );
        Ok(dump)
    }

    pub fn with_class<'a>(
        mut self,
        name: &str,
        fields: impl IntoIterator<Item = (&'a str, i64)>,
    ) -> Self {
        let class = ClassDump {
            fields: fields
                .into_iter()
                .map(|(field, offset)| (field.to_string(), offset))
                .collect(),
        };
        self.insert_class(name.to_string(), class);
        self
    }

    pub fn with_global(mut self, name: &str, address: usize) -> Self {
        self.globals.insert(name.to_string(), address);
        self
    }

    pub fn insert_class(&mut self, name: String, class: ClassDump) {
        if let Some(&handle) = self.class_index.get(&name) {
            self.classes[handle.0 as usize].1 = class;
            return;
        }
        let handle = ClassHandle(self.classes.len() as u32);
        self.class_index.insert(name.clone(), handle);
        self.classes.push((name, class));
    }

    pub fn remove_field(&mut self, class: &str, field: &str) -> Option<i64> {
        let handle = *self.class_index.get(class)?;
        self.classes[handle.0 as usize].1.fields.remove(field)
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }
}

impl HostMetadata for SchemaDump {
    fn class_by_name(&self, name: &str) -> Option<ClassHandle> {
        self.class_index.get(name).copied()
    }

    fn field_offset(&self, class: ClassHandle, field: &str) -> Option<i64> {
        let (_, dump) = self.classes.get(class.0 as usize)?;
        dump.fields.get(field).copied()
    }

    fn address_of(&self, name: &str) -> Option<usize> {
        self.globals.get(name).copied()
    }
}

// ─── Module image ────────────────────────────────────────────────────

/// A host module's bytes as mapped at `base`.
pub struct ModuleImage<'a> {
    pub base: usize,
    pub bytes: &'a [u8],
}

impl<'a> ModuleImage<'a> {
    pub fn new(base: usize, bytes: &'a [u8]) -> Self {
        Self { base, bytes }
    }

    /// The image of a module mapped in this process.
    ///
    /// # Safety
    /// `base..base + len` must stay mapped and readable for `'a`.
    pub unsafe fn from_raw_parts(base: usize, len: usize) -> Self {
        Self {
            base,
            bytes: std::slice::from_raw_parts(base as *const u8, len),
        }
    }
}

impl HostMetadata for ModuleImage<'_> {
    fn class_by_name(&self, _name: &str) -> Option<ClassHandle> {
        None
    }

    fn field_offset(&self, _class: ClassHandle, _field: &str) -> Option<i64> {
        None
    }

    fn address_of(&self, _name: &str) -> Option<usize> {
        None
    }

    fn find_signature(&self, signature: &Signature) -> Option<usize> {
        let matches = signature.find_all(self.bytes);
        if matches.len() > 1 {
            warn!(
                "Signature \"{}\" matched {} times, using the first",
                signature,
                matches.len()
            );
        }
        let found = matches.first().map(|i| self.base + i);
        debug!("Signature \"{}\" -> {:X?}", signature, found);
        found
    }

    fn read_bytes(&self, address: usize, len: usize) -> Option<Vec<u8>> {
        let start = address.checked_sub(self.base)?;
        self.bytes.get(start..start.checked_add(len)?).map(<[u8]>::to_vec)
    }
}

// ─── Layering ────────────────────────────────────────────────────────

/// Asks each layer in order; the first answer wins.
///
/// Class handles are only meaningful to the layer that issued them, so
/// class and field queries go to the first layer that knows the class.
#[derive(Default)]
pub struct LayeredHost<'a> {
    layers: Vec<&'a dyn HostMetadata>,
}

impl<'a> LayeredHost<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, layer: &'a dyn HostMetadata) -> Self {
        self.layers.push(layer);
        self
    }

    fn class_layer(&self, name: &str) -> Option<(usize, ClassHandle)> {
        self.layers
            .iter()
            .enumerate()
            .find_map(|(i, layer)| layer.class_by_name(name).map(|h| (i, h)))
    }
}

// Handles are re-tagged with the layer index in the upper byte.
const LAYER_SHIFT: u32 = 24;

impl HostMetadata for LayeredHost<'_> {
    fn class_by_name(&self, name: &str) -> Option<ClassHandle> {
        let (layer, handle) = self.class_layer(name)?;
        if handle.0 >> LAYER_SHIFT != 0 || layer > 0xFF {
            warn!("Class handle for {} cannot be layered", name);
            return None;
        }
        Some(ClassHandle(((layer as u32) << LAYER_SHIFT) | handle.0))
    }

    fn field_offset(&self, class: ClassHandle, field: &str) -> Option<i64> {
        let layer = (class.0 >> LAYER_SHIFT) as usize;
        let inner = ClassHandle(class.0 & ((1 << LAYER_SHIFT) - 1));
        self.layers.get(layer)?.field_offset(inner, field)
    }

    fn address_of(&self, name: &str) -> Option<usize> {
        self.layers.iter().find_map(|layer| layer.address_of(name))
    }

    fn find_signature(&self, signature: &Signature) -> Option<usize> {
        self.layers.iter().find_map(|layer| layer.find_signature(signature))
    }

    fn read_bytes(&self, address: usize, len: usize) -> Option<Vec<u8>> {
        self.layers.iter().find_map(|layer| layer.read_bytes(address, len))
    }
}
