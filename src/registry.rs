use std::collections::{HashMap, HashSet};

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::host::{ClassHandle, HostMetadata};
use crate::listener::{ListenerCollector, WeakCollector};
use crate::symbol::{Symbol, SymbolTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// A host class; fields resolve against host metadata unless the gamedata overrides them.
    Class(ClassHandle),
    /// A gamedata group of plain offsets, e.g. virtual-table indices.
    Offsets,
    /// A gamedata group of global addresses.
    Addresses,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum GroupTag {
    Class,
    Offsets,
    Addresses,
}

impl BindingKind {
    fn tag(self) -> GroupTag {
        match self {
            BindingKind::Class(_) => GroupTag::Class,
            BindingKind::Offsets => GroupTag::Offsets,
            BindingKind::Addresses => GroupTag::Addresses,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BindingKind::Class(_) => "class",
            BindingKind::Offsets => "offsets",
            BindingKind::Addresses => "addresses",
        }
    }
}

/// Resolution state for one foreign class or gamedata group.
pub struct ClassBinding {
    id: BindingId,
    name: Symbol,
    kind: BindingKind,
    collectors: Vec<WeakCollector>,
}

impl ClassBinding {
    pub fn name(&self) -> Symbol {
        self.name
    }

    pub fn kind(&self) -> BindingKind {
        self.kind
    }

    /// Live collectors, in registration order.
    pub fn collectors(&self) -> Vec<ListenerCollector> {
        self.collectors.iter().filter_map(WeakCollector::upgrade).collect()
    }

    pub fn has_listeners(&self) -> bool {
        self.collectors
            .iter()
            .filter_map(WeakCollector::upgrade)
            .any(|c| c.has_entries_for(self.id))
    }

    /// Distinct symbols queued on this binding by every live collector, in first-request order.
    pub fn requested_symbols(&self) -> Vec<Symbol> {
        let mut symbols = Vec::new();
        for collector in self.collectors() {
            for symbol in collector.symbols_for(self.id) {
                if !symbols.contains(&symbol) {
                    symbols.push(symbol);
                }
            }
        }
        symbols
    }

    fn clear_slots(&self, symbols: &SymbolTable) {
        for collector in self.collectors() {
            collector.for_binding(self.id, |entry| {
                if let Err(e) = entry.apply(None) {
                    warn!(
                        "Resetting {}::{} failed: {}",
                        symbols.resolve(self.name),
                        symbols.resolve(entry.symbol),
                        e
                    );
                }
            });
        }
    }
}

/// Owns every binding and the symbol table shared by their consumers.
///
/// Consumers own their slots; the registry only reaches them through the
/// writebacks of collectors it holds weakly.
#[derive(Default)]
pub struct BindingRegistry {
    symbols: SymbolTable,
    bindings: Vec<ClassBinding>,
    by_name: HashMap<(Symbol, GroupTag), BindingId>,
    unknown_classes: HashSet<Symbol>,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn symbol(&mut self, name: &str) -> Symbol {
        self.symbols.intern(name)
    }

    pub fn symbol_name(&self, symbol: Symbol) -> &str {
        self.symbols.resolve(symbol)
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Looks up a host class. Unknown names fail the same way until
    /// [`reset_class_cache`](Self::reset_class_cache).
    pub fn find_class_binding(&mut self, host: &dyn HostMetadata, name: &str) -> Result<BindingId> {
        let symbol = self.symbols.intern(name);
        if let Some(&id) = self.by_name.get(&(symbol, GroupTag::Class)) {
            return Ok(id);
        }
        if self.unknown_classes.contains(&symbol) {
            return Err(Error::UnknownClassBinding(name.to_string()));
        }

        match host.class_by_name(name) {
            Some(handle) => {
                debug!("Bound class {} ({:?})", name, handle);
                Ok(self.insert_binding(symbol, BindingKind::Class(handle)))
            }
            None => {
                warn!("Host exposes no class named {}", name);
                self.unknown_classes.insert(symbol);
                Err(Error::UnknownClassBinding(name.to_string()))
            }
        }
    }

    pub fn offsets_binding(&mut self, group: &str) -> BindingId {
        self.group_binding(group, BindingKind::Offsets)
    }

    pub fn addresses_binding(&mut self, group: &str) -> BindingId {
        self.group_binding(group, BindingKind::Addresses)
    }

    fn group_binding(&mut self, group: &str, kind: BindingKind) -> BindingId {
        let symbol = self.symbols.intern(group);
        match self.by_name.get(&(symbol, kind.tag())) {
            Some(&id) => id,
            None => self.insert_binding(symbol, kind),
        }
    }

    fn insert_binding(&mut self, name: Symbol, kind: BindingKind) -> BindingId {
        let id = BindingId(self.bindings.len());
        self.bindings.push(ClassBinding {
            id,
            name,
            kind,
            collectors: Vec::new(),
        });
        self.by_name.insert((name, kind.tag()), id);
        id
    }

    /// Forgets negative class lookups, e.g. after the host binary changed.
    pub fn reset_class_cache(&mut self) {
        self.unknown_classes.clear();
    }

    pub fn field_symbol(&mut self, _binding: BindingId, field: &str) -> Symbol {
        self.symbols.intern(field)
    }

    pub fn binding(&self, id: BindingId) -> &ClassBinding {
        &self.bindings[id.0]
    }

    pub fn binding_name(&self, id: BindingId) -> &str {
        self.symbols.resolve(self.bindings[id.0].name)
    }

    pub fn bindings(&self) -> impl Iterator<Item = (BindingId, &ClassBinding)> {
        self.bindings.iter().enumerate().map(|(i, b)| (BindingId(i), b))
    }

    /// Queues the entries `collector` holds now, and that are not yet on a
    /// binding, on `binding`. Entries never resolve against another binding.
    pub fn add_listener(&mut self, binding: BindingId, collector: &ListenerCollector) {
        let claimed = collector.claim(binding);
        let entry = &mut self.bindings[binding.0];
        if !entry.collectors.iter().any(|c| c.points_to(collector)) {
            entry.collectors.push(collector.downgrade());
        }
        debug!(
            "Queued {} listener entries on {}",
            claimed,
            self.symbols.resolve(entry.name)
        );
    }

    /// Resets every slot registered on `binding` to its sentinel.
    pub fn clear_binding(&self, binding: BindingId) {
        self.bindings[binding.0].clear_slots(&self.symbols);
    }

    /// Resets every registered slot to its sentinel.
    pub fn clear(&self) {
        for binding in &self.bindings {
            binding.clear_slots(&self.symbols);
        }
    }

    /// Drops queue entries whose collector no longer exists.
    pub fn prune(&mut self) -> usize {
        let mut pruned = 0;
        for binding in &mut self.bindings {
            let before = binding.collectors.len();
            binding.collectors.retain(WeakCollector::is_alive);
            pruned += before - binding.collectors.len();
        }
        pruned
    }

    pub(crate) fn set_class_handle(&mut self, binding: BindingId, handle: ClassHandle) {
        self.bindings[binding.0].kind = BindingKind::Class(handle);
    }
}
