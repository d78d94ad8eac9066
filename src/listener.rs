use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::error::Error;
use crate::registry::BindingId;
use crate::slot::{Slot, SlotValue};
use crate::symbol::Symbol;

/// Stores a resolved value (`Some`) or the sentinel (`None`) into consumer storage.
pub type Writeback = Box<dyn Fn(Option<i64>) -> Result<(), Error>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// A failure makes the whole load unsuccessful.
    Required,
    /// A failure is reported but the load can still succeed.
    Optional,
}

pub struct ListenerEntry {
    pub symbol: Symbol,
    pub requirement: Requirement,
    /// Set once the entry is queued on a binding; it only ever resolves there.
    binding: Cell<Option<BindingId>>,
    writeback: Writeback,
}

impl ListenerEntry {
    pub fn binding(&self) -> Option<BindingId> {
        self.binding.get()
    }

    pub fn apply(&self, resolved: Option<i64>) -> Result<(), Error> {
        (self.writeback)(resolved)
    }
}

/// A batch of (symbol, writeback) registrations owned by one consumer.
///
/// Adding the collector to a binding queues the entries it holds at that
/// moment on that binding alone; entries inserted later wait for the next
/// `add_listener`. Cloning gives another handle to the same batch. A [`BindingRegistry`]
/// only keeps a weak reference, so dropping every handle tears the
/// registrations down.
///
/// [`BindingRegistry`]: crate::registry::BindingRegistry
#[derive(Clone, Default)]
pub struct ListenerCollector {
    entries: Rc<RefCell<Vec<ListenerEntry>>>,
}

impl ListenerCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a required writeback. Duplicate symbols are kept, not merged.
    pub fn insert(&self, symbol: Symbol, writeback: Writeback) {
        self.push(symbol, writeback, Requirement::Required);
    }

    pub fn insert_optional(&self, symbol: Symbol, writeback: Writeback) {
        self.push(symbol, writeback, Requirement::Optional);
    }

    pub fn insert_slot<T: SlotValue>(&self, symbol: Symbol, slot: &Slot<T>) {
        self.insert(symbol, slot.writeback());
    }

    pub fn push(&self, symbol: Symbol, writeback: Writeback, requirement: Requirement) {
        self.entries.borrow_mut().push(ListenerEntry {
            symbol,
            requirement,
            binding: Cell::new(None),
            writeback,
        });
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Distinct symbols in first-insertion order.
    pub fn symbols(&self) -> Vec<Symbol> {
        let mut symbols = Vec::new();
        for entry in self.entries.borrow().iter() {
            if !symbols.contains(&entry.symbol) {
                symbols.push(entry.symbol);
            }
        }
        symbols
    }

    pub fn for_each(&self, symbol: Symbol, mut f: impl FnMut(&ListenerEntry)) {
        for entry in self.entries.borrow().iter().filter(|e| e.symbol == symbol) {
            f(entry);
        }
    }

    /// Distinct symbols queued on `binding`, in first-insertion order.
    pub fn symbols_for(&self, binding: BindingId) -> Vec<Symbol> {
        let mut symbols = Vec::new();
        for entry in self.entries.borrow().iter().filter(|e| e.binding() == Some(binding)) {
            if !symbols.contains(&entry.symbol) {
                symbols.push(entry.symbol);
            }
        }
        symbols
    }

    /// Visits the writebacks for `symbol` that were queued on `binding`.
    pub fn for_each_in(&self, binding: BindingId, symbol: Symbol, mut f: impl FnMut(&ListenerEntry)) {
        for entry in self
            .entries
            .borrow()
            .iter()
            .filter(|e| e.symbol == symbol && e.binding() == Some(binding))
        {
            f(entry);
        }
    }

    /// Visits every entry queued on `binding`.
    pub fn for_binding(&self, binding: BindingId, mut f: impl FnMut(&ListenerEntry)) {
        for entry in self.entries.borrow().iter().filter(|e| e.binding() == Some(binding)) {
            f(entry);
        }
    }

    pub fn has_entries_for(&self, binding: BindingId) -> bool {
        self.entries.borrow().iter().any(|e| e.binding() == Some(binding))
    }

    /// Queues every entry not yet on a binding onto `binding`. Returns how many were taken.
    pub(crate) fn claim(&self, binding: BindingId) -> usize {
        let mut claimed = 0;
        for entry in self.entries.borrow().iter().filter(|e| e.binding().is_none()) {
            entry.binding.set(Some(binding));
            claimed += 1;
        }
        claimed
    }

    pub(crate) fn downgrade(&self) -> WeakCollector {
        WeakCollector(Rc::downgrade(&self.entries))
    }
}

#[derive(Clone)]
pub(crate) struct WeakCollector(Weak<RefCell<Vec<ListenerEntry>>>);

impl WeakCollector {
    pub(crate) fn upgrade(&self) -> Option<ListenerCollector> {
        self.0.upgrade().map(|entries| ListenerCollector { entries })
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    pub(crate) fn points_to(&self, collector: &ListenerCollector) -> bool {
        std::ptr::eq(self.0.as_ptr(), Rc::as_ptr(&collector.entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::OffsetSlot;
    use crate::symbol::SymbolTable;

    #[test]
    fn duplicate_inserts_are_appended() {
        let mut symbols = SymbolTable::new();
        let active = symbols.intern("m_bActive");
        let target = symbols.intern("m_hTarget");

        let collector = ListenerCollector::new();
        let a = OffsetSlot::new();
        let b = OffsetSlot::new();
        collector.insert_slot(active, &a);
        collector.insert_slot(target, &a);
        collector.insert_slot(active, &b);

        assert_eq!(collector.len(), 3);
        assert_eq!(collector.symbols(), vec![active, target]);

        let mut hits = 0;
        collector.for_each(active, |entry| {
            entry.apply(Some(12)).unwrap();
            hits += 1;
        });
        assert_eq!(hits, 2);
        assert_eq!(a.get(), Some(12));
        assert_eq!(b.get(), Some(12));
    }

    #[test]
    fn clear_discards_entries() {
        let mut symbols = SymbolTable::new();
        let collector = ListenerCollector::new();
        collector.insert_optional(symbols.intern("m_flMaxTurnRate"), Box::new(|_| Ok(())));
        assert!(!collector.is_empty());
        collector.clear();
        assert!(collector.is_empty());
        assert!(collector.symbols().is_empty());
    }

    #[test]
    fn entries_stay_on_the_binding_they_were_queued_on() {
        let mut registry = crate::registry::BindingRegistry::new();
        let scene = registry.offsets_binding("CGameSceneNode");
        let pawn = registry.offsets_binding("CBasePlayerPawn");
        let parent = registry.symbol("m_pParent");
        let eye = registry.symbol("GetEyePosition");

        let collector = ListenerCollector::new();
        collector.insert_optional(parent, Box::new(|_| Ok(())));
        assert_eq!(collector.claim(scene), 1);
        collector.insert_optional(eye, Box::new(|_| Ok(())));
        assert_eq!(collector.claim(pawn), 1);
        assert_eq!(collector.claim(scene), 0);

        assert_eq!(collector.symbols_for(scene), vec![parent]);
        assert_eq!(collector.symbols_for(pawn), vec![eye]);
        let mut hits = 0;
        collector.for_each_in(pawn, parent, |_| hits += 1);
        assert_eq!(hits, 0);
        assert!(collector.has_entries_for(pawn));
    }

    #[test]
    fn weak_handle_dies_with_collector() {
        let collector = ListenerCollector::new();
        let weak = collector.downgrade();
        assert!(weak.is_alive());
        assert!(weak.points_to(&collector));
        drop(collector);
        assert!(weak.upgrade().is_none());
    }
}
