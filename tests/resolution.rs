use std::cell::Cell;
use std::ffi::c_void;
use std::rc::Rc;

use gamedata_binder::accessor::{read_field, write_field};
use gamedata_binder::invoke_virtual;
use gamedata_binder::{
    BindingRegistry, ConfigValue, GameConfig, ListenerCollector, OffsetSlot, Requirement,
    Resolver, SchemaDump, SymbolTable, Writeback,
};

const CLASS: &str = "CExampleClass";

fn offsets(entries: &[(&str, i64)]) -> GameConfig {
    let mut config = GameConfig::new();
    for (symbol, value) in entries {
        config.insert(CLASS, symbol, ConfigValue::Number(*value));
    }
    config
}

/// A registry with one consumer slot per name, all in the `CExampleClass` group.
fn consumer(registry: &mut BindingRegistry, names: &[&str]) -> (ListenerCollector, Vec<OffsetSlot>) {
    let collector = ListenerCollector::new();
    let slots: Vec<OffsetSlot> = names.iter().map(|_| OffsetSlot::new()).collect();
    for (name, slot) in names.iter().zip(&slots) {
        collector.insert_slot(registry.symbol(name), slot);
    }
    let group = registry.offsets_binding(CLASS);
    registry.add_listener(group, &collector);
    (collector, slots)
}

fn counting(count: &Rc<Cell<u32>>) -> Writeback {
    let count = Rc::clone(count);
    Box::new(move |value| {
        if value.is_some() {
            count.set(count.get() + 1);
        }
        Ok(())
    })
}

#[test]
fn loading_twice_yields_identical_slots() {
    let host = SchemaDump::new();
    let config = offsets(&[("m_iHealth", 8), ("m_vecOrigin", 24)]);
    let mut registry = BindingRegistry::new();
    let (_collector, slots) = consumer(&mut registry, &["m_iHealth", "m_vecOrigin"]);

    let resolver = Resolver::new(&host);
    let first = resolver.load(&mut registry, &config);
    let after_first: Vec<_> = slots.iter().map(OffsetSlot::get).collect();
    let second = resolver.load(&mut registry, &config);
    let after_second: Vec<_> = slots.iter().map(OffsetSlot::get).collect();

    assert!(first.success && second.success);
    assert_eq!(after_first, vec![Some(8), Some(24)]);
    assert_eq!(after_first, after_second);
    assert_eq!(first.resolved, second.resolved);
}

#[test]
fn clear_restores_the_sentinel() {
    let host = SchemaDump::new();
    let mut registry = BindingRegistry::new();
    let (_collector, slots) = consumer(&mut registry, &["m_iHealth", "m_vecOrigin"]);
    Resolver::new(&host).load(&mut registry, &offsets(&[("m_iHealth", 8), ("m_vecOrigin", 24)]));
    assert!(slots.iter().all(OffsetSlot::is_resolved));

    registry.clear();
    for slot in &slots {
        assert_eq!(slot.raw(), -1);
        assert!(!slot.is_resolved());
    }
}

#[test]
#[should_panic(expected = "unresolved offset slot")]
fn read_after_clear_fails_fast() {
    let host = SchemaDump::new();
    let mut registry = BindingRegistry::new();
    let (_collector, slots) = consumer(&mut registry, &["m_iHealth"]);
    Resolver::new(&host).load(&mut registry, &offsets(&[("m_iHealth", 0)]));
    registry.clear();

    let object = [0u32; 4];
    unsafe {
        read_field::<u32>(object.as_ptr().cast(), &slots[0]);
    }
}

#[test]
#[should_panic(expected = "unresolved offset slot")]
fn write_through_unresolved_slot_fails_fast() {
    let slot = OffsetSlot::new();
    let mut object = [0u32; 4];
    unsafe {
        write_field::<u32>(object.as_mut_ptr().cast(), &slot, 7);
    }
}

#[test]
#[should_panic(expected = "virtual call on an unresolved offset slot")]
fn virtual_call_through_unresolved_slot_fails_fast() {
    extern "C" fn never(_this: *mut c_void) -> i32 {
        0
    }
    let table = [never as usize];
    let mut object = table.as_ptr();
    let slot = OffsetSlot::new();
    let _: i32 = unsafe {
        invoke_virtual!(
            (&mut object as *mut *const usize).cast(),
            &slot,
            extern "C" fn(*mut c_void) -> i32
        )
    };
}

#[test]
fn partial_failure_keeps_resolved_symbols() {
    let host = SchemaDump::new();
    let mut registry = BindingRegistry::new();
    let (_collector, slots) = consumer(&mut registry, &["m_iHealth", "m_iArmor"]);

    let report = Resolver::new(&host).load(&mut registry, &offsets(&[("m_iHealth", 12)]));
    assert!(!report.success);
    assert_eq!(slots[0].get(), Some(12));
    assert!(!slots[1].is_resolved());

    let messages = report.messages();
    assert_eq!(messages.len(), 1, "{:?}", messages);
    assert!(messages[0].contains("m_iArmor"));
    assert!(messages[0].contains(CLASS));
}

#[test]
fn optional_failures_do_not_fail_the_load() {
    let host = SchemaDump::new();
    let mut registry = BindingRegistry::new();
    let collector = ListenerCollector::new();
    let required = OffsetSlot::new();
    let optional = OffsetSlot::new();
    collector.insert_slot(registry.symbol("m_iHealth"), &required);
    collector.insert_optional(registry.symbol("m_flNewerField"), optional.writeback());
    let group = registry.offsets_binding(CLASS);
    registry.add_listener(group, &collector);

    let report = Resolver::new(&host).load(&mut registry, &offsets(&[("m_iHealth", 4)]));
    assert!(report.success);
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].requirement, Requirement::Optional);
    assert!(report.messages()[0].contains("m_flNewerField"));
}

#[test]
fn interning_is_stable_and_distinct() {
    let mut table = SymbolTable::new();
    let active = table.intern("m_bActive");
    assert_eq!(table.intern("m_bActive"), active);
    let target = table.intern("m_hTarget");
    assert_ne!(active, target);
    assert_eq!(table.resolve(active), "m_bActive");
    assert_eq!(table.len(), 2);
}

#[test]
fn every_consumer_of_a_symbol_is_written_once_per_pass() {
    let host = SchemaDump::new();
    let config = offsets(&[("m_iHealth", 32)]);
    let mut registry = BindingRegistry::new();
    let symbol = registry.symbol("m_iHealth");
    let group = registry.offsets_binding(CLASS);

    let first_count = Rc::new(Cell::new(0));
    let second_count = Rc::new(Cell::new(0));
    let first = ListenerCollector::new();
    let second = ListenerCollector::new();
    first.insert(symbol, counting(&first_count));
    second.insert(symbol, counting(&second_count));
    registry.add_listener(group, &first);
    registry.add_listener(group, &second);

    let resolver = Resolver::new(&host);
    let report = resolver.load(&mut registry, &config);
    assert!(report.success);
    assert_eq!(report.resolved, 1);
    assert_eq!((first_count.get(), second_count.get()), (1, 1));

    resolver.load(&mut registry, &config);
    assert_eq!((first_count.get(), second_count.get()), (2, 2));
}

#[test]
fn dropped_consumers_are_not_written() {
    let host = SchemaDump::new();
    let config = offsets(&[("m_iHealth", 32)]);
    let mut registry = BindingRegistry::new();
    let symbol = registry.symbol("m_iHealth");
    let group = registry.offsets_binding(CLASS);

    let count = Rc::new(Cell::new(0));
    let kept = ListenerCollector::new();
    kept.insert(symbol, counting(&count));
    registry.add_listener(group, &kept);
    {
        let dropped = ListenerCollector::new();
        dropped.insert(symbol, counting(&count));
        registry.add_listener(group, &dropped);
    }

    Resolver::new(&host).load(&mut registry, &config);
    assert_eq!(count.get(), 1);
}

#[test]
fn health_offset_end_to_end() {
    let host = SchemaDump::new();
    let mut registry = BindingRegistry::new();
    let health_offset = OffsetSlot::new();
    assert_eq!(health_offset.raw(), -1);

    let collector = ListenerCollector::new();
    collector.insert_slot(registry.symbol("m_flHealth"), &health_offset);
    let group = registry.offsets_binding(CLASS);
    registry.add_listener(group, &collector);

    let resolver = Resolver::new(&host);
    let report = resolver.load(&mut registry, &offsets(&[("m_flHealth", 64)]));
    assert!(report.success);
    assert_eq!(health_offset.raw(), 64);

    registry.clear();
    let report = resolver.load(&mut registry, &GameConfig::new());
    assert!(!report.success);
    assert_eq!(health_offset.raw(), -1);
    assert!(report.messages().iter().any(|m| m.contains("m_flHealth")));
}

#[test]
fn reload_follows_version_drift() {
    #[repr(C)]
    struct Old {
        pad: [u8; 16],
        flags: u32,
    }
    #[repr(C)]
    struct New {
        pad: [u8; 20],
        flags: u32,
    }

    let host = SchemaDump::new();
    let mut registry = BindingRegistry::new();
    let (_collector, slots) = consumer(&mut registry, &["m_nFlags"]);
    let resolver = Resolver::new(&host);

    resolver.load(&mut registry, &offsets(&[("m_nFlags", 16)]));
    assert_eq!(slots[0].get(), Some(16));
    let old = Old { pad: [0; 16], flags: 0xAA };
    assert_eq!(unsafe { read_field::<u32>((&old as *const Old).cast(), &slots[0]) }, 0xAA);

    registry.clear();
    resolver.load(&mut registry, &offsets(&[("m_nFlags", 20)]));
    assert_eq!(slots[0].get(), Some(20));
    let new = New { pad: [0; 20], flags: 0xBB };
    assert_eq!(unsafe { read_field::<u32>((&new as *const New).cast(), &slots[0]) }, 0xBB);
}

#[test]
fn class_fields_come_from_host_metadata() {
    let host = SchemaDump::new().with_class(CLASS, [("m_flHealth", 64), ("m_nFlags", 16)]);
    let mut registry = BindingRegistry::new();
    let class = registry.find_class_binding(&host, CLASS).unwrap();
    let health = OffsetSlot::new();
    let flags = OffsetSlot::new();
    let collector = ListenerCollector::new();
    collector.insert_slot(registry.field_symbol(class, "m_flHealth"), &health);
    collector.insert_slot(registry.field_symbol(class, "m_nFlags"), &flags);
    registry.add_listener(class, &collector);

    // Gamedata overrides what the host reports.
    let report = Resolver::new(&host).load(&mut registry, &offsets(&[("m_nFlags", 20)]));
    assert!(report.success, "{:?}", report.messages());
    assert_eq!(health.get(), Some(64));
    assert_eq!(flags.get(), Some(20));
}

#[test]
fn unknown_class_is_an_error_not_a_crash() {
    let host = SchemaDump::new();
    let mut registry = BindingRegistry::new();
    assert!(registry.find_class_binding(&host, "CMissing").is_err());

    // Consistently unknown, even if the host learns about it later.
    let host = SchemaDump::new().with_class("CMissing", [("m_x", 0)]);
    assert!(registry.find_class_binding(&host, "CMissing").is_err());
    registry.reset_class_cache();
    assert!(registry.find_class_binding(&host, "CMissing").is_ok());
}
