use std::fmt;

use log::{debug, info, warn};
use thiserror::Error;

use crate::error::Error;
use crate::gamedata::{ConfigSource, ConfigValue};
use crate::host::HostMetadata;
use crate::listener::{ListenerCollector, Requirement};
use crate::registry::{BindingId, BindingKind, BindingRegistry};
use crate::signature::Signature;
use crate::symbol::Symbol;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiagnosticKind {
    #[error("no gamedata entry")]
    ConfigMissing,
    #[error("host lookup failed: {0}")]
    HostLookupFailed(String),
    #[error("unsupported gamedata value: {0}")]
    UnsupportedValue(String),
    #[error("value {0} does not fit the consumer's slot")]
    ValueOutOfRange(i64),
    #[error("writeback failed: {0}")]
    WritebackFailed(String),
}

/// One unresolved symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub group: String,
    pub symbol: String,
    pub requirement: Requirement,
    pub kind: DiagnosticKind,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}: {}", self.group, self.symbol, self.kind)?;
        if self.requirement == Requirement::Optional {
            f.write_str(" (optional)")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// No symbol with a required listener failed.
    pub success: bool,
    /// Symbols whose value reached every writeback.
    pub resolved: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl LoadReport {
    pub fn messages(&self) -> Vec<String> {
        self.diagnostics.iter().map(ToString::to_string).collect()
    }
}

/// Runs resolver passes against one host.
pub struct Resolver<'h> {
    host: &'h dyn HostMetadata,
}

impl<'h> Resolver<'h> {
    pub fn new(host: &'h dyn HostMetadata) -> Self {
        Self { host }
    }

    /// Clears and re-resolves every binding that has listeners.
    ///
    /// Never stops at the first failure: every resolvable symbol is written
    /// back and every unresolved one is reported.
    pub fn load(&self, registry: &mut BindingRegistry, config: &dyn ConfigSource) -> LoadReport {
        let pruned = registry.prune();
        if pruned > 0 {
            debug!("Pruned {} dropped listener collectors", pruned);
        }

        let pending: Vec<BindingId> = registry
            .bindings()
            .filter(|(_, b)| b.has_listeners())
            .map(|(id, _)| id)
            .collect();

        for &id in &pending {
            registry.clear_binding(id);
        }

        let mut report = LoadReport {
            success: true,
            ..Default::default()
        };
        for id in pending {
            self.load_binding(registry, id, config, &mut report);
        }

        if report.success {
            info!(
                "Resolver pass complete: {} symbols resolved, {} diagnostics",
                report.resolved,
                report.diagnostics.len()
            );
        } else {
            warn!(
                "Resolver pass failed: {} symbols resolved, {} diagnostics",
                report.resolved,
                report.diagnostics.len()
            );
        }
        report
    }

    fn load_binding(
        &self,
        registry: &mut BindingRegistry,
        id: BindingId,
        config: &dyn ConfigSource,
        report: &mut LoadReport,
    ) {
        let group = registry.binding_name(id).to_string();

        // The class may have moved or vanished since the binding was created.
        let mut kind = registry.binding(id).kind();
        let mut class_missing = false;
        if let BindingKind::Class(_) = kind {
            match self.host.class_by_name(&group) {
                Some(handle) => {
                    registry.set_class_handle(id, handle);
                    kind = BindingKind::Class(handle);
                }
                None => class_missing = true,
            }
        }

        let binding = registry.binding(id);
        let collectors = binding.collectors();
        for symbol in binding.requested_symbols() {
            let name = registry.symbol_name(symbol);
            let requirement = requirement_of(&collectors, id, symbol);

            let resolved = if class_missing {
                Err(DiagnosticKind::HostLookupFailed(format!(
                    "host exposes no class named \"{}\"",
                    group
                )))
            } else {
                self.resolve(kind, &group, name, config)
            };

            let outcome = resolved.and_then(|value| {
                let mut failure = None;
                for collector in &collectors {
                    collector.for_each_in(id, symbol, |entry| match entry.apply(Some(value)) {
                        Ok(()) => {}
                        Err(Error::ValueOutOfRange { value, .. }) => {
                            failure = Some(DiagnosticKind::ValueOutOfRange(value));
                        }
                        Err(e) => failure = Some(DiagnosticKind::WritebackFailed(e.to_string())),
                    });
                }
                match failure {
                    Some(kind) => Err(kind),
                    None => Ok(value),
                }
            });

            match outcome {
                Ok(value) => {
                    debug!("{}::{} = 0x{:X}", group, name, value);
                    report.resolved += 1;
                }
                Err(kind) => {
                    let diagnostic = Diagnostic {
                        group: group.clone(),
                        symbol: name.to_string(),
                        requirement,
                        kind,
                    };
                    warn!("{}", diagnostic);
                    if requirement == Requirement::Required {
                        report.success = false;
                    }
                    report.diagnostics.push(diagnostic);
                }
            }
        }
    }

    fn resolve(
        &self,
        kind: BindingKind,
        group: &str,
        symbol: &str,
        config: &dyn ConfigSource,
    ) -> Result<i64, DiagnosticKind> {
        match (config.lookup(group, symbol), kind) {
            (Some(ConfigValue::Number(value)), _) => Ok(value),

            (Some(ConfigValue::Name(alias)), BindingKind::Class(class)) => self
                .host
                .field_offset(class, &alias)
                .ok_or_else(|| DiagnosticKind::HostLookupFailed(format!("no field \"{}\"", alias))),
            (Some(ConfigValue::Name(alias)), BindingKind::Addresses) => self
                .host
                .address_of(&alias)
                .map(|address| address as i64)
                .ok_or_else(|| DiagnosticKind::HostLookupFailed(format!("no global \"{}\"", alias))),
            (Some(ConfigValue::Name(alias)), BindingKind::Offsets) => Err(
                DiagnosticKind::UnsupportedValue(format!("name \"{}\" in an offsets group", alias)),
            ),

            (Some(ConfigValue::Signature(signature)), BindingKind::Addresses) => {
                self.scan(&signature)
            }
            (Some(ConfigValue::Signature(signature)), other) => Err(DiagnosticKind::UnsupportedValue(
                format!("signature \"{}\" in a {} group", signature, other.label()),
            )),

            (None, BindingKind::Class(class)) => self
                .host
                .field_offset(class, symbol)
                .ok_or_else(|| DiagnosticKind::HostLookupFailed("no such field in host metadata".into())),
            (None, _) => Err(DiagnosticKind::ConfigMissing),
        }
    }

    fn scan(&self, signature: &Signature) -> Result<i64, DiagnosticKind> {
        let found = self.host.find_signature(signature).ok_or_else(|| {
            DiagnosticKind::HostLookupFailed(format!("signature \"{}\" not found", signature))
        })?;
        let address = (found as i64)
            .checked_add(signature.offset)
            .ok_or(DiagnosticKind::ValueOutOfRange(signature.offset))?;
        if !signature.relative {
            return Ok(address);
        }

        let bytes = usize::try_from(address)
            .ok()
            .and_then(|at| self.host.read_bytes(at, 4))
            .filter(|bytes| bytes.len() == 4)
            .ok_or_else(|| {
                DiagnosticKind::HostLookupFailed(format!("cannot read displacement at 0x{:X}", address))
            })?;
        let displacement = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        Ok(address + 4 + i64::from(displacement))
    }
}

fn requirement_of(collectors: &[ListenerCollector], binding: BindingId, symbol: Symbol) -> Requirement {
    let mut requirement = Requirement::Optional;
    for collector in collectors {
        collector.for_each_in(binding, symbol, |entry| {
            if entry.requirement == Requirement::Required {
                requirement = Requirement::Required;
            }
        });
    }
    requirement
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gamedata::GameConfig;
    use crate::host::{LayeredHost, ModuleImage, SchemaDump};
    use crate::slot::{AddressSlot, OffsetSlot};

    #[test]
    fn class_fields_fall_back_to_host_metadata() {
        let host = SchemaDump::new().with_class("CGameSceneNode", [("m_pParent", 0x38), ("m_vecAbsOrigin", 0xD0)]);
        let config = GameConfig::new().with("CGameSceneNode", "m_vecAbsOrigin", ConfigValue::Number(0xD4));
        let mut registry = BindingRegistry::new();
        let class = registry.find_class_binding(&host, "CGameSceneNode").unwrap();

        let parent = OffsetSlot::new();
        let origin = OffsetSlot::new();
        let collector = ListenerCollector::new();
        collector.insert_slot(registry.field_symbol(class, "m_pParent"), &parent);
        collector.insert_slot(registry.field_symbol(class, "m_vecAbsOrigin"), &origin);
        registry.add_listener(class, &collector);

        let report = Resolver::new(&host).load(&mut registry, &config);
        assert!(report.success);
        assert_eq!(report.resolved, 2);
        assert_eq!(parent.get(), Some(0x38));
        assert_eq!(origin.get(), Some(0xD4));
    }

    #[test]
    fn offsets_groups_require_gamedata() {
        let host = SchemaDump::new();
        let mut registry = BindingRegistry::new();
        let group = registry.offsets_binding("CBasePlayerPawn");
        let slot = OffsetSlot::new();
        let collector = ListenerCollector::new();
        collector.insert_slot(registry.symbol("CBasePlayerPawn::GetEyePosition"), &slot);
        registry.add_listener(group, &collector);

        let report = Resolver::new(&host).load(&mut registry, &GameConfig::new());
        assert!(!report.success);
        assert_eq!(report.diagnostics[0].kind, DiagnosticKind::ConfigMissing);
        assert_eq!(
            report.messages(),
            vec!["CBasePlayerPawn::CBasePlayerPawn::GetEyePosition: no gamedata entry".to_string()]
        );
    }

    #[test]
    fn optional_failures_keep_success() {
        let host = SchemaDump::new();
        let mut registry = BindingRegistry::new();
        let group = registry.offsets_binding("Offsets");
        let collector = ListenerCollector::new();
        let slot = OffsetSlot::new();
        collector.insert_optional(registry.symbol("Newer::Method"), slot.writeback());
        registry.add_listener(group, &collector);

        let report = Resolver::new(&host).load(&mut registry, &GameConfig::new());
        assert!(report.success);
        assert_eq!(report.diagnostics.len(), 1);
        assert!(report.messages()[0].ends_with("(optional)"));
    }

    #[test]
    fn addresses_resolve_by_name_and_relative_signature() {
        // lea rdi, [rip + 0x10] at 0x1001; the displacement sits at 0x1004.
        let bytes = [0x90, 0x48, 0x8D, 0x3D, 0x10, 0x00, 0x00, 0x00, 0xC3];
        let image = ModuleImage::new(0x1000, &bytes);
        let dump = SchemaDump::new().with_global("s_GameEventManager", 0x7000);
        let host = LayeredHost::new().with(&dump).with(&image);

        let config = GameConfig::new()
            .with(
                "CSource2Server",
                "&s_GameEventManager",
                ConfigValue::Signature(Signature::parse("48 8D 3D ? ? ? ?").unwrap().with_offset(3).relative(true)),
            )
            .with("CSource2Server", "&g_pGlobals", ConfigValue::Name("s_GameEventManager".into()));

        let mut registry = BindingRegistry::new();
        let group = registry.addresses_binding("CSource2Server");
        let manager = AddressSlot::new();
        let globals = AddressSlot::new();
        let collector = ListenerCollector::new();
        collector.insert_slot(registry.symbol("&s_GameEventManager"), &manager);
        collector.insert_slot(registry.symbol("&g_pGlobals"), &globals);
        registry.add_listener(group, &collector);

        let report = Resolver::new(&host).load(&mut registry, &config);
        assert!(report.success, "{:?}", report.messages());
        assert_eq!(manager.get(), Some(0x1004 + 4 + 0x10));
        assert_eq!(globals.get(), Some(0x7000));
    }

    #[test]
    fn unsupported_values_are_reported() {
        let host = SchemaDump::new().with_class("C", []);
        let config = GameConfig::new()
            .with("C", "sig", ConfigValue::Signature(Signature::parse("AA").unwrap()))
            .with("O", "name", ConfigValue::Name("x".into()));
        let mut registry = BindingRegistry::new();
        let class = registry.find_class_binding(&host, "C").unwrap();
        let offsets = registry.offsets_binding("O");

        let collector = ListenerCollector::new();
        let a = OffsetSlot::new();
        let b = OffsetSlot::new();
        collector.insert_slot(registry.symbol("sig"), &a);
        registry.add_listener(class, &collector);
        collector.insert_slot(registry.symbol("name"), &b);
        registry.add_listener(offsets, &collector);

        let report = Resolver::new(&host).load(&mut registry, &config);
        assert!(!report.success);
        assert_eq!(report.diagnostics.len(), 2, "{:?}", report.messages());
        assert!(report
            .diagnostics
            .iter()
            .all(|d| matches!(d.kind, DiagnosticKind::UnsupportedValue(_))));
        assert!(report.diagnostics.iter().any(|d| d.group == "C" && d.symbol == "sig"));
        assert!(report.diagnostics.iter().any(|d| d.group == "O" && d.symbol == "name"));
    }

    #[test]
    fn shared_collector_resolves_each_entry_on_its_own_binding() {
        let host = SchemaDump::new().with_class("CFoo", [("m_x", 8)]);
        let config = GameConfig::new()
            .with("Other", "m_x", ConfigValue::Number(99))
            .with("Other", "m_y", ConfigValue::Number(24));
        let mut registry = BindingRegistry::new();
        let class = registry.find_class_binding(&host, "CFoo").unwrap();
        let other = registry.offsets_binding("Other");

        let x = OffsetSlot::new();
        let y = OffsetSlot::new();
        let collector = ListenerCollector::new();
        collector.insert_slot(registry.field_symbol(class, "m_x"), &x);
        registry.add_listener(class, &collector);
        collector.insert_slot(registry.symbol("m_y"), &y);
        registry.add_listener(other, &collector);

        let resolver = Resolver::new(&host);
        for _ in 0..2 {
            let report = resolver.load(&mut registry, &config);
            assert!(report.success, "{:?}", report.messages());
            assert_eq!(report.resolved, 2);
            assert!(report.diagnostics.is_empty());
            assert_eq!(x.get(), Some(8));
            assert_eq!(y.get(), Some(24));
        }
        assert_eq!(registry.binding(class).requested_symbols().len(), 1);
        assert_eq!(registry.binding(other).requested_symbols().len(), 1);
    }

    #[test]
    fn any_writeback_error_fails_the_symbol() {
        let host = SchemaDump::new();
        let config = GameConfig::new().with("O", "slot", ConfigValue::Number(3));
        let mut registry = BindingRegistry::new();
        let group = registry.offsets_binding("O");
        let collector = ListenerCollector::new();
        collector.insert(
            registry.symbol("slot"),
            Box::new(|value| match value {
                Some(_) => Err(Error::SlotOccupied(3)),
                None => Ok(()),
            }),
        );
        registry.add_listener(group, &collector);

        let report = Resolver::new(&host).load(&mut registry, &config);
        assert!(!report.success);
        assert_eq!(report.resolved, 0);
        assert_eq!(report.diagnostics.len(), 1);
        assert!(matches!(report.diagnostics[0].kind, DiagnosticKind::WritebackFailed(_)));
        assert!(report.messages()[0].contains("already associated"));
    }

    #[test]
    fn failing_reset_does_not_stop_the_pass() {
        let host = SchemaDump::new();
        let config = GameConfig::new().with("O", "slot", ConfigValue::Number(3));
        let mut registry = BindingRegistry::new();
        let group = registry.offsets_binding("O");
        let collector = ListenerCollector::new();
        collector.insert(
            registry.symbol("slot"),
            Box::new(|value| match value {
                Some(_) => Ok(()),
                None => Err(Error::SlotOccupied(3)),
            }),
        );
        registry.add_listener(group, &collector);

        let report = Resolver::new(&host).load(&mut registry, &config);
        assert!(report.success);
        assert_eq!(report.resolved, 1);
    }

    #[test]
    fn out_of_range_values_are_reported() {
        let host = SchemaDump::new();
        let config = GameConfig::new().with("O", "big", ConfigValue::Number(i64::MAX));
        let mut registry = BindingRegistry::new();
        let group = registry.offsets_binding("O");
        let slot = OffsetSlot::new();
        let collector = ListenerCollector::new();
        collector.insert_slot(registry.symbol("big"), &slot);
        registry.add_listener(group, &collector);

        let report = Resolver::new(&host).load(&mut registry, &config);
        assert!(!report.success);
        assert_eq!(report.diagnostics[0].kind, DiagnosticKind::ValueOutOfRange(i64::MAX));
        assert_eq!(slot.get(), None);
    }
}
