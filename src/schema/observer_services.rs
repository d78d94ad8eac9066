use std::ffi::c_void;

use crate::accessor::Field;
use crate::error::Result;
use crate::host::HostMetadata;
use crate::listener::{ListenerCollector, Requirement};
use crate::registry::BindingRegistry;
use crate::schema::{bind_fields, EntityHandle, SchemaHelper};

pub const CLASS_NAME: &str = "CPlayer_ObserverServices";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverMode {
    None,
    Fixed,
    InEye,
    Chase,
    Roaming,
    Directed,
    Unknown(u8),
}

impl ObserverMode {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::None,
            1 => Self::Fixed,
            2 => Self::InEye,
            3 => Self::Chase,
            4 => Self::Roaming,
            5 => Self::Directed,
            other => Self::Unknown(other),
        }
    }

    pub fn is_spectating(self) -> bool {
        !matches!(self, Self::None)
    }
}

#[derive(Default)]
pub struct ObserverServicesHelper {
    collector: ListenerCollector,
    observer_mode: Field<u8>,
    pub observer_target: Field<EntityHandle>,
}

impl ObserverServicesHelper {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Safety
    /// `services` must point to a live `CPlayer_ObserverServices`.
    pub unsafe fn observer_mode(&self, services: *const c_void) -> ObserverMode {
        ObserverMode::from_u8(self.observer_mode.get(services))
    }
}

impl SchemaHelper for ObserverServicesHelper {
    fn class_name(&self) -> &'static str {
        CLASS_NAME
    }

    fn add_listeners(&mut self, registry: &mut BindingRegistry, host: &dyn HostMetadata) -> Result<()> {
        let class = registry.find_class_binding(host, CLASS_NAME)?;
        bind_fields(
            registry,
            class,
            &self.collector,
            [
                ("m_iObserverMode", self.observer_mode.slot(), Requirement::Required),
                ("m_hObserverTarget", self.observer_target.slot(), Requirement::Required),
            ],
        );
        Ok(())
    }

    fn clear(&mut self) {
        self.collector.clear();
        self.observer_mode.slot().reset();
        self.observer_target.slot().reset();
    }
}
