use std::ffi::c_void;

use crate::accessor::Field;
use crate::error::Result;
use crate::host::HostMetadata;
use crate::listener::{ListenerCollector, Requirement};
use crate::registry::BindingRegistry;
use crate::schema::{bind_fields, QAngle, SchemaHelper, Vector};

pub const CLASS_NAME: &str = "CGameSceneNode";

#[derive(Default)]
pub struct GameSceneNodeHelper {
    collector: ListenerCollector,
    pub parent: Field<*mut c_void>,
    pub abs_origin: Field<Vector>,
    pub abs_rotation: Field<QAngle>,
    /// `CUtlStringToken`, the hashed attachment name.
    pub hierarchy_attach_name: Field<u32>,
}

impl GameSceneNodeHelper {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchemaHelper for GameSceneNodeHelper {
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
                ("m_pParent", self.parent.slot(), Requirement::Required),
                ("m_vecAbsOrigin", self.abs_origin.slot(), Requirement::Required),
                ("m_angAbsRotation", self.abs_rotation.slot(), Requirement::Required),
                ("m_hierarchyAttachName", self.hierarchy_attach_name.slot(), Requirement::Required),
            ],
        );
        Ok(())
    }

    fn clear(&mut self) {
        self.collector.clear();
        self.parent.slot().reset();
        self.abs_origin.slot().reset();
        self.abs_rotation.slot().reset();
        self.hierarchy_attach_name.slot().reset();
    }
}
