//! Per-class helpers: consumers of the binding registry that own typed
//! fields of one host class each.
//!
//! A helper for a derived class composes the helpers of its bases
//! explicitly; every unit registers and resolves on its own.

mod game_scene_node;
mod observer_services;
mod player_pawn;
mod point_orient;

pub use game_scene_node::GameSceneNodeHelper;
pub use observer_services::{ObserverMode, ObserverServicesHelper};
pub use player_pawn::{PlayerPawnBaseHelper, PlayerPawnHelper, MAX_PLAYERS};
pub use point_orient::{PointOrientConstraint, PointOrientGoalDirection, PointOrientHelper};

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::host::HostMetadata;
use crate::listener::{ListenerCollector, Requirement};
use crate::registry::{BindingId, BindingRegistry};
use crate::slot::OffsetSlot;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct QAngle {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

/// Serial-number-tagged reference to a host entity.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityHandle(pub u32);

impl EntityHandle {
    pub const INVALID: EntityHandle = EntityHandle(0xFFFF_FFFF);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

pub trait SchemaHelper {
    /// Host class name this helper binds to.
    fn class_name(&self) -> &'static str;

    fn add_listeners(&mut self, registry: &mut BindingRegistry, host: &dyn HostMetadata) -> Result<()>;

    /// Resets every slot and drops the registrations.
    fn clear(&mut self);
}

/// Registers `fields` of `class` on `collector` and queues it on the binding.
pub(crate) fn bind_fields<'a>(
    registry: &mut BindingRegistry,
    class: BindingId,
    collector: &ListenerCollector,
    fields: impl IntoIterator<Item = (&'a str, &'a OffsetSlot, Requirement)>,
) {
    collector.clear();
    for (name, slot, requirement) in fields {
        let symbol = registry.field_symbol(class, name);
        collector.push(symbol, slot.writeback(), requirement);
    }
    debug!(
        "Queued {} fields on {}",
        collector.len(),
        registry.binding_name(class)
    );
    registry.add_listener(class, collector);
}

/// Ordered collaborator units, each registered and cleared in turn.
#[derive(Default)]
pub struct Collaborators {
    helpers: Vec<Box<dyn SchemaHelper>>,
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, helper: Box<dyn SchemaHelper>) {
        self.helpers.push(helper);
    }

    pub fn with(mut self, helper: impl SchemaHelper + 'static) -> Self {
        self.push(Box::new(helper));
        self
    }

    pub fn len(&self) -> usize {
        self.helpers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.helpers.is_empty()
    }

    /// Registers every helper. A helper whose class is missing does not stop
    /// the others; its error is returned alongside its class name.
    pub fn add_listeners(
        &mut self,
        registry: &mut BindingRegistry,
        host: &dyn HostMetadata,
    ) -> Vec<(&'static str, Error)> {
        let mut failures = Vec::new();
        for helper in &mut self.helpers {
            if let Err(e) = helper.add_listeners(registry, host) {
                warn!("{} disabled: {}", helper.class_name(), e);
                failures.push((helper.class_name(), e));
            }
        }
        failures
    }

    pub fn clear(&mut self) {
        for helper in &mut self.helpers {
            helper.clear();
        }
    }
}
