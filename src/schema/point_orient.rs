use std::ffi::c_void;

use crate::accessor::Field;
use crate::error::Result;
use crate::host::HostMetadata;
use crate::listener::{ListenerCollector, Requirement};
use crate::registry::BindingRegistry;
use crate::schema::{bind_fields, EntityHandle, SchemaHelper};

pub const CLASS_NAME: &str = "CPointOrient";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointOrientGoalDirection {
    AbsOrigin,
    Center,
    Head,
    Forward,
    EyesForward,
    Unknown(u32),
}

impl PointOrientGoalDirection {
    pub fn from_u32(v: u32) -> Self {
        match v {
            0 => Self::AbsOrigin,
            1 => Self::Center,
            2 => Self::Head,
            3 => Self::Forward,
            4 => Self::EyesForward,
            other => Self::Unknown(other),
        }
    }

    pub fn to_u32(self) -> u32 {
        match self {
            Self::AbsOrigin => 0,
            Self::Center => 1,
            Self::Head => 2,
            Self::Forward => 3,
            Self::EyesForward => 4,
            Self::Unknown(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointOrientConstraint {
    None,
    PreserveUpAxis,
    Unknown(u32),
}

impl PointOrientConstraint {
    pub fn from_u32(v: u32) -> Self {
        match v {
            0 => Self::None,
            1 => Self::PreserveUpAxis,
            other => Self::Unknown(other),
        }
    }
}

/// Fields of `CPointOrient`, the entity that keeps another entity facing a target.
#[derive(Default)]
pub struct PointOrientHelper {
    collector: ListenerCollector,
    /// `CUtlSymbolLarge`, a pointer to the interned string.
    pub spawn_target_name: Field<*const c_void>,
    pub target: Field<EntityHandle>,
    /// Raw `bool` byte. Read it through [`PointOrientHelper::is_active`].
    pub active: Field<u8>,
    goal_direction: Field<u32>,
    constraint: Field<u32>,
    pub max_turn_rate: Field<f32>,
    pub last_game_time: Field<f32>,
}

impl PointOrientHelper {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Safety
    /// `orient` must point to a live `CPointOrient`.
    pub unsafe fn is_active(&self, orient: *const c_void) -> bool {
        self.active.get(orient) != 0
    }

    /// # Safety
    /// `orient` must point to a live `CPointOrient`.
    pub unsafe fn set_active(&self, orient: *mut c_void, active: bool) {
        self.active.set(orient, u8::from(active))
    }

    /// # Safety
    /// `orient` must point to a live `CPointOrient`.
    pub unsafe fn goal_direction(&self, orient: *const c_void) -> PointOrientGoalDirection {
        PointOrientGoalDirection::from_u32(self.goal_direction.get(orient))
    }

    /// # Safety
    /// `orient` must point to a live `CPointOrient`.
    pub unsafe fn set_goal_direction(&self, orient: *mut c_void, direction: PointOrientGoalDirection) {
        self.goal_direction.set(orient, direction.to_u32())
    }

    /// # Safety
    /// `orient` must point to a live `CPointOrient`.
    pub unsafe fn constraint(&self, orient: *const c_void) -> PointOrientConstraint {
        PointOrientConstraint::from_u32(self.constraint.get(orient))
    }

    pub fn is_resolved(&self) -> bool {
        self.target.is_resolved() && self.active.is_resolved() && self.goal_direction.is_resolved()
    }
}

impl SchemaHelper for PointOrientHelper {
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
                ("m_iszSpawnTargetName", self.spawn_target_name.slot(), Requirement::Required),
                ("m_hTarget", self.target.slot(), Requirement::Required),
                ("m_bActive", self.active.slot(), Requirement::Required),
                ("m_nGoalDirection", self.goal_direction.slot(), Requirement::Required),
                ("m_nConstraint", self.constraint.slot(), Requirement::Required),
                ("m_flMaxTurnRate", self.max_turn_rate.slot(), Requirement::Required),
                // Absent from older builds.
                ("m_flLastGameTime", self.last_game_time.slot(), Requirement::Optional),
            ],
        );
        Ok(())
    }

    fn clear(&mut self) {
        self.collector.clear();
        for slot in [
            self.spawn_target_name.slot(),
            self.target.slot(),
            self.active.slot(),
            self.goal_direction.slot(),
            self.constraint.slot(),
            self.max_turn_rate.slot(),
            self.last_game_time.slot(),
        ] {
            slot.reset();
        }
    }
}
