use std::ffi::c_void;

use log::debug;

use crate::accessor::Field;
use crate::error::Result;
use crate::host::HostMetadata;
use crate::listener::{ListenerCollector, Requirement};
use crate::registry::BindingRegistry;
use crate::schema::point_orient::PointOrientHelper;
use crate::schema::{bind_fields, EntityHandle, PointOrientGoalDirection, QAngle, SchemaHelper};
use crate::slot_table::BoundedTable;

pub const BASE_CLASS_NAME: &str = "CCSPlayerPawnBase";
pub const CLASS_NAME: &str = "CCSPlayerPawn";

/// Player slots the host can hand out.
pub const MAX_PLAYERS: usize = 64;

#[derive(Default)]
pub struct PlayerPawnBaseHelper {
    collector: ListenerCollector,
    pub view_model_services: Field<*mut c_void>,
    pub camera_services: Field<*mut c_void>,
    pub eye_angles: Field<QAngle>,
}

impl PlayerPawnBaseHelper {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchemaHelper for PlayerPawnBaseHelper {
    fn class_name(&self) -> &'static str {
        BASE_CLASS_NAME
    }

    fn add_listeners(&mut self, registry: &mut BindingRegistry, host: &dyn HostMetadata) -> Result<()> {
        let class = registry.find_class_binding(host, BASE_CLASS_NAME)?;
        bind_fields(
            registry,
            class,
            &self.collector,
            [
                ("m_pViewModelServices", self.view_model_services.slot(), Requirement::Required),
                ("m_pCameraServices", self.camera_services.slot(), Requirement::Required),
                ("m_angEyeAngles", self.eye_angles.slot(), Requirement::Required),
            ],
        );
        Ok(())
    }

    fn clear(&mut self) {
        self.collector.clear();
        self.view_model_services.slot().reset();
        self.camera_services.slot().reset();
        self.eye_angles.slot().reset();
    }
}

/// `CCSPlayerPawn`: the pawn base fields plus the point-orient entity each
/// player gets attached, tracked by player slot.
pub struct PlayerPawnHelper {
    pub base: PlayerPawnBaseHelper,
    pub point_orient: PointOrientHelper,
    point_orients: BoundedTable<EntityHandle, MAX_PLAYERS>,
}

impl PlayerPawnHelper {
    pub fn new() -> Self {
        Self {
            base: PlayerPawnBaseHelper::new(),
            point_orient: PointOrientHelper::new(),
            point_orients: BoundedTable::new(),
        }
    }

    /// Associates a point-orient entity with a player. Fails if the slot is
    /// out of range or already tracks a different entity.
    pub fn set_point_orient(&mut self, player_slot: u32, orient: EntityHandle) -> Result<()> {
        self.point_orients.insert(player_slot, orient)?;
        debug!("Player slot {} tracks point orient {:?}", player_slot, orient);
        Ok(())
    }

    pub fn point_orient(&self, player_slot: u32) -> Result<Option<EntityHandle>> {
        Ok(self.point_orients.get(player_slot)?.copied())
    }

    /// Forgets the player's point-orient entity and returns it so the caller can remove it.
    pub fn remove_point_orient(&mut self, player_slot: u32) -> Result<Option<EntityHandle>> {
        self.point_orients.remove(player_slot)
    }

    pub fn tracked_point_orients(&self) -> impl Iterator<Item = (u32, EntityHandle)> + '_ {
        self.point_orients.iter().map(|(slot, handle)| (slot, *handle))
    }

    /// Activates a freshly created point-orient entity and aims it along the eyes.
    ///
    /// # Safety
    /// `orient` must point to a live `CPointOrient`.
    pub unsafe fn prepare_point_orient(&self, orient: *mut c_void) {
        self.point_orient.set_active(orient, true);
        self.point_orient
            .set_goal_direction(orient, PointOrientGoalDirection::EyesForward);
    }

    /// # Safety
    /// `pawn` must point to a live `CCSPlayerPawn`.
    pub unsafe fn eye_angles(&self, pawn: *const c_void) -> QAngle {
        self.base.eye_angles.get(pawn)
    }
}

impl Default for PlayerPawnHelper {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaHelper for PlayerPawnHelper {
    fn class_name(&self) -> &'static str {
        CLASS_NAME
    }

    fn add_listeners(&mut self, registry: &mut BindingRegistry, host: &dyn HostMetadata) -> Result<()> {
        let base = self.base.add_listeners(registry, host);
        let point_orient = self.point_orient.add_listeners(registry, host);
        base.and(point_orient)
    }

    fn clear(&mut self) {
        self.base.clear();
        self.point_orient.clear();
        self.point_orients.clear();
    }
}
