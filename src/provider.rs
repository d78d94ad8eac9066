//! Consumers of gamedata groups: virtual-table indices and global addresses
//! that host metadata cannot describe.

use std::ffi::c_void;

use crate::accessor::global_ptr;
use crate::invoke_virtual;
use crate::listener::ListenerCollector;
use crate::registry::BindingRegistry;
use crate::schema::Vector;
use crate::slot::{AddressSlot, OffsetSlot};

pub const BASE_PLAYER_PAWN_GROUP: &str = "CBasePlayerPawn";
pub const GET_EYE_POSITION: &str = "CBasePlayerPawn::GetEyePosition";

pub const SOURCE2_SERVER_GROUP: &str = "CSource2Server";
pub const GAME_EVENT_MANAGER: &str = "&s_GameEventManager";

// MSVC member functions return aggregates through a pointer passed after `this`.
#[cfg(windows)]
type GetEyePositionFn = extern "C" fn(*mut c_void, *mut Vector) -> *mut Vector;
#[cfg(not(windows))]
type GetEyePositionFn = extern "C" fn(*mut c_void) -> Vector;

pub struct BasePlayerPawnData {
    collector: ListenerCollector,
    get_eye_position: OffsetSlot,
}

impl BasePlayerPawnData {
    pub fn new(registry: &mut BindingRegistry) -> Self {
        let collector = ListenerCollector::new();
        let get_eye_position = OffsetSlot::new();

        let group = registry.offsets_binding(BASE_PLAYER_PAWN_GROUP);
        collector.insert_slot(registry.symbol(GET_EYE_POSITION), &get_eye_position);
        registry.add_listener(group, &collector);

        Self {
            collector,
            get_eye_position,
        }
    }

    pub fn get_eye_position_index(&self) -> Option<i32> {
        self.get_eye_position.get()
    }

    /// Calls the pawn's `GetEyePosition` virtual.
    ///
    /// # Safety
    /// `pawn` must point to a live `CBasePlayerPawn` of the loaded host build.
    pub unsafe fn eye_position(&self, pawn: *mut c_void) -> Vector {
        #[cfg(windows)]
        {
            let mut eye = Vector::default();
            invoke_virtual!(
                pawn,
                &self.get_eye_position,
                GetEyePositionFn,
                &mut eye as *mut Vector
            );
            eye
        }
        #[cfg(not(windows))]
        {
            invoke_virtual!(pawn, &self.get_eye_position, GetEyePositionFn)
        }
    }

    pub fn reset(&self) {
        self.get_eye_position.reset();
    }

    pub fn collector(&self) -> &ListenerCollector {
        &self.collector
    }
}

pub struct Source2ServerData {
    collector: ListenerCollector,
    game_event_manager: AddressSlot,
}

impl Source2ServerData {
    pub fn new(registry: &mut BindingRegistry) -> Self {
        let collector = ListenerCollector::new();
        let game_event_manager = AddressSlot::new();

        let group = registry.addresses_binding(SOURCE2_SERVER_GROUP);
        collector.insert_slot(registry.symbol(GAME_EVENT_MANAGER), &game_event_manager);
        registry.add_listener(group, &collector);

        Self {
            collector,
            game_event_manager,
        }
    }

    /// Location of the host's game event manager pointer, once resolved.
    pub fn game_event_manager_ptr(&self) -> Option<*mut *mut c_void> {
        self.game_event_manager
            .is_resolved()
            .then(|| global_ptr(&self.game_event_manager))
    }

    pub fn reset(&self) {
        self.game_event_manager.reset();
    }

    pub fn collector(&self) -> &ListenerCollector {
        &self.collector
    }
}

/// Every gamedata consumer, registered together.
pub struct GameDataStorage {
    pub base_player_pawn: BasePlayerPawnData,
    pub source2_server: Source2ServerData,
}

impl GameDataStorage {
    pub fn new(registry: &mut BindingRegistry) -> Self {
        Self {
            base_player_pawn: BasePlayerPawnData::new(registry),
            source2_server: Source2ServerData::new(registry),
        }
    }

    pub fn reset(&self) {
        self.base_player_pawn.reset();
        self.source2_server.reset();
    }

    pub fn is_resolved(&self) -> bool {
        self.base_player_pawn.get_eye_position_index().is_some()
            && self.source2_server.game_event_manager_ptr().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gamedata::{ConfigValue, GameConfig};
    use crate::host::SchemaDump;
    use crate::resolver::Resolver;

    #[repr(C)]
    struct FakePawn {
        vtable: *const usize,
        eye: Vector,
    }

    extern "C" fn unused(_this: *mut c_void) -> Vector {
        Vector::default()
    }

    #[cfg(windows)]
    extern "C" fn get_eye_position(this: *mut c_void, out: *mut Vector) -> *mut Vector {
        unsafe { *out = (*this.cast::<FakePawn>()).eye };
        out
    }

    #[cfg(not(windows))]
    extern "C" fn get_eye_position(this: *mut c_void) -> Vector {
        unsafe { (*this.cast::<FakePawn>()).eye }
    }

    #[test]
    fn eye_position_call_matches_the_platform_convention() {
        let mut registry = BindingRegistry::new();
        let data = BasePlayerPawnData::new(&mut registry);
        let config =
            GameConfig::new().with(BASE_PLAYER_PAWN_GROUP, GET_EYE_POSITION, ConfigValue::Number(0));
        Resolver::new(&SchemaDump::new()).load(&mut registry, &config);

        let table: [usize; 1] = [get_eye_position as usize];
        let mut pawn = FakePawn {
            vtable: table.as_ptr(),
            eye: Vector { x: -3.5, y: 8.0, z: 17.25 },
        };
        let eye = unsafe { data.eye_position((&mut pawn as *mut FakePawn).cast()) };
        assert_eq!(eye, pawn.eye);
    }

    #[test]
    fn resolves_and_calls_through_gamedata() {
        let host = SchemaDump::new().with_global("s_GameEventManager", 0x5000);
        let config = GameConfig::new()
            .with(BASE_PLAYER_PAWN_GROUP, GET_EYE_POSITION, ConfigValue::Number(1))
            .with(
                SOURCE2_SERVER_GROUP,
                GAME_EVENT_MANAGER,
                ConfigValue::Name("s_GameEventManager".into()),
            );

        let mut registry = BindingRegistry::new();
        let storage = GameDataStorage::new(&mut registry);
        assert!(!storage.is_resolved());

        let report = Resolver::new(&host).load(&mut registry, &config);
        assert!(report.success, "{:?}", report.messages());
        assert!(storage.is_resolved());
        assert_eq!(
            storage.source2_server.game_event_manager_ptr(),
            Some(0x5000 as *mut *mut c_void)
        );

        let table: [usize; 2] = [unused as usize, get_eye_position as usize];
        let mut pawn = FakePawn {
            vtable: table.as_ptr(),
            eye: Vector { x: 1.0, y: 2.0, z: 64.0 },
        };
        let eye = unsafe {
            storage
                .base_player_pawn
                .eye_position((&mut pawn as *mut FakePawn).cast())
        };
        assert_eq!(eye.z, 64.0);

        storage.reset();
        assert!(!storage.is_resolved());
    }

    #[test]
    fn missing_gamedata_is_reported_per_symbol() {
        let host = SchemaDump::new();
        let mut registry = BindingRegistry::new();
        let storage = GameDataStorage::new(&mut registry);

        let report = Resolver::new(&host).load(&mut registry, &GameConfig::new());
        assert!(!report.success);
        let messages = report.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().any(|m| m.contains(GET_EYE_POSITION)));
        assert!(messages.iter().any(|m| m.contains(GAME_EVENT_MANAGER)));
        assert!(storage.source2_server.game_event_manager_ptr().is_none());
        assert_eq!(storage.base_player_pawn.collector().len(), 1);
    }
}
