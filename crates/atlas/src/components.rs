//! # Gameplay Components
//!
//! Plain-old-data blocks attached to entities by the sample systems. Every
//! component is `Pod` so a cell eviction can snapshot it as raw bytes.
//!
//! References to other entities are stored as `EntityId`, which is a weak
//! reference: it never keeps the target alive and every dereference goes
//! through the registry's generation check.

use atlas_core::{ComponentTypeId, EntityId, FlagId, Registry, SimResult};
use atlas_shared::Vec3;
use bytemuck::{Pod, Zeroable};

/// Kinematic state of a moving entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Transform {
    /// World position.
    pub position: Vec3,
    /// Unit heading.
    pub direction: Vec3,
    /// World units per second.
    pub velocity: Vec3,
    /// Acceleration applied during the last step.
    pub acceleration: Vec3,
}

impl Transform {
    /// A transform at rest.
    #[must_use]
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// A transform moving along `direction` at `speed`.
    #[must_use]
    pub fn moving(position: Vec3, direction: Vec3, speed: f32) -> Self {
        let direction = direction.normalize_or_zero();
        Self {
            position,
            direction,
            velocity: direction * speed,
            acceleration: Vec3::ZERO,
        }
    }
}

/// A missile in flight.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Missile {
    /// Launcher that fired it.
    pub owner: EntityId,
    /// `MissileResource` id.
    pub resource: u32,
    /// Seconds since launch.
    pub age: f32,
}

/// A bullet in flight.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Bullet {
    /// Shooter.
    pub owner: EntityId,
    /// `BulletResource` id.
    pub resource: u32,
    /// Distance flown so far.
    pub travelled: f32,
}

/// Fires missiles at a fixed interval.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Launcher {
    /// Where missiles appear.
    pub muzzle: Vec3,
    /// Launch direction.
    pub aim: Vec3,
    /// Launch speed.
    pub muzzle_speed: f32,
    /// `MissileResource` id.
    pub resource: u32,
    /// Seconds between shots.
    pub interval: f32,
    /// Seconds until the next shot.
    pub cooldown: f32,
    /// Shots left.
    pub remaining: u32,
}

/// A static region that reports moveable entities entering and leaving it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct TriggerVolume {
    /// Entity notified of crossings, typically a door.
    pub owner: EntityId,
}

/// A door opened by its trigger volumes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Door {
    /// Entities currently inside the door's trigger volumes.
    pub occupants: u32,
    /// Times the door has opened.
    pub times_opened: u32,
}

/// Component type and flag ids for the sample systems.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GameComponents {
    /// `Transform`.
    pub transform: ComponentTypeId,
    /// `Missile`.
    pub missile: ComponentTypeId,
    /// `Bullet`.
    pub bullet: ComponentTypeId,
    /// `Launcher`.
    pub launcher: ComponentTypeId,
    /// `TriggerVolume`.
    pub trigger_volume: ComponentTypeId,
    /// `Door`.
    pub door: ComponentTypeId,
    /// Set while a door is open.
    pub door_open: FlagId,
}

impl GameComponents {
    /// Registers every gameplay component type and flag.
    ///
    /// Registering twice returns the same ids.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` if a name is already taken by another type,
    /// `CapacityExceeded` if the registry is out of type or flag slots.
    pub fn register(registry: &mut Registry) -> SimResult<Self> {
        Ok(Self {
            transform: registry.register_component_type::<Transform>("transform")?,
            missile: registry.register_component_type::<Missile>("missile")?,
            bullet: registry.register_component_type::<Bullet>("bullet")?,
            launcher: registry.register_component_type::<Launcher>("launcher")?,
            trigger_volume: registry.register_component_type::<TriggerVolume>("trigger_volume")?,
            door: registry.register_component_type::<Door>("door")?,
            door_open: registry.register_flag("door_open")?,
        })
    }
}
