//! # Deferred Commands
//!
//! Structural changes requested while a phase is running. Systems only hold
//! `&Registry` inside a phase, so spawns, despawns and component or flag
//! changes are queued here and applied by the world at the next phase
//! boundary, in submission order.
//!
//! Each system owns one queue; the scheduler drains the queues in system
//! registration order, so the applied order does not depend on how the
//! phase was parallelized.

use atlas_core::{Component, ComponentTypeId, EntityId, FlagId, Registry, SimResult};
use atlas_world::Body;
use parking_lot::Mutex;

/// Attaches one component to a freshly created or existing entity.
pub type ComponentInit = Box<dyn FnOnce(&mut Registry, EntityId) -> SimResult<()> + Send>;

fn init<C: Component>(ty: ComponentTypeId, value: C) -> ComponentInit {
    Box::new(move |registry, id| registry.add_component(id, ty, value))
}

/// Everything needed to create one entity.
#[derive(Default)]
pub struct Spawn {
    pub(crate) body: Option<Body>,
    pub(crate) components: Vec<ComponentInit>,
    pub(crate) flags: Vec<FlagId>,
}

impl Spawn {
    /// An entity with no body and no components.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Places the entity in the active grid and the broad phase.
    #[must_use]
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    /// Attaches a component.
    #[must_use]
    pub fn with<C: Component>(mut self, ty: ComponentTypeId, value: C) -> Self {
        self.components.push(init(ty, value));
        self
    }

    /// Sets a flag.
    #[must_use]
    pub fn with_flag(mut self, flag: FlagId) -> Self {
        self.flags.push(flag);
        self
    }

    /// The body, if any.
    #[must_use]
    pub const fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }
}

/// One queued structural change.
pub enum Command {
    /// Create an entity.
    Spawn(Spawn),
    /// Destroy an entity and unlink it from grid, broad phase and bus.
    Despawn(EntityId),
    /// Attach a component to an existing entity.
    AddComponent {
        /// Target.
        entity: EntityId,
        /// Component type, for diagnostics.
        component: ComponentTypeId,
        /// Typed insertion.
        init: ComponentInit,
    },
    /// Detach a component.
    RemoveComponent {
        /// Target.
        entity: EntityId,
        /// Component type.
        component: ComponentTypeId,
    },
    /// Set a flag.
    AddFlag {
        /// Target.
        entity: EntityId,
        /// Flag.
        flag: FlagId,
    },
    /// Clear a flag.
    RemoveFlag {
        /// Target.
        entity: EntityId,
        /// Flag.
        flag: FlagId,
    },
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn(spawn) => f
                .debug_struct("Spawn")
                .field("body", &spawn.body)
                .field("components", &spawn.components.len())
                .field("flags", &spawn.flags)
                .finish(),
            Self::Despawn(id) => f.debug_tuple("Despawn").field(id).finish(),
            Self::AddComponent { entity, component, .. } => f
                .debug_struct("AddComponent")
                .field("entity", entity)
                .field("component", component)
                .finish(),
            Self::RemoveComponent { entity, component } => f
                .debug_struct("RemoveComponent")
                .field("entity", entity)
                .field("component", component)
                .finish(),
            Self::AddFlag { entity, flag } => f
                .debug_struct("AddFlag")
                .field("entity", entity)
                .field("flag", flag)
                .finish(),
            Self::RemoveFlag { entity, flag } => f
                .debug_struct("RemoveFlag")
                .field("entity", entity)
                .field("flag", flag)
                .finish(),
        }
    }
}

/// A system's buffer of structural changes for the current phase.
#[derive(Default)]
pub struct CommandQueue {
    commands: Mutex<Vec<Command>>,
}

impl CommandQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues any command.
    pub fn push(&self, command: Command) {
        self.commands.lock().push(command);
    }

    /// Queues an entity creation.
    pub fn spawn(&self, spawn: Spawn) {
        self.push(Command::Spawn(spawn));
    }

    /// Queues an entity destruction.
    pub fn despawn(&self, entity: EntityId) {
        self.push(Command::Despawn(entity));
    }

    /// Queues a component attachment.
    pub fn add_component<C: Component>(&self, entity: EntityId, component: ComponentTypeId, value: C) {
        self.push(Command::AddComponent {
            entity,
            component,
            init: init(component, value),
        });
    }

    /// Queues a component removal.
    pub fn remove_component(&self, entity: EntityId, component: ComponentTypeId) {
        self.push(Command::RemoveComponent { entity, component });
    }

    /// Queues setting a flag.
    pub fn add_flag(&self, entity: EntityId, flag: FlagId) {
        self.push(Command::AddFlag { entity, flag });
    }

    /// Queues clearing a flag.
    pub fn remove_flag(&self, entity: EntityId, flag: FlagId) {
        self.push(Command::RemoveFlag { entity, flag });
    }

    /// Number of queued commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.lock().len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.lock().is_empty()
    }

    /// Takes every queued command, oldest first.
    pub fn drain(&self) -> Vec<Command> {
        std::mem::take(&mut *self.commands.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_preserves_order() {
        let queue = CommandQueue::new();
        let a = EntityId::new(1, 0);
        let b = EntityId::new(2, 0);
        queue.despawn(a);
        queue.spawn(Spawn::new());
        queue.despawn(b);
        assert_eq!(queue.len(), 3);

        let drained = queue.drain();
        assert!(queue.is_empty());
        assert!(matches!(drained[0], Command::Despawn(id) if id == a));
        assert!(matches!(drained[1], Command::Spawn(_)));
        assert!(matches!(drained[2], Command::Despawn(id) if id == b));
    }

    #[test]
    fn test_component_init_applies_typed_value() {
        let mut registry = Registry::new(4);
        let health = registry.register_component_type::<f32>("health").unwrap();
        let id = registry.create_entity().unwrap();

        let queue = CommandQueue::new();
        queue.add_component(id, health, 75.0_f32);
        for command in queue.drain() {
            if let Command::AddComponent { entity, init, .. } = command {
                init(&mut registry, entity).unwrap();
            }
        }
        assert_eq!(registry.get::<f32>(id, health).unwrap(), 75.0);
    }
}
