//! # Simulation World
//!
//! Owns every store the systems share and performs all structural work.
//!
//! ```text
//! ┌──────────────────────────── World ─────────────────────────────┐
//! │ Registry ─ entities, components, flags                         │
//! │ EventBus ─ schema, queues                                      │
//! │ RwLock<BroadPhase> ─ static + moveable proxies                 │
//! │ RwLock<ActiveGrid> ─ window around the focus, entity -> cell   │
//! │ CellStreamer ─ records to and from the CellStore               │
//! │ Arc<ResourceTable> ─ immutable templates                       │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Inside a phase, systems only see a [`WorldView`]. Between phases the
//! scheduler calls the boundary methods here with `&mut World`:
//! `apply_commands`, `apply_streaming` and `resort`.

use std::sync::Arc;
use std::time::Duration;

use atlas_core::{Bound, EntityId, EventBus, EventSchema, FlagId, Registry, SimError, SimResult};
use atlas_shared::Vec3;
use atlas_world::{
    ActiveGrid, Body, BroadPhase, CellCoord, CellOp, CellRecord, CellState, CellStore,
    CellStreamer, DirCellStore, EntityRecord, MemoryCellStore, StreamResult,
};
use parking_lot::{RwLock, RwLockReadGuard};

use crate::commands::{Command, ComponentInit, Spawn};
use crate::config::SimulationConfig;
use crate::resources::ResourceTable;
use crate::system::WorldView;

/// Counters from one round of streaming work.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamingStats {
    /// Loads submitted, including retries.
    pub loads_requested: usize,
    /// Cells that became active.
    pub cells_loaded: usize,
    /// Cells that left the window.
    pub cells_evicted: usize,
    /// Entities brought back from records.
    pub entities_restored: usize,
    /// Entities written into records.
    pub entities_saved: usize,
    /// Failed loads (the cells stay pending).
    pub load_failures: usize,
    /// Failed saves (the records are kept and retried).
    pub save_failures: usize,
    /// Saves resubmitted after a failure.
    pub saves_retried: usize,
    /// Cells restored from a record the store had not confirmed yet.
    pub cells_recovered: usize,
}

impl StreamingStats {
    fn absorb(&mut self, other: Self) {
        self.loads_requested += other.loads_requested;
        self.cells_loaded += other.cells_loaded;
        self.cells_evicted += other.cells_evicted;
        self.entities_restored += other.entities_restored;
        self.entities_saved += other.entities_saved;
        self.load_failures += other.load_failures;
        self.save_failures += other.save_failures;
        self.saves_retried += other.saves_retried;
        self.cells_recovered += other.cells_recovered;
    }
}

/// The simulation world.
pub struct World {
    config: SimulationConfig,
    registry: Registry,
    bus: EventBus,
    broad_phase: RwLock<BroadPhase>,
    grid: RwLock<ActiveGrid>,
    resources: Arc<ResourceTable>,
    streamer: CellStreamer,
    /// Pairs computed at the last `resort`.
    overlaps: Vec<(EntityId, EntityId)>,
    pending_focus: Option<Vec3>,
    frame: u64,
}

impl World {
    /// Creates a world whose cell store follows `config.persistence_dir`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for a bad config, `IoFailure` if the persistence
    /// directory or the I/O worker cannot be created.
    pub fn new(
        config: SimulationConfig,
        schema: Arc<EventSchema>,
        resources: Arc<ResourceTable>,
    ) -> SimResult<Self> {
        let store: Box<dyn CellStore> = match &config.persistence_dir {
            Some(dir) => Box::new(DirCellStore::open(dir)?),
            None => Box::new(MemoryCellStore::new()),
        };
        Self::with_store(config, schema, resources, store)
    }

    /// Creates a world over an explicit cell store.
    ///
    /// The initial focus is applied immediately; with inline I/O the
    /// window's cells are active on return.
    ///
    /// # Errors
    ///
    /// As `new`.
    pub fn with_store(
        config: SimulationConfig,
        schema: Arc<EventSchema>,
        resources: Arc<ResourceTable>,
        store: Box<dyn CellStore>,
    ) -> SimResult<Self> {
        config.validate()?;
        let grid = ActiveGrid::new(config.grid_config())?;
        let streamer = if config.inline_io {
            CellStreamer::inline(store, config.load_retry_frames)
        } else {
            CellStreamer::spawn(store, config.load_retry_frames)?
        };

        let mut world = Self {
            registry: Registry::new(config.entity_capacity),
            bus: EventBus::with_capacity(schema, config.event_queue_hint),
            broad_phase: RwLock::new(BroadPhase::new()),
            grid: RwLock::new(grid),
            resources,
            streamer,
            overlaps: Vec::new(),
            pending_focus: Some(config.focus),
            frame: 0,
            config,
        };
        let stats = world.apply_streaming();

        tracing::info!(
            capacity = world.config.entity_capacity,
            window = world.config.window_size,
            lattice = ?world.config.lattice,
            inline_io = world.config.inline_io,
            loads = stats.loads_requested,
            "world created"
        );
        Ok(world)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Startup configuration.
    #[must_use]
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Current frame number.
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// Entity registry.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Mutable registry for setup (component and flag registration).
    ///
    /// Destroy entities through [`World::despawn`], never through the
    /// registry directly, or the grid and broad phase keep stale entries.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Event bus.
    #[must_use]
    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Immutable templates.
    #[must_use]
    pub fn resources(&self) -> &ResourceTable {
        &self.resources
    }

    /// Shared lock on the broad phase.
    pub fn broad_phase(&self) -> RwLockReadGuard<'_, BroadPhase> {
        self.broad_phase.read()
    }

    /// Shared lock on the active grid.
    pub fn grid(&self) -> RwLockReadGuard<'_, ActiveGrid> {
        self.grid.read()
    }

    /// Cell streamer.
    #[must_use]
    pub const fn streamer(&self) -> &CellStreamer {
        &self.streamer
    }

    /// State of a cell as the world sees it.
    ///
    /// A cell that left the window stays `PendingEvict` until the store
    /// confirms its record.
    #[must_use]
    pub fn cell_state(&self, coord: CellCoord) -> CellState {
        match self.grid.read().cell_state(coord) {
            CellState::Unloaded if self.streamer.has_unsaved(coord) => CellState::PendingEvict,
            state => state,
        }
    }

    /// Overlapping pairs as of the last `resort`, sorted.
    #[must_use]
    pub fn overlaps(&self) -> &[(EntityId, EntityId)] {
        &self.overlaps
    }

    /// What systems see inside a phase.
    #[must_use]
    pub fn view(&self) -> WorldView<'_> {
        WorldView {
            frame: self.frame,
            registry: &self.registry,
            bus: &self.bus,
            broad_phase: &self.broad_phase,
            grid: &self.grid,
            resources: &self.resources,
            overlaps: &self.overlaps,
        }
    }

    pub(crate) fn advance_frame(&mut self) {
        self.frame += 1;
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Creates an entity, optionally with a body in the grid and broad phase.
    ///
    /// # Errors
    ///
    /// As [`World::spawn_with`].
    pub fn spawn(&mut self, body: Option<Body>) -> SimResult<EntityId> {
        let spawn = match body {
            Some(body) => Spawn::new().with_body(body),
            None => Spawn::new(),
        };
        self.spawn_with(spawn)
    }

    /// Creates an entity with its components, flags and body.
    ///
    /// Either everything is attached or the entity is not created.
    ///
    /// # Errors
    ///
    /// - `OutOfRange` if the body lies outside the active window, in a cell
    ///   that has not loaded yet, or at a non-finite position
    /// - `CapacityExceeded` if the registry is full
    /// - any error from attaching a component or flag
    pub fn spawn_with(&mut self, spawn: Spawn) -> SimResult<EntityId> {
        let Spawn {
            body,
            components,
            flags,
        } = spawn;
        if let Some(body) = &body {
            self.check_placement(body.position)?;
        }

        let id = self.registry.create_entity()?;
        if let Err(error) = self.populate(id, components, flags, body.as_ref()) {
            self.despawn(id).ok();
            return Err(error);
        }
        tracing::trace!(entity = %id, "spawned");
        Ok(id)
    }

    fn populate(
        &mut self,
        id: EntityId,
        components: Vec<ComponentInit>,
        flags: Vec<FlagId>,
        body: Option<&Body>,
    ) -> SimResult<()> {
        for init in components {
            init(&mut self.registry, id)?;
        }
        for flag in flags {
            self.registry.add_flag(id, flag)?;
        }
        if let Some(body) = body {
            self.place(id, body)?;
        }
        Ok(())
    }

    fn check_placement(&self, position: Vec3) -> SimResult<()> {
        let grid = self.grid.read();
        grid.check_placement(grid.cell_at(position)?)
    }

    fn place(&mut self, id: EntityId, body: &Body) -> SimResult<()> {
        self.grid.get_mut().update_entity_cell(id, body.position)?;
        self.broad_phase
            .get_mut()
            .insert(id, body.aabb(), body.mobility)
    }

    /// Destroys an entity and unlinks it from the grid, the broad phase and
    /// every event subscription.
    ///
    /// # Errors
    ///
    /// `NotFound` if the entity is not alive; nothing is changed.
    pub fn despawn(&mut self, id: EntityId) -> SimResult<()> {
        self.registry.resolve(id)?;
        self.grid.get_mut().remove_entity(id).ok();
        self.broad_phase.get_mut().remove(id).ok();
        self.bus.unregister_all(id);
        self.registry.destroy_entity(id)?;
        tracing::trace!(entity = %id, "despawned");
        Ok(())
    }

    /// Applies queued structural changes in order.
    ///
    /// A failing command is logged and skipped; the rest still apply.
    /// Returns the failures.
    pub fn apply_commands(&mut self, commands: Vec<Command>) -> Vec<SimError> {
        let mut errors = Vec::new();
        for command in commands {
            let result = match command {
                Command::Spawn(spawn) => self.spawn_with(spawn).map(|_| ()),
                Command::Despawn(id) => self.despawn(id),
                Command::AddComponent { entity, init, .. } => init(&mut self.registry, entity),
                Command::RemoveComponent { entity, component } => {
                    self.registry.remove_component(entity, component)
                }
                Command::AddFlag { entity, flag } => self.registry.add_flag(entity, flag),
                Command::RemoveFlag { entity, flag } => self.registry.remove_flag(entity, flag),
            };
            if let Err(error) = result {
                tracing::warn!(%error, "deferred command failed");
                errors.push(error);
            }
        }
        errors
    }

    // =========================================================================
    // Broad phase
    // =========================================================================

    /// Restores the sweep order and recomputes the overlap pairs.
    ///
    /// Returns the number of swaps.
    pub fn resort(&mut self) -> usize {
        let broad_phase = self.broad_phase.get_mut();
        let swaps = broad_phase.resort();
        self.overlaps = broad_phase.compute_overlaps();
        tracing::trace!(swaps, overlaps = self.overlaps.len(), "broad phase resorted");
        swaps
    }

    // =========================================================================
    // Focus and streaming
    // =========================================================================

    /// Moves the window centre at the next boundary.
    ///
    /// # Errors
    ///
    /// `OutOfRange` if `position` is outside the world lattice or not
    /// finite.
    pub fn request_focus(&mut self, position: Vec3) -> SimResult<()> {
        let grid = self.grid.get_mut();
        let cell = grid.cell_at(position)?;
        if !grid.config().lattice.contains(cell) {
            return Err(SimError::OutOfRange(Bound::World(cell.to_array())));
        }
        self.pending_focus = Some(position);
        Ok(())
    }

    /// Applies the pending focus move, resubmits due load and save retries
    /// and integrates finished loads and saves.
    ///
    /// Evictions are applied before loads, so a cell's save always reaches
    /// the store ahead of any later load of the same cell. A cell whose
    /// save is still unconfirmed is restored from the kept record.
    pub fn apply_streaming(&mut self) -> StreamingStats {
        let mut stats = StreamingStats::default();

        if let Some(position) = self.pending_focus.take() {
            match self.grid.get_mut().set_focus(position) {
                Ok(transitions) => {
                    for (coord, op) in transitions {
                        match op {
                            CellOp::Evict => {
                                self.streamer.cancel_retry(coord);
                                self.evict_cell(coord, &mut stats);
                            }
                            CellOp::Load => match self.streamer.take_unsaved(coord) {
                                Some(record) => {
                                    tracing::debug!(cell = %coord, "cell recovered from unconfirmed save");
                                    stats.cells_recovered += 1;
                                    self.activate_cell(coord, Some(&record), &mut stats);
                                }
                                None => {
                                    self.streamer.request_load(coord);
                                    stats.loads_requested += 1;
                                }
                            },
                        }
                    }
                }
                Err(error) => tracing::warn!(%error, "focus move rejected"),
            }
        }

        for coord in self.streamer.due_retries(self.frame) {
            if self.grid.get_mut().cell_state(coord) == CellState::PendingLoad {
                tracing::debug!(cell = %coord, "retrying cell load");
                self.streamer.request_load(coord);
                stats.loads_requested += 1;
            }
        }

        for coord in self.streamer.resubmit_due_saves(self.frame) {
            tracing::debug!(cell = %coord, "retrying cell save");
            stats.saves_retried += 1;
        }

        for result in self.streamer.poll() {
            self.integrate(result, &mut stats);
        }
        stats
    }

    /// Blocks until every in-flight load and save finished or `timeout`
    /// passed without progress.
    pub fn flush_streaming(&mut self, timeout: Duration) -> StreamingStats {
        let mut stats = self.apply_streaming();
        while self.streamer.in_flight() > 0 {
            let Some(result) = self.streamer.recv_timeout(timeout) else {
                tracing::warn!(in_flight = self.streamer.in_flight(), "cell I/O did not finish");
                break;
            };
            let mut step = StreamingStats::default();
            self.integrate(result, &mut step);
            stats.absorb(step);
        }
        stats
    }

    fn evict_cell(&mut self, coord: CellCoord, stats: &mut StreamingStats) {
        let evicted = match self.grid.get_mut().complete_evict(coord) {
            Ok(evicted) => evicted,
            Err(error) => {
                tracing::error!(cell = %coord, %error, "eviction of untracked cell");
                return;
            }
        };

        if evicted.was_loaded {
            let mut record = CellRecord::new(coord, self.registry.schema_table());
            for &id in &evicted.entities {
                let body = {
                    let broad_phase = self.broad_phase.get_mut();
                    match (broad_phase.own_bounds(id), broad_phase.mobility(id)) {
                        (Ok(aabb), Ok(mobility)) => Some(Body::from_aabb(&aabb, mobility)),
                        _ => None,
                    }
                };
                match self.registry.snapshot_entity(id) {
                    Ok(snapshot) => record.entities.push(EntityRecord { body, snapshot }),
                    Err(error) => tracing::warn!(cell = %coord, entity = %id, %error, "entity not saved"),
                }
            }
            let saved = record.entities.len();
            match self.streamer.request_save(record) {
                Ok(()) => stats.entities_saved += saved,
                Err(error) => {
                    stats.save_failures += 1;
                    tracing::error!(cell = %coord, %error, lost = saved, "cell record cannot be encoded");
                }
            }
        } else if !evicted.entities.is_empty() {
            // The stored record is still the authoritative one.
            tracing::warn!(
                cell = %coord,
                dropped = evicted.entities.len(),
                "cell left the window before its load completed"
            );
        }

        for id in evicted.entities {
            self.broad_phase.get_mut().remove(id).ok();
            self.bus.unregister_all(id);
            self.registry.destroy_entity(id).ok();
        }
        stats.cells_evicted += 1;
        tracing::debug!(cell = %coord, "cell evicted");
    }

    fn integrate(&mut self, result: StreamResult, stats: &mut StreamingStats) {
        match result {
            StreamResult::Loaded { coord, record } => {
                if self.grid.get_mut().cell_state(coord) != CellState::PendingLoad {
                    tracing::debug!(cell = %coord, "discarding load of a cell no longer pending");
                    return;
                }
                self.activate_cell(coord, record.as_ref(), stats);
            }
            StreamResult::LoadFailed { coord, error } => {
                stats.load_failures += 1;
                if self.grid.get_mut().cell_state(coord) != CellState::PendingLoad {
                    return;
                }
                match self.grid.get_mut().mark_load_failed(coord) {
                    Ok(failures) => {
                        tracing::warn!(cell = %coord, failures, %error, "cell load failed, will retry");
                        self.streamer.schedule_retry(coord, self.frame);
                    }
                    Err(error) => tracing::error!(cell = %coord, %error, "failed cell vanished"),
                }
            }
            StreamResult::Saved { coord, ticket } => {
                if self.streamer.confirm_save(coord, ticket) {
                    tracing::trace!(cell = %coord, "cell saved");
                }
            }
            StreamResult::SaveFailed {
                coord,
                ticket,
                error,
            } => {
                stats.save_failures += 1;
                if self.streamer.schedule_save_retry(coord, ticket, self.frame) {
                    tracing::warn!(cell = %coord, %error, "cell save failed, will retry");
                }
            }
        }
    }

    /// Makes a pending cell active, then brings back its record's entities.
    fn activate_cell(&mut self, coord: CellCoord, record: Option<&CellRecord>, stats: &mut StreamingStats) {
        if let Err(error) = self.grid.get_mut().mark_loaded(coord) {
            tracing::error!(cell = %coord, %error, "loaded cell vanished from the window");
            return;
        }
        if let Some(record) = record {
            stats.entities_restored += self.restore_cell(record);
        }
        stats.cells_loaded += 1;
        tracing::debug!(cell = %coord, "cell loaded");
    }

    fn restore_cell(&mut self, record: &CellRecord) -> usize {
        let mut restored = 0;
        for entry in &record.entities {
            let id = match self.registry.restore_entity(&entry.snapshot, &record.schema) {
                Ok(id) => id,
                Err(error) => {
                    tracing::warn!(cell = %record.coord, %error, "entity not restored");
                    continue;
                }
            };
            if let Some(body) = &entry.body {
                if let Err(error) = self.place(id, body) {
                    tracing::warn!(cell = %record.coord, entity = %id, %error, "restored entity has no place");
                    self.despawn(id).ok();
                    continue;
                }
            }
            restored += 1;
        }
        restored
    }
}
