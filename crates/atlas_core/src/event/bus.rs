//! # Event Bus
//!
//! Typed, schema-driven messages with per-receiver delivery.
//!
//! ## Lifecycle
//!
//! ```text
//! begin_event_writing ─> write* ─> end_event_writing ─> EventId (sealed)
//!                                                          │
//!                              send_event(to, id) ─────────┤
//!                                                          ▼
//!            update() drains queues ─> Delivery ─> begin_event_reading
//!                                                          │
//!                                      read* ─> end_event_reading (gone)
//! ```
//!
//! Sends from systems running concurrently in one phase funnel through a
//! crossbeam channel; `update()` moves them into per-receiver queues and
//! drains every queue once, FIFO. An event is read at most once.
//!
//! A sealed event that is neither sent nor read survives one `update()`
//! and is dropped by the next.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use super::schema::{EventSchema, EventType, PropertyId, ValueType};
use super::value::Value;
use crate::ecs::EntityId;
use crate::error::{Bound, Missing, SimError, SimResult};

/// Handle to a sealed event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

impl EventId {
    /// Raw id.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ev{}", self.0)
    }
}

/// One event handed to a receiver by `update()`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Delivery {
    /// The subscribed entity.
    pub receiver: EntityId,
    /// Category of the event.
    pub event_type: EventType,
    /// The event to read.
    pub event: EventId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EventState {
    /// Written, not yet sent.
    Sealed,
    /// Sent, waiting in a queue.
    Queued,
    /// Handed out by `update()`, not yet read.
    Delivered,
}

#[derive(Debug)]
struct StoredEvent {
    event_type: EventType,
    entries: Vec<(PropertyId, Value)>,
    state: EventState,
    /// Number of `update()` calls before the event was sealed.
    sealed_at: u64,
}

#[derive(Default)]
struct ReceiverTable {
    /// Registration order; drives delivery order across receivers.
    order: Vec<EntityId>,
    subscriptions: HashMap<EntityId, Vec<EventType>>,
    queues: HashMap<EntityId, VecDeque<EventId>>,
}

impl ReceiverTable {
    fn is_subscribed(&self, entity: EntityId, ty: EventType) -> bool {
        self.subscriptions
            .get(&entity)
            .is_some_and(|types| types.contains(&ty))
    }
}

struct Inner {
    schema: Arc<EventSchema>,
    next_id: AtomicU64,
    events: Mutex<HashMap<EventId, StoredEvent>>,
    outbox: Sender<(EntityId, EventId)>,
    inbox: Receiver<(EntityId, EventId)>,
    receivers: Mutex<ReceiverTable>,
    /// Events handed out by the previous `update()`.
    delivered: Mutex<Vec<EventId>>,
    updates: AtomicU64,
}

/// The event bus. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    /// Creates a bus over a frozen schema.
    #[must_use]
    pub fn new(schema: Arc<EventSchema>) -> Self {
        Self::with_capacity(schema, 0)
    }

    /// Creates a bus with room for `events` live events before growing.
    #[must_use]
    pub fn with_capacity(schema: Arc<EventSchema>, events: usize) -> Self {
        let (outbox, inbox) = unbounded();
        Self {
            inner: Arc::new(Inner {
                schema,
                next_id: AtomicU64::new(1),
                events: Mutex::new(HashMap::with_capacity(events)),
                outbox,
                inbox,
                receivers: Mutex::new(ReceiverTable::default()),
                delivered: Mutex::new(Vec::new()),
                updates: AtomicU64::new(0),
            }),
        }
    }

    /// The schema this bus validates against.
    #[must_use]
    pub fn schema(&self) -> &Arc<EventSchema> {
        &self.inner.schema
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Opens a write buffer for an event of type `event_type`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the event type is not in the schema.
    pub fn begin_event_writing(&self, event_type: EventType) -> SimResult<EventWriter<'_>> {
        self.inner.schema.check_event_type(event_type)?;
        Ok(EventWriter {
            bus: self,
            event_type,
            entries: Vec::new(),
        })
    }

    fn seal(&self, event_type: EventType, entries: Vec<(PropertyId, Value)>) -> EventId {
        let id = EventId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let sealed_at = self.inner.updates.load(Ordering::Relaxed);
        self.inner.events.lock().insert(
            id,
            StoredEvent {
                event_type,
                entries,
                state: EventState::Sealed,
                sealed_at,
            },
        );
        id
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Opens the single read pass of an event.
    ///
    /// The event leaves the bus here; a second call with the same id fails.
    ///
    /// # Errors
    ///
    /// `NotFound` if the event was already read, is still queued, or never
    /// existed.
    pub fn begin_event_reading(&self, event: EventId) -> SimResult<EventReader> {
        let mut events = self.inner.events.lock();
        match events.get(&event) {
            Some(stored) if stored.state != EventState::Queued => {}
            _ => return Err(SimError::NotFound(Missing::Event(event))),
        }
        let stored = events
            .remove(&event)
            .ok_or(SimError::NotFound(Missing::Event(event)))?;
        Ok(EventReader {
            id: event,
            event_type: stored.event_type,
            entries: stored.entries.into(),
        })
    }

    /// Returns true if `event` is sealed or delivered and not yet read.
    #[must_use]
    pub fn is_readable(&self, event: EventId) -> bool {
        self.inner
            .events
            .lock()
            .get(&event)
            .is_some_and(|e| e.state != EventState::Queued)
    }

    // =========================================================================
    // Delivery
    // =========================================================================

    /// Subscribes `entity` to events of `event_type`. Subscribing twice is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// `NotFound` if the event type is not in the schema.
    pub fn register_event_receiver(&self, entity: EntityId, event_type: EventType) -> SimResult<()> {
        self.inner.schema.check_event_type(event_type)?;
        let mut table = self.inner.receivers.lock();
        let table = &mut *table;
        let types = table.subscriptions.entry(entity).or_insert_with(|| {
            table.order.push(entity);
            Vec::new()
        });
        if !types.contains(&event_type) {
            types.push(event_type);
        }
        Ok(())
    }

    /// Drops one subscription.
    ///
    /// # Errors
    ///
    /// `NotFound` if `entity` is not subscribed to `event_type`.
    pub fn unregister_event_receiver(&self, entity: EntityId, event_type: EventType) -> SimResult<()> {
        let mut table = self.inner.receivers.lock();
        let types = table
            .subscriptions
            .get_mut(&entity)
            .filter(|types| types.contains(&event_type))
            .ok_or(SimError::NotFound(Missing::Receiver(entity)))?;
        types.retain(|&t| t != event_type);
        if types.is_empty() {
            drop(table);
            self.unregister_all(entity);
        }
        Ok(())
    }

    /// Drops every subscription of `entity` and discards its queued events.
    ///
    /// Called when the entity is destroyed.
    pub fn unregister_all(&self, entity: EntityId) {
        let queued = {
            let mut table = self.inner.receivers.lock();
            table.subscriptions.remove(&entity);
            table.order.retain(|&e| e != entity);
            table.queues.remove(&entity)
        };
        if let Some(queued) = queued {
            let mut events = self.inner.events.lock();
            for id in queued {
                events.remove(&id);
            }
        }
    }

    /// Returns true if `entity` receives events of `event_type`.
    #[must_use]
    pub fn is_subscribed(&self, entity: EntityId, event_type: EventType) -> bool {
        self.inner.receivers.lock().is_subscribed(entity, event_type)
    }

    /// Enqueues a sealed event for `to`.
    ///
    /// Each event can be sent once; safe to call from several threads.
    ///
    /// # Errors
    ///
    /// - `NotFound(Event)` if the event is unknown, already sent, or read
    /// - `NotFound(Receiver)` if `to` is not subscribed to the event's type
    pub fn send_event(&self, to: EntityId, event: EventId) -> SimResult<()> {
        let mut events = self.inner.events.lock();
        let stored = events
            .get_mut(&event)
            .filter(|e| e.state == EventState::Sealed)
            .ok_or(SimError::NotFound(Missing::Event(event)))?;

        if !self.inner.receivers.lock().is_subscribed(to, stored.event_type) {
            return Err(SimError::NotFound(Missing::Receiver(to)));
        }

        stored.state = EventState::Queued;
        // The bus owns the receiving end, so the channel cannot be disconnected.
        let _ = self.inner.outbox.send((to, event));
        Ok(())
    }

    /// Delivers everything sent since the previous call.
    ///
    /// Events delivered by the previous call and never read are discarded
    /// first, as are events sealed before the previous call and never sent.
    /// Then every receiver's queue is drained once, FIFO, receivers visited
    /// in registration order.
    pub fn update(&self) -> Vec<Delivery> {
        let previous = self.inner.updates.fetch_add(1, Ordering::Relaxed);
        let stale = std::mem::take(&mut *self.inner.delivered.lock());
        let mut events = self.inner.events.lock();
        if !stale.is_empty() {
            let discarded = stale.iter().filter(|&id| events.remove(id).is_some()).count();
            if discarded > 0 {
                tracing::debug!(discarded, "discarded unread events");
            }
        }
        let before = events.len();
        events.retain(|_, e| e.state != EventState::Sealed || e.sealed_at >= previous);
        let abandoned = before - events.len();
        if abandoned > 0 {
            tracing::debug!(abandoned, "dropped sealed events that were never sent");
        }

        let mut table = self.inner.receivers.lock();

        for (to, id) in self.inner.inbox.try_iter() {
            if table.subscriptions.contains_key(&to) {
                table.queues.entry(to).or_default().push_back(id);
            } else {
                events.remove(&id);
                tracing::debug!(receiver = %to, event = %id, "receiver gone before delivery");
            }
        }

        let mut deliveries = Vec::new();
        let ReceiverTable { order, queues, .. } = &mut *table;
        for &receiver in order.iter() {
            let Some(queue) = queues.get_mut(&receiver) else {
                continue;
            };
            while let Some(id) = queue.pop_front() {
                if let Some(stored) = events.get_mut(&id) {
                    stored.state = EventState::Delivered;
                    deliveries.push(Delivery {
                        receiver,
                        event_type: stored.event_type,
                        event: id,
                    });
                }
            }
        }
        drop(table);
        drop(events);

        self.inner
            .delivered
            .lock()
            .extend(deliveries.iter().map(|d| d.event));
        deliveries
    }

    /// Number of events stored (sealed, queued or delivered) and not yet read.
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.inner.events.lock().len()
    }
}

/// Write buffer for one event.
pub struct EventWriter<'a> {
    bus: &'a EventBus,
    event_type: EventType,
    entries: Vec<(PropertyId, Value)>,
}

impl EventWriter<'_> {
    /// Appends a typed entry.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the property is not in the schema
    /// - `TypeMismatch` if the value's type is not the property's type;
    ///   nothing is appended
    pub fn write(&mut self, property: PropertyId, value: impl Into<Value>) -> SimResult<()> {
        let value = value.into();
        let info = self.bus.inner.schema.property(property)?;
        if info.value_type != value.value_type() {
            return Err(SimError::TypeMismatch {
                expected: info.value_type.name(),
                found: value.value_type().name(),
            });
        }
        self.entries.push((property, value));
        Ok(())
    }

    /// Appends a float entry.
    ///
    /// # Errors
    ///
    /// As for [`EventWriter::write`].
    pub fn write_float(&mut self, property: PropertyId, value: f32) -> SimResult<()> {
        self.write(property, value)
    }

    /// Appends an int entry.
    ///
    /// # Errors
    ///
    /// As for [`EventWriter::write`].
    pub fn write_int(&mut self, property: PropertyId, value: i64) -> SimResult<()> {
        self.write(property, value)
    }

    /// Appends an entity-id entry.
    ///
    /// # Errors
    ///
    /// As for [`EventWriter::write`].
    pub fn write_entity_id(&mut self, property: PropertyId, value: EntityId) -> SimResult<()> {
        self.write(property, value)
    }

    /// Number of entries written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Seals the buffer into an immutable event.
    #[must_use]
    pub fn end_event_writing(self) -> EventId {
        self.bus.seal(self.event_type, self.entries)
    }
}

/// Read cursor over one event's entries.
#[derive(Debug)]
pub struct EventReader {
    id: EventId,
    event_type: EventType,
    entries: VecDeque<(PropertyId, Value)>,
}

impl EventReader {
    /// The event being read.
    #[must_use]
    pub const fn id(&self) -> EventId {
        self.id
    }

    /// Category of the event.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Property of the next entry, if any.
    #[must_use]
    pub fn peek_property(&self) -> Option<PropertyId> {
        self.entries.front().map(|(p, _)| *p)
    }

    /// Entries left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.entries.len()
    }

    /// Consumes the next entry of any type.
    ///
    /// # Errors
    ///
    /// `OutOfRange` if no entries remain.
    pub fn read(&mut self) -> SimResult<(PropertyId, Value)> {
        self.entries
            .pop_front()
            .ok_or(SimError::OutOfRange(Bound::EventEnd(self.id)))
    }

    fn read_as(&mut self, wanted: ValueType) -> SimResult<Value> {
        let (_, value) = self
            .entries
            .front()
            .ok_or(SimError::OutOfRange(Bound::EventEnd(self.id)))?;
        if value.value_type() != wanted {
            return Err(SimError::TypeMismatch {
                expected: wanted.name(),
                found: value.value_type().name(),
            });
        }
        self.read().map(|(_, value)| value)
    }

    /// Consumes the next entry as a float.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` if the entry is not a float (it stays unread),
    /// `OutOfRange` if no entries remain.
    pub fn read_float(&mut self) -> SimResult<f32> {
        match self.read_as(ValueType::Float)? {
            Value::Float(v) => Ok(v),
            other => Err(mismatch(ValueType::Float, &other)),
        }
    }

    /// Consumes the next entry as an int.
    ///
    /// # Errors
    ///
    /// As for [`EventReader::read_float`].
    pub fn read_int(&mut self) -> SimResult<i64> {
        match self.read_as(ValueType::Int)? {
            Value::Int(v) => Ok(v),
            other => Err(mismatch(ValueType::Int, &other)),
        }
    }

    /// Consumes the next entry as an entity id.
    ///
    /// # Errors
    ///
    /// As for [`EventReader::read_float`].
    pub fn read_entity_id(&mut self) -> SimResult<EntityId> {
        match self.read_as(ValueType::EntityId)? {
            Value::EntityId(v) => Ok(v),
            other => Err(mismatch(ValueType::EntityId, &other)),
        }
    }

    /// Closes the read pass. The event no longer exists afterwards.
    pub fn end_event_reading(self) {}
}

fn mismatch(wanted: ValueType, found: &Value) -> SimError {
    SimError::TypeMismatch {
        expected: wanted.name(),
        found: found.value_type().name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SchemaBuilder;

    struct Fixture {
        bus: EventBus,
        damage: PropertyId,
        source: PropertyId,
        hit: EventType,
        heal: EventType,
    }

    fn fixture() -> Fixture {
        let mut schema = SchemaBuilder::new();
        let damage = schema.register_float_property("damage").unwrap();
        let source = schema.register_entity_id_property("source").unwrap();
        let hit = schema.register_event_type("hit").unwrap();
        let heal = schema.register_event_type("heal").unwrap();
        Fixture {
            bus: EventBus::new(schema.build()),
            damage,
            source,
            hit,
            heal,
        }
    }

    fn write_hit(f: &Fixture, amount: f32) -> EventId {
        let mut writer = f.bus.begin_event_writing(f.hit).unwrap();
        writer.write_float(f.damage, amount).unwrap();
        writer.end_event_writing()
    }

    #[test]
    fn test_round_trip_then_out_of_range() {
        let f = fixture();
        assert_eq!(f.damage.raw(), 1);
        let ev = write_hit(&f, 42.5);

        let mut reader = f.bus.begin_event_reading(ev).unwrap();
        assert_eq!(reader.read_float().unwrap(), 42.5);
        assert_eq!(
            reader.read_float(),
            Err(SimError::OutOfRange(Bound::EventEnd(ev)))
        );
        reader.end_event_reading();

        assert!(matches!(
            f.bus.begin_event_reading(ev),
            Err(SimError::NotFound(Missing::Event(_)))
        ));
    }

    #[test]
    fn test_write_type_mismatch_appends_nothing() {
        let f = fixture();
        let mut writer = f.bus.begin_event_writing(f.hit).unwrap();
        assert!(matches!(
            writer.write_int(f.damage, 3),
            Err(SimError::TypeMismatch { .. })
        ));
        assert!(writer.is_empty());
    }

    #[test]
    fn test_read_type_mismatch_keeps_entry() {
        let f = fixture();
        let target = EntityId::new(4, 0);
        let mut writer = f.bus.begin_event_writing(f.hit).unwrap();
        writer.write_entity_id(f.source, target).unwrap();
        let ev = writer.end_event_writing();

        let mut reader = f.bus.begin_event_reading(ev).unwrap();
        assert_eq!(
            reader.read_float(),
            Err(SimError::TypeMismatch {
                expected: "float",
                found: "entity id"
            })
        );
        assert_eq!(reader.read_entity_id().unwrap(), target);
    }

    #[test]
    fn test_delivery_fifo_per_receiver() {
        let f = fixture();
        let a = EntityId::new(1, 0);
        let b = EntityId::new(2, 0);
        f.bus.register_event_receiver(b, f.hit).unwrap();
        f.bus.register_event_receiver(a, f.hit).unwrap();

        let e1 = write_hit(&f, 1.0);
        let e2 = write_hit(&f, 2.0);
        let e3 = write_hit(&f, 3.0);
        f.bus.send_event(a, e1).unwrap();
        f.bus.send_event(b, e2).unwrap();
        f.bus.send_event(a, e3).unwrap();

        let order: Vec<_> = f.bus.update().iter().map(|d| (d.receiver, d.event)).collect();
        // Receivers in registration order, events in send order.
        assert_eq!(order, vec![(b, e2), (a, e1), (a, e3)]);
        assert!(f.bus.update().is_empty());
    }

    #[test]
    fn test_send_requires_subscription_and_is_once() {
        let f = fixture();
        let a = EntityId::new(1, 0);
        f.bus.register_event_receiver(a, f.heal).unwrap();

        let ev = write_hit(&f, 5.0);
        assert_eq!(
            f.bus.send_event(a, ev),
            Err(SimError::NotFound(Missing::Receiver(a)))
        );

        f.bus.register_event_receiver(a, f.hit).unwrap();
        f.bus.send_event(a, ev).unwrap();
        assert_eq!(
            f.bus.send_event(a, ev),
            Err(SimError::NotFound(Missing::Event(ev)))
        );
        assert_eq!(f.bus.update().len(), 1);
    }

    #[test]
    fn test_unread_deliveries_are_discarded_next_update() {
        let f = fixture();
        let a = EntityId::new(1, 0);
        f.bus.register_event_receiver(a, f.hit).unwrap();
        let ev = write_hit(&f, 5.0);
        f.bus.send_event(a, ev).unwrap();

        assert_eq!(f.bus.update().len(), 1);
        assert!(f.bus.is_readable(ev));
        f.bus.update();
        assert!(!f.bus.is_readable(ev));
        assert_eq!(f.bus.pending_events(), 0);
    }

    #[test]
    fn test_unsent_events_are_dropped_after_one_update() {
        let f = fixture();
        let a = EntityId::new(1, 0);
        f.bus.register_event_receiver(a, f.hit).unwrap();
        let forgotten = write_hit(&f, 1.0);

        f.bus.update();
        // Still sendable within the frame after it was written.
        assert!(f.bus.is_readable(forgotten));
        let late = write_hit(&f, 2.0);
        f.bus.send_event(a, late).unwrap();

        assert_eq!(f.bus.update().len(), 1);
        assert!(!f.bus.is_readable(forgotten));
        assert_eq!(
            f.bus.send_event(a, forgotten),
            Err(SimError::NotFound(Missing::Event(forgotten)))
        );
        assert!(f.bus.is_readable(late));
        assert_eq!(f.bus.pending_events(), 1);

        for _ in 0..100 {
            write_hit(&f, 0.0);
            f.bus.update();
        }
        assert_eq!(f.bus.pending_events(), 1);
    }

    #[test]
    fn test_unregister_drops_queued_events() {
        let f = fixture();
        let a = EntityId::new(1, 0);
        f.bus.register_event_receiver(a, f.hit).unwrap();
        let ev = write_hit(&f, 5.0);
        f.bus.send_event(a, ev).unwrap();

        f.bus.unregister_event_receiver(a, f.hit).unwrap();
        assert!(f.bus.update().is_empty());
        assert_eq!(f.bus.pending_events(), 0);
        assert!(f.bus.unregister_event_receiver(a, f.hit).is_err());
    }

    #[test]
    fn test_concurrent_senders() {
        let f = fixture();
        let a = EntityId::new(1, 0);
        f.bus.register_event_receiver(a, f.hit).unwrap();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for i in 0..25 {
                        let ev = write_hit(&f, i as f32);
                        f.bus.send_event(a, ev).unwrap();
                    }
                });
            }
        });

        assert_eq!(f.bus.update().len(), 100);
    }
}
