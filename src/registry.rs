//! The `PropertyRegistry` state machine: the owner of every property, its
//! status, the outgoing-update queue, and the expiry queue.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::rc::Rc;

use crate::clock::{Clock, Instant};
use crate::error::{ConfigError, PropertyError};
use crate::field::FieldInput;
use crate::frame::CanFrame;
use crate::property::{Property, PropertyImpl, PropertyInput, PropertyValue};
use crate::status::PropertyStatus;
use crate::transport::{Receiver, Transmitter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Key {
    Id(u16),
    Name(&'static str),
}

struct EntryInner {
    can_id: u16,
    name: &'static str,
    property: PropertyImpl,
    status: PropertyStatus,
}

type EntryHandle = Rc<RefCell<EntryInner>>;

/// Counters and the last duplicate-writer sighting, read-and-reset via
/// [`PropertyRegistry::flush_warnings`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Warnings {
    pub count_unknown_id: u32,
    pub count_corrupt: u32,
    pub id_local_transition: Option<(u16, &'static str)>,
}

/// Chained setup for a [`PropertyRegistry`], in the same builder shape the
/// crate's teacher uses for its own `Config`.
pub struct RegistryBuilder {
    data_timeout_ms: u32,
    transmitter: Option<Box<dyn Transmitter>>,
    receiver: Option<Box<dyn Receiver>>,
    clock: Box<dyn Clock>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        RegistryBuilder {
            data_timeout_ms: 10_000,
            transmitter: None,
            receiver: None,
            clock: Box::new(crate::clock::SystemClock::new()),
        }
    }

    /// Milliseconds a `Remote` value remains valid before it lapses to
    /// `Expired` (default: 10,000).
    pub fn data_timeout_ms(&mut self, ms: u32) -> &mut Self {
        self.data_timeout_ms = ms;
        self
    }

    pub fn transmitter(&mut self, t: impl Transmitter + 'static) -> &mut Self {
        self.transmitter = Some(Box::new(t));
        self
    }

    pub fn receiver(&mut self, r: impl Receiver + 'static) -> &mut Self {
        self.receiver = Some(Box::new(r));
        self
    }

    pub fn clock(&mut self, c: impl Clock + 'static) -> &mut Self {
        self.clock = Box::new(c);
        self
    }

    pub fn build(self) -> PropertyRegistry {
        PropertyRegistry {
            entries: HashMap::new(),
            order: Vec::new(),
            outgoing: Rc::new(RefCell::new(BTreeSet::new())),
            expiry_queue: VecDeque::new(),
            data_timeout_ms: self.data_timeout_ms,
            transmitter: self.transmitter,
            receiver: self.receiver,
            clock: self.clock,
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the set of properties, the status machine, the outgoing update
/// queue, and the expiry queue; `event_loop` drives one tick.
pub struct PropertyRegistry {
    entries: HashMap<Key, EntryHandle>,
    order: Vec<&'static str>,
    outgoing: Rc<RefCell<BTreeSet<u16>>>,
    /// `(can_id, deadline captured at receive time)`, appended in receive
    /// order. The deadline recorded here — not the entry's live status —
    /// drives the drain loop's front-of-queue check, so a stale duplicate
    /// left behind by an earlier reassignment can never make the loop stop
    /// early; the live entry is only consulted for the actual expire
    /// decision, rather than the value recorded here.
    expiry_queue: VecDeque<(u16, Instant)>,
    data_timeout_ms: u32,
    transmitter: Option<Box<dyn Transmitter>>,
    receiver: Option<Box<dyn Receiver>>,
    clock: Box<dyn Clock>,
    warn_count_unknown_id: u32,
    warn_count_corrupt: u32,
    warn_id_local_transition: Option<(u16, &'static str)>,
}

impl PropertyRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    fn now(&self) -> Instant {
        Instant::now(self.clock.as_ref())
    }

    /// Registers a fresh property with status `NoData` under both its CAN
    /// ID and name.
    pub fn add_property(&mut self, can_id: u16, name: &'static str, property: PropertyImpl) -> Result<(), ConfigError> {
        if can_id & !0x07FF != 0 {
            return Err(ConfigError::InvalidId);
        }
        if name.is_empty() {
            return Err(ConfigError::InvalidName);
        }
        if self.entries.contains_key(&Key::Id(can_id)) || self.entries.contains_key(&Key::Name(name)) {
            return Err(ConfigError::DuplicateKey);
        }

        let entry = Rc::new(RefCell::new(EntryInner {
            can_id,
            name,
            property,
            status: PropertyStatus::NoData,
        }));
        self.entries.insert(Key::Id(can_id), entry.clone());
        self.entries.insert(Key::Name(name), entry);
        self.order.push(name);
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<&EntryHandle> {
        self.entries.get(&Key::Name(name))
    }

    pub fn status(&self, name: &str) -> Option<PropertyStatus> {
        Some(self.lookup(name)?.borrow().status)
    }

    /// Reads the current value if the entry is valid (`Local` or
    /// unexpired `Remote`); otherwise `None`, treating
    /// `NoData`/`Expired`/`Error` as equally absent to a reader.
    pub fn get(&self, name: &str) -> Option<PropertyValue> {
        let entry = self.lookup(name)?.borrow();
        if !entry.status.is_valid() {
            return None;
        }
        entry.property.value()
    }

    /// Assigns a whole-value replacement (`Tuple` for `StructProperty`,
    /// `Fields` for `ExtendedStructProperty`). On success the entry is
    /// enqueued for send and marked `Local`.
    pub fn set(&mut self, name: &str, input: PropertyInput<'_>) -> Result<(), PropertyError> {
        let entry_handle = self.lookup(name).ok_or(PropertyError::UnknownProperty)?.clone();
        entry_handle.borrow_mut().property.set_value(input)?;
        self.flag_local_update(&entry_handle);
        Ok(())
    }

    fn flag_local_update(&mut self, entry: &EntryHandle) {
        let mut entry_mut = entry.borrow_mut();
        entry_mut.status = PropertyStatus::Local;
        self.expiry_queue.retain(|(id, _)| *id != entry_mut.can_id);
        self.outgoing.borrow_mut().insert(entry_mut.can_id);
        drop(entry_mut);
    }

    /// Borrows an `ExtendedStructProperty` for in-place field mutation.
    /// Any write made through the handle marks the entry `Local` and
    /// enqueues it for send once the handle drops. Mutation goes through
    /// a shared dirty flag and outgoing queue rather than a callback
    /// captured at borrow time, since the latter would conflict with the
    /// registry's own borrow while the handle is alive.
    pub fn handle_mut(&mut self, name: &str) -> Result<FieldHandle, PropertyError> {
        let entry = self.lookup(name).ok_or(PropertyError::UnknownProperty)?.clone();
        {
            let entry_ref = entry.borrow();
            if !matches!(entry_ref.property, PropertyImpl::ExtendedStruct(_)) {
                return Err(PropertyError::NotAMapping);
            }
        }
        Ok(FieldHandle {
            entry,
            outgoing: self.outgoing.clone(),
            dirty: false,
        })
    }

    /// Properties currently registered, in the order they were added.
    pub fn iter_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.order.iter().copied()
    }

    pub fn flush_warnings(&mut self) -> Warnings {
        let warnings = Warnings {
            count_unknown_id: self.warn_count_unknown_id,
            count_corrupt: self.warn_count_corrupt,
            id_local_transition: self.warn_id_local_transition,
        };
        self.warn_count_unknown_id = 0;
        self.warn_count_corrupt = 0;
        self.warn_id_local_transition = None;
        warnings
    }

    /// Ingests one inbound frame: looks up the property by CAN ID,
    /// decodes the payload into it, and starts (or restarts) its expiry
    /// timer. Unknown IDs and undecodable payloads are counted as
    /// warnings rather than returned as errors, since there is no caller
    /// on the other end of a bus receive to hand an error back to.
    pub fn receive(&mut self, can_id: u16, bytes: &[u8]) {
        let Some(entry) = self.entries.get(&Key::Id(can_id)).cloned() else {
            self.warn_count_unknown_id += 1;
            log::warn!("received packet with unknown ID {:#05x}", can_id);
            return;
        };

        let decode_result = entry.borrow_mut().property.deserialize(bytes);
        if let Err(e) = decode_result {
            self.warn_count_corrupt += 1;
            log::warn!("failed to decode packet with ID {:#05x}: {}", can_id, e);
            entry.borrow_mut().status = PropertyStatus::Error;
            return;
        }

        let was_local = matches!(entry.borrow().status, PropertyStatus::Local);
        if was_local {
            let entry_ref = entry.borrow();
            self.warn_id_local_transition = Some((entry_ref.can_id, entry_ref.name));
            log::warn!(
                "transitioning \"{}\" from local to remote data; a duplicate writer is on the bus",
                entry_ref.name
            );
        }

        let deadline = self.now().plus_millis(self.data_timeout_ms);
        entry.borrow_mut().status = PropertyStatus::Remote(deadline);
        self.expiry_queue.push_back((can_id, deadline));
    }

    /// One tick: drain outgoing updates, expire stale remotes, then ingest
    /// inbound frames — strictly in that order, so a value this tick
    /// writes locally is never immediately overwritten by a remote frame
    /// that arrived before the send went out, and nothing expires based on
    /// a deadline that a fresher receive earlier in the same tick would
    /// have pushed back.
    pub fn event_loop(&mut self) {
        self.drain_outgoing();
        self.expire_stale();
        self.drain_inbound();
    }

    fn drain_outgoing(&mut self) {
        let Some(transmitter) = self.transmitter.as_ref() else {
            return;
        };
        let pending: Vec<u16> = std::mem::take(&mut *self.outgoing.borrow_mut()).into_iter().collect();
        for can_id in pending {
            let Some(entry) = self.entries.get(&Key::Id(can_id)) else { continue };
            let (name, payload) = {
                let entry_ref = entry.borrow();
                (entry_ref.name, entry_ref.property.serialize())
            };
            let frame = match CanFrame::new(can_id, payload) {
                Ok(frame) => frame,
                Err(e) => {
                    log::warn!("refusing to send malformed frame for \"{name}\": {e}");
                    continue;
                }
            };
            if !transmitter.send(frame.can_id(), frame.payload()) {
                log::warn!("failed to send update for \"{name}\"");
            }
        }
    }

    fn expire_stale(&mut self) {
        let now = self.now();
        while let Some(&(_, deadline)) = self.expiry_queue.front() {
            if !deadline.is_past(now) {
                break;
            }
            let (can_id, _) = self.expiry_queue.pop_front().unwrap();
            // Double-check against the live entry: another code path may
            // have reassigned this id between enqueue and this drain.
            if let Some(entry) = self.entries.get(&Key::Id(can_id)) {
                let mut entry_mut = entry.borrow_mut();
                if matches!(entry_mut.status, PropertyStatus::Remote(live_deadline) if live_deadline.is_past(now)) {
                    entry_mut.status = PropertyStatus::Expired;
                }
            }
        }
    }

    fn drain_inbound(&mut self) {
        // Taken out of `self` for the duration of the loop: `receive` below
        // needs `&mut self`, which would conflict with holding a borrow of
        // `self.receiver` across the same loop.
        let Some(receiver) = self.receiver.take() else {
            return;
        };
        while let Some((can_id, payload)) = receiver.receive() {
            match CanFrame::new(can_id, payload) {
                Ok(frame) => self.receive(frame.can_id(), frame.payload()),
                Err(e) => {
                    self.warn_count_corrupt += 1;
                    log::warn!("dropped malformed frame {:#05x}: {}", can_id, e);
                }
            }
        }
        self.receiver = Some(receiver);
    }
}

/// A borrowed, mutable view into an `ExtendedStructProperty`'s fields.
/// Mutating through it marks the owning entry `Local` and enqueues it for
/// send once the handle is dropped, via a shared dirty flag and outgoing
/// queue rather than a callback captured at borrow time — a captured
/// callback closing over the registry would conflict with the registry's
/// own borrow while the handle is alive.
pub struct FieldHandle {
    entry: EntryHandle,
    outgoing: Rc<RefCell<BTreeSet<u16>>>,
    dirty: bool,
}

impl FieldHandle {
    pub fn get(&self, name: &str) -> Result<crate::field::FieldValue, PropertyError> {
        match &self.entry.borrow().property {
            PropertyImpl::ExtendedStruct(p) => Ok(p.inner().get_field(name)?),
            _ => Err(PropertyError::NotAMapping),
        }
    }

    pub fn set(&mut self, name: &str, value: FieldInput<'_>) -> Result<(), PropertyError> {
        match &mut self.entry.borrow_mut().property {
            PropertyImpl::ExtendedStruct(p) => p.inner_mut().set_field(name, value)?,
            _ => return Err(PropertyError::NotAMapping),
        };
        self.dirty = true;
        Ok(())
    }
}

impl Drop for FieldHandle {
    fn drop(&mut self) {
        if !self.dirty {
            return;
        }
        let can_id = self.entry.borrow().can_id;
        self.entry.borrow_mut().status = PropertyStatus::Local;
        self.outgoing.borrow_mut().insert(can_id);
    }
}
