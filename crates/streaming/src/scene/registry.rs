//! Generic scene object registry
//!
//! Objects live in an arena of generation-tagged slots. A handle records
//! `{index, generation}`, so once an object is closed every outstanding
//! handle to it reads `NotFound` even after the slot is reused.
//!
//! Ids are random and never reused, which keeps them unique for the
//! lifetime of the session.

use super::{Pose, SceneEvent, SceneObjectRef};
use crate::config::validate_display_name;
use crate::ids::SessionId;
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::debug;

/// One kind of shared scene object
pub trait SceneObjectKind: Send + Sync + Sized + 'static {
    /// Object id type
    type Id: Copy + Eq + Hash + fmt::Display + fmt::Debug + Send + Sync + 'static;
    /// Kind-specific dimensions
    type Size: Copy + PartialEq + fmt::Debug + Send + Sync + 'static;
    /// Kind-specific mutable state
    type State: Clone + fmt::Debug + Send + Sync + 'static;

    /// Human-readable kind name used in errors and logs
    const NAME: &'static str;

    /// Allocate a fresh id
    fn generate_id() -> Self::Id;

    /// Reject invalid dimensions
    fn validate_size(size: &Self::Size) -> Result<()>;

    /// Reference carried by scene events
    fn object_ref(id: Self::Id) -> SceneObjectRef;
}

/// Point-in-time copy of a scene object
pub struct SceneObject<K: SceneObjectKind> {
    pub id: K::Id,
    pub display_name: String,
    pub pose: Pose,
    pub size: K::Size,
    pub state: K::State,
}

impl<K: SceneObjectKind> Clone for SceneObject<K> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            display_name: self.display_name.clone(),
            pose: self.pose,
            size: self.size,
            state: self.state.clone(),
        }
    }
}

impl<K: SceneObjectKind> fmt::Debug for SceneObject<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(K::NAME)
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("pose", &self.pose)
            .field("size", &self.size)
            .field("state", &self.state)
            .finish()
    }
}

struct Entry<K: SceneObjectKind> {
    /// Creation order, used to keep query output stable
    seq: u64,
    object: SceneObject<K>,
}

struct Slot<K: SceneObjectKind> {
    generation: u32,
    entry: Option<Entry<K>>,
}

struct RegistryInner<K: SceneObjectKind> {
    slots: Vec<Slot<K>>,
    free: Vec<u32>,
    by_id: HashMap<K::Id, u32>,
    next_seq: u64,
    closed: bool,
}

impl<K: SceneObjectKind> RegistryInner<K> {
    fn live(&self, id: K::Id) -> Option<(u32, &Entry<K>)> {
        let index = *self.by_id.get(&id)?;
        let entry = self.slots.get(index as usize)?.entry.as_ref()?;
        Some((index, entry))
    }
}

/// Registry of one scene object kind, shared by every peer of a session
pub struct ObjectRegistry<K: SceneObjectKind> {
    session_id: SessionId,
    capacity: usize,
    inner: RwLock<RegistryInner<K>>,
    events: broadcast::Sender<SceneEvent>,
}

impl<K: SceneObjectKind> ObjectRegistry<K> {
    /// Create an empty registry
    pub(crate) fn new(
        session_id: SessionId,
        capacity: usize,
        events: broadcast::Sender<SceneEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            session_id,
            capacity,
            inner: RwLock::new(RegistryInner {
                slots: Vec::new(),
                free: Vec::new(),
                by_id: HashMap::new(),
                next_seq: 0,
                closed: false,
            }),
            events,
        })
    }

    fn emit(&self, event: SceneEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    fn not_found(&self, id: K::Id) -> Error {
        Error::not_found(K::NAME, id)
    }

    fn session_closed(&self) -> Error {
        Error::NotFound(format!("session {} is closed", self.session_id))
    }

    /// Maximum number of live objects
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert a new object visible to every peer
    pub fn add(
        &self,
        display_name: &str,
        pose: Pose,
        size: K::Size,
        state: K::State,
    ) -> Result<K::Id> {
        validate_display_name("display_name", display_name)?;
        pose.validate()?;
        K::validate_size(&size)?;

        let id = {
            let mut inner = self.inner.write();
            if inner.closed {
                return Err(self.session_closed());
            }

            if inner.by_id.len() >= self.capacity {
                return Err(Error::CapacityExceeded(format!(
                    "{} limit of {} reached in session {}",
                    K::NAME,
                    self.capacity,
                    self.session_id
                )));
            }

            let mut id = K::generate_id();
            while inner.by_id.contains_key(&id) {
                id = K::generate_id();
            }

            let seq = inner.next_seq;
            inner.next_seq += 1;

            let entry = Entry {
                seq,
                object: SceneObject {
                    id,
                    display_name: display_name.to_string(),
                    pose,
                    size,
                    state,
                },
            };

            let index = match inner.free.pop() {
                Some(index) => {
                    inner.slots[index as usize].entry = Some(entry);
                    index
                }
                None => {
                    inner.slots.push(Slot {
                        generation: 0,
                        entry: Some(entry),
                    });
                    (inner.slots.len() - 1) as u32
                }
            };
            inner.by_id.insert(id, index);
            id
        };

        debug!(
            "Added {} {} ('{}') to session {}",
            K::NAME,
            id,
            display_name,
            self.session_id
        );
        self.emit(SceneEvent::Added(K::object_ref(id)));
        Ok(id)
    }

    /// Number of live objects
    pub fn count(&self) -> usize {
        self.inner.read().by_id.len()
    }

    /// Snapshot up to `capacity` handles, in creation order
    pub fn query(self: &Arc<Self>, capacity: usize) -> Vec<ObjectHandle<K>> {
        let inner = self.inner.read();
        let mut live: Vec<(u64, u32, u32, K::Id)> = inner
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.entry
                    .as_ref()
                    .map(|e| (e.seq, index as u32, slot.generation, e.object.id))
            })
            .collect();
        drop(inner);

        live.sort_unstable_by_key(|(seq, ..)| *seq);
        live.into_iter()
            .take(capacity)
            .map(|(_, index, generation, id)| ObjectHandle {
                registry: Arc::downgrade(self),
                index,
                generation,
                id,
            })
            .collect()
    }

    /// Fill `out` with handles; returns how many slots were written
    ///
    /// Never writes past `out.len()`. Slots past the returned count are
    /// left untouched.
    pub fn query_into(self: &Arc<Self>, out: &mut [Option<ObjectHandle<K>>]) -> usize {
        let handles = self.query(out.len());
        let written = handles.len();
        for (slot, handle) in out.iter_mut().zip(handles) {
            *slot = Some(handle);
        }
        written
    }

    /// Lease a handle to a live object
    pub fn handle(self: &Arc<Self>, id: K::Id) -> Result<ObjectHandle<K>> {
        let inner = self.inner.read();
        let (index, _) = inner.live(id).ok_or_else(|| self.not_found(id))?;
        Ok(ObjectHandle {
            registry: Arc::downgrade(self),
            index,
            generation: inner.slots[index as usize].generation,
            id,
        })
    }

    /// Snapshot of a live object
    pub fn get(&self, id: K::Id) -> Result<SceneObject<K>> {
        let inner = self.inner.read();
        inner
            .live(id)
            .map(|(_, entry)| entry.object.clone())
            .ok_or_else(|| self.not_found(id))
    }

    fn read_slot(&self, index: u32, generation: u32, id: K::Id) -> Result<SceneObject<K>> {
        let inner = self.inner.read();
        match inner.slots.get(index as usize) {
            // The id check covers a generation that wrapped around
            Some(slot) if slot.generation == generation => slot
                .entry
                .as_ref()
                .filter(|e| e.object.id == id)
                .map(|e| e.object.clone())
                .ok_or_else(|| self.not_found(id)),
            _ => Err(self.not_found(id)),
        }
    }

    /// Apply `change` to a copy of the object and commit it if it succeeds
    pub(crate) fn update<F>(&self, id: K::Id, change: F) -> Result<()>
    where
        F: FnOnce(&mut SceneObject<K>) -> Result<()>,
    {
        {
            let mut inner = self.inner.write();
            let index = *inner.by_id.get(&id).ok_or_else(|| self.not_found(id))?;
            let entry = inner.slots[index as usize]
                .entry
                .as_mut()
                .ok_or_else(|| self.not_found(id))?;

            let mut updated = entry.object.clone();
            change(&mut updated)?;
            entry.object = updated;
        }

        self.emit(SceneEvent::Updated(K::object_ref(id)));
        Ok(())
    }

    /// Move an object
    pub fn update_pose(&self, id: K::Id, pose: Pose) -> Result<()> {
        pose.validate()?;
        self.update(id, |object| {
            object.pose = pose;
            Ok(())
        })?;
        debug!("Updated pose of {} {}", K::NAME, id);
        Ok(())
    }

    /// Resize an object
    pub fn change_size(&self, id: K::Id, size: K::Size) -> Result<()> {
        K::validate_size(&size)?;
        self.update(id, |object| {
            object.size = size;
            Ok(())
        })?;
        debug!("Changed size of {} {} to {:?}", K::NAME, id, size);
        Ok(())
    }

    /// Remove an object session-wide, returning its last snapshot
    ///
    /// Closing an id that is already closed returns `NotFound` and leaves
    /// the registry untouched.
    pub fn close(&self, id: K::Id) -> Result<SceneObject<K>> {
        let object = {
            let mut inner = self.inner.write();
            let index = inner.by_id.remove(&id).ok_or_else(|| self.not_found(id))?;
            let slot = &mut inner.slots[index as usize];
            let entry = slot.entry.take().ok_or_else(|| self.not_found(id))?;
            slot.generation = slot.generation.wrapping_add(1);
            inner.free.push(index);
            entry.object
        };

        debug!("Closed {} {} in session {}", K::NAME, id, self.session_id);
        self.emit(SceneEvent::Closed(K::object_ref(id)));
        Ok(object)
    }

    /// Close every object and refuse further additions
    pub(crate) fn close_all(&self) {
        let closed: Vec<K::Id> = {
            let mut inner = self.inner.write();
            inner.closed = true;
            inner.by_id.clear();
            inner.free.clear();
            inner
                .slots
                .iter_mut()
                .filter_map(|slot| {
                    let entry = slot.entry.take()?;
                    slot.generation = slot.generation.wrapping_add(1);
                    Some(entry.object.id)
                })
                .collect()
        };

        for id in closed {
            self.emit(SceneEvent::Closed(K::object_ref(id)));
        }
    }
}

/// Lease on a scene object
///
/// Dropping a handle never affects the object. Reads through a handle whose
/// object was closed fail with `NotFound`.
pub struct ObjectHandle<K: SceneObjectKind> {
    registry: Weak<ObjectRegistry<K>>,
    index: u32,
    generation: u32,
    id: K::Id,
}

impl<K: SceneObjectKind> Clone for ObjectHandle<K> {
    fn clone(&self) -> Self {
        Self {
            registry: Weak::clone(&self.registry),
            index: self.index,
            generation: self.generation,
            id: self.id,
        }
    }
}

impl<K: SceneObjectKind> fmt::Debug for ObjectHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("kind", &K::NAME)
            .field("id", &self.id)
            .field("index", &self.index)
            .field("generation", &self.generation)
            .finish()
    }
}

impl<K: SceneObjectKind> ObjectHandle<K> {
    /// Current snapshot of the object
    pub fn snapshot(&self) -> Result<SceneObject<K>> {
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| Error::not_found(K::NAME, self.id))?;
        registry.read_slot(self.index, self.generation, self.id)
    }

    /// Whether the object behind this handle is gone
    pub fn is_stale(&self) -> bool {
        self.snapshot().is_err()
    }

    pub fn id(&self) -> Result<K::Id> {
        self.snapshot().map(|o| o.id)
    }

    pub fn display_name(&self) -> Result<String> {
        self.snapshot().map(|o| o.display_name)
    }

    pub fn pose(&self) -> Result<Pose> {
        self.snapshot().map(|o| o.pose)
    }

    pub fn size(&self) -> Result<K::Size> {
        self.snapshot().map(|o| o.size)
    }

    /// Kind-specific state
    pub fn state_data(&self) -> Result<K::State> {
        self.snapshot().map(|o| o.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::AppVolumeId;
    use crate::scene::AppVolumeSize;

    #[derive(Debug)]
    struct TestKind;

    impl SceneObjectKind for TestKind {
        type Id = AppVolumeId;
        type Size = AppVolumeSize;
        type State = u32;

        const NAME: &'static str = "test object";

        fn generate_id() -> Self::Id {
            AppVolumeId::generate()
        }

        fn validate_size(size: &Self::Size) -> Result<()> {
            size.validate()
        }

        fn object_ref(id: Self::Id) -> SceneObjectRef {
            SceneObjectRef::AppVolume(id)
        }
    }

    fn registry(capacity: usize) -> Arc<ObjectRegistry<TestKind>> {
        let (events, _) = broadcast::channel(16);
        ObjectRegistry::new(SessionId::generate(), capacity, events)
    }

    fn cube() -> AppVolumeSize {
        AppVolumeSize::new(1.0, 1.0, 1.0)
    }

    #[test]
    fn test_add_and_get() {
        let registry = registry(4);
        let id = registry.add("cube", Pose::default(), cube(), 7).unwrap();

        let object = registry.get(id).unwrap();
        assert_eq!(object.display_name, "cube");
        assert_eq!(object.state, 7);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_add_is_all_or_nothing() {
        let registry = registry(1);
        let bad = AppVolumeSize::new(0.0, 1.0, 1.0);
        assert!(matches!(
            registry.add("bad", Pose::default(), bad, 0),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(registry.count(), 0);

        registry.add("a", Pose::default(), cube(), 0).unwrap();
        assert!(matches!(
            registry.add("b", Pose::default(), cube(), 0),
            Err(Error::CapacityExceeded(_))
        ));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_query_respects_capacity_and_order() {
        let registry = registry(8);
        let ids: Vec<_> = (0..5)
            .map(|i| {
                registry
                    .add(&format!("v{}", i), Pose::default(), cube(), i)
                    .unwrap()
            })
            .collect();

        let handles = registry.query(3);
        assert_eq!(handles.len(), 3);
        for (handle, id) in handles.iter().zip(&ids) {
            assert_eq!(handle.id().unwrap(), *id);
        }

        let mut out: Vec<Option<ObjectHandle<TestKind>>> = vec![None; 3];
        assert_eq!(registry.query_into(&mut out), 3);
        assert!(out.iter().all(Option::is_some));

        let mut wide: Vec<Option<ObjectHandle<TestKind>>> = vec![None; 10];
        assert_eq!(registry.query_into(&mut wide), 5);
        assert!(wide[5..].iter().all(Option::is_none));
    }

    #[test]
    fn test_close_invalidates_handles_after_slot_reuse() {
        let registry = registry(4);
        let first = registry.add("first", Pose::default(), cube(), 0).unwrap();
        let handle = registry.handle(first).unwrap();

        registry.close(first).unwrap();
        assert!(handle.is_stale());
        assert!(matches!(handle.pose(), Err(Error::NotFound(_))));

        // Reuses the freed slot with a new generation
        let second = registry.add("second", Pose::default(), cube(), 0).unwrap();
        assert_ne!(first, second);
        assert!(handle.snapshot().is_err());
        assert_eq!(registry.handle(second).unwrap().display_name().unwrap(), "second");

        assert!(matches!(registry.close(first), Err(Error::NotFound(_))));
        assert!(matches!(
            registry.update_pose(first, Pose::default()),
            Err(Error::NotFound(_))
        ));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_wrapped_generation_never_aliases_another_object() {
        let registry = registry(1);
        let first = registry.add("first", Pose::default(), cube(), 0).unwrap();
        let handle = registry.handle(first).unwrap();

        // Bring the slot back to the handle's generation after a full wrap
        registry.close(first).unwrap();
        registry.inner.write().slots[0].generation = handle.generation;

        let second = registry.add("second", Pose::default(), cube(), 0).unwrap();
        assert_eq!(registry.handle(second).unwrap().index, handle.index);
        assert!(handle.is_stale());
        assert!(matches!(handle.display_name(), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_failed_update_leaves_object_unchanged() {
        let registry = registry(2);
        let id = registry.add("v", Pose::default(), cube(), 1).unwrap();

        let result = registry.update(id, |object| {
            object.state = 99;
            Err(Error::InvalidArgument("rejected".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(registry.get(id).unwrap().state, 1);
    }

    #[test]
    fn test_events_are_broadcast() {
        let (events, mut rx) = broadcast::channel(16);
        let registry: Arc<ObjectRegistry<TestKind>> =
            ObjectRegistry::new(SessionId::generate(), 4, events);

        let id = registry.add("v", Pose::default(), cube(), 0).unwrap();
        registry.update_pose(id, Pose::at(1.0, 0.0, 0.0)).unwrap();
        registry.close(id).unwrap();

        let expected = SceneObjectRef::AppVolume(id);
        assert_eq!(rx.try_recv().unwrap(), SceneEvent::Added(expected));
        assert_eq!(rx.try_recv().unwrap(), SceneEvent::Updated(expected));
        assert_eq!(rx.try_recv().unwrap(), SceneEvent::Closed(expected));
    }

    #[test]
    fn test_close_all_rejects_new_objects() {
        let registry = registry(4);
        let id = registry.add("v", Pose::default(), cube(), 0).unwrap();
        let handle = registry.handle(id).unwrap();

        registry.close_all();
        assert_eq!(registry.count(), 0);
        assert!(handle.is_stale());
        assert!(matches!(
            registry.add("w", Pose::default(), cube(), 0),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_handle_outliving_registry() {
        let registry = registry(4);
        let id = registry.add("v", Pose::default(), cube(), 0).unwrap();
        let handle = registry.handle(id).unwrap();
        drop(registry);
        assert!(matches!(handle.size(), Err(Error::NotFound(_))));
    }
}
