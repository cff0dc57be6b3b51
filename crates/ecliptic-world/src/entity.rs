//! The live entity repository.
//!
//! Owns every identifier-addressable object created during a game and hands
//! out the integer identifiers the save engine writes in `g` reference
//! markers. On load, the repository is repopulated from the decoded graph
//! with [`EntityRepository::restore`] before deferred references resolve.

use std::collections::BTreeMap;

use ecliptic_save::context::EntityLookup;
use ecliptic_save::id::EntityId;
use ecliptic_save::value::ObjRef;

/// Identifier-addressed store of live entities.
pub struct EntityRepository {
    entries: BTreeMap<u64, ObjRef>,
    next: u64,
}

impl Default for EntityRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRepository {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next: 1,
        }
    }

    /// Insert a live instance, assigning the next identifier and stamping it
    /// onto the instance. Inserting an instance that already holds an
    /// identifier known to this repository returns that identifier.
    pub fn insert(&mut self, obj: &ObjRef) -> EntityId {
        if let Some(id) = obj.borrow().entity_id {
            if self.entries.contains_key(&id.0) {
                return id;
            }
        }
        let id = EntityId(self.next);
        self.next += 1;
        obj.borrow_mut().entity_id = Some(id);
        self.entries.insert(id.0, obj.clone());
        id
    }

    /// Re-attach a decoded instance under its saved identifier. Future
    /// [`insert`](EntityRepository::insert) calls keep assigning past the
    /// highest restored identifier.
    pub fn restore(&mut self, id: EntityId, obj: &ObjRef) {
        obj.borrow_mut().entity_id = Some(id);
        self.entries.insert(id.0, obj.clone());
        if id.0 >= self.next {
            self.next = id.0 + 1;
        }
    }

    pub fn get(&self, id: EntityId) -> Option<ObjRef> {
        self.entries.get(&id.0).cloned()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entries.contains_key(&id.0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entities in ascending identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &ObjRef)> {
        self.entries.iter().map(|(id, obj)| (EntityId(*id), obj))
    }
}

impl EntityLookup for EntityRepository {
    fn entity(&self, id: EntityId) -> Option<ObjRef> {
        self.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecliptic_save::id::TypeId;
    use ecliptic_save::value::Instance;

    fn obj() -> ObjRef {
        ObjRef::new(Instance::new(TypeId(0)))
    }

    #[test]
    fn insert_assigns_sequential_ids_and_stamps() {
        let mut repo = EntityRepository::new();
        let a = obj();
        let b = obj();
        assert_eq!(repo.insert(&a), EntityId(1));
        assert_eq!(repo.insert(&b), EntityId(2));
        assert_eq!(a.borrow().entity_id, Some(EntityId(1)));
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn reinserting_a_known_entity_keeps_its_id() {
        let mut repo = EntityRepository::new();
        let a = obj();
        let id = repo.insert(&a);
        assert_eq!(repo.insert(&a), id);
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn restore_keeps_saved_ids_and_advances_assignment() {
        let mut repo = EntityRepository::new();
        let a = obj();
        repo.restore(EntityId(7), &a);
        assert!(repo.contains(EntityId(7)));
        assert!(a.borrow().entity_id == Some(EntityId(7)));

        let b = obj();
        assert_eq!(repo.insert(&b), EntityId(8));
    }

    #[test]
    fn lookup_returns_the_same_instance() {
        let mut repo = EntityRepository::new();
        let a = obj();
        let id = repo.insert(&a);
        let found = repo.get(id).unwrap();
        assert!(found.ptr_eq(&a));
        assert!(repo.get(EntityId(99)).is_none());
    }

    #[test]
    fn iteration_is_in_identifier_order() {
        let mut repo = EntityRepository::new();
        repo.restore(EntityId(5), &obj());
        repo.restore(EntityId(2), &obj());
        repo.restore(EntityId(9), &obj());
        let ids: Vec<u64> = repo.iter().map(|(id, _)| id.0).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }
}
