//! Per-pass change sets.
//!
//! A [`ChangeSet`] is computed by comparing the host's update records and
//! object list against what the [`SceneMirror`] currently holds. It lives for
//! one synchronization pass.
//!
//! # Ordering
//!
//! Changes are listed removals first, then modifications, then additions.
//! An object whose primitive category or data-block changed appears as a
//! removal followed by an addition, so its stale prototype is gone before
//! the replacement is exported. Light filters are added before lights so a
//! light can link filters exported in the same pass.

use std::collections::BTreeSet;
use std::fmt;

use scenebridge_core::host::{
    Depsgraph, HostGeometry, HostObject, ObjectId, PrimitiveCategory, UpdateTags,
};

use crate::mirror::{PrototypeData, SceneMirror};

/// What happened to one object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Removed,
    Geometry,
    Transform,
    Material,
    Visibility,
    /// A single primvar-backed property changed.
    Property(String),
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => f.write_str("added"),
            Self::Removed => f.write_str("removed"),
            Self::Geometry => f.write_str("geometry"),
            Self::Transform => f.write_str("transform"),
            Self::Material => f.write_str("material"),
            Self::Visibility => f.write_str("visibility"),
            Self::Property(name) => write!(f, "property {name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Change {
    pub object: ObjectId,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diffs the dependency graph against the mirror.
    pub fn compute(depsgraph: &dyn Depsgraph, mirror: &SceneMirror) -> Self {
        let mut set = Self::new();
        let mut replaced = BTreeSet::new();
        let mut removed = BTreeSet::new();
        let mut relinked = BTreeSet::new();

        // Removals: gone, hidden, or no longer the same kind of primitive.
        for id in mirror.known_objects() {
            match depsgraph.object(id) {
                Some(object) if object.visible => {
                    if Self::needs_replacement(object, mirror) {
                        set.push(id, ChangeKind::Removed);
                        replaced.insert(id);
                    } else {
                        continue;
                    }
                }
                _ => {
                    set.push(id, ChangeKind::Removed);
                    removed.insert(id);
                }
            }
            let was_filter = mirror
                .prototype_for_object(id)
                .is_some_and(|prototype| prototype.category == PrimitiveCategory::LightFilter);
            if was_filter {
                relinked.extend(Self::lights_linked_to(depsgraph, mirror, id));
            }
        }

        let mut added: Vec<&HostObject> = depsgraph
            .objects()
            .iter()
            .filter(|ob| ob.visible)
            .filter(|ob| !mirror.contains_object(ob.id) || replaced.contains(&ob.id))
            .collect();
        added.sort_by_key(|ob| ob.category() != PrimitiveCategory::LightFilter);
        for object in &added {
            if object.category() == PrimitiveCategory::LightFilter {
                relinked.extend(Self::lights_linked_to(depsgraph, mirror, object.id));
            }
        }

        // Lights whose linked filters come or go are relinked.
        for light in relinked {
            if mirror.contains_object(light)
                && !removed.contains(&light)
                && !replaced.contains(&light)
            {
                set.push(light, ChangeKind::Geometry);
            }
        }

        // Modifications of objects that stay in place.
        for update in depsgraph.updates() {
            let id = update.id;
            if !mirror.contains_object(id) || replaced.contains(&id) {
                continue;
            }
            let Some(object) = depsgraph.object(id).filter(|ob| ob.visible) else {
                continue;
            };
            if update.tags.contains(UpdateTags::GEOMETRY) {
                set.push(id, ChangeKind::Geometry);
            }
            if update.tags.contains(UpdateTags::TRANSFORM) {
                set.push(id, ChangeKind::Transform);
            }
            if update.tags.contains(UpdateTags::SHADING) {
                set.push(id, ChangeKind::Material);
            }
            if update.tags.contains(UpdateTags::VISIBILITY) {
                set.push(id, ChangeKind::Visibility);
            }
            if let Some(property) = &update.property {
                set.push(id, ChangeKind::Property(property.clone()));
            }

            let moves_filter = update
                .tags
                .intersects(UpdateTags::GEOMETRY | UpdateTags::TRANSFORM);
            if object.category() == PrimitiveCategory::LightFilter && moves_filter {
                for light in Self::lights_linked_to(depsgraph, mirror, object.id) {
                    if mirror.contains_object(light) && !replaced.contains(&light) {
                        set.push(light, ChangeKind::Geometry);
                    }
                }
            }
        }

        // Additions, light filters first.
        for object in added {
            set.push(object.id, ChangeKind::Added);
        }

        set
    }

    fn needs_replacement(object: &HostObject, mirror: &SceneMirror) -> bool {
        if mirror.object_data(object.id) != Some(object.data) {
            return true;
        }
        mirror
            .prototype_for_object(object.id)
            .is_some_and(|prototype| prototype.category != object.category())
    }

    /// Lights linked to `filter`, from the host's light data and from the
    /// links recorded on the filter's prototype.
    fn lights_linked_to(
        depsgraph: &dyn Depsgraph,
        mirror: &SceneMirror,
        filter: ObjectId,
    ) -> BTreeSet<ObjectId> {
        let mut lights: BTreeSet<ObjectId> = depsgraph
            .objects()
            .iter()
            .filter(|ob| match &ob.geometry {
                HostGeometry::Light(light) => light.filters.contains(&filter),
                _ => false,
            })
            .map(|ob| ob.id)
            .collect();
        if let Some(prototype) = mirror.prototype_for_object(filter)
            && let PrototypeData::LightFilter(nodes) = &prototype.data
        {
            lights.extend(nodes.lights.iter().copied());
        }
        lights
    }

    /// Appends a change unless the same change is already listed.
    pub fn push(&mut self, object: ObjectId, kind: ChangeKind) {
        let change = Change { object, kind };
        if !self.changes.contains(&change) {
            self.changes.push(change);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn contains(&self, object: ObjectId, kind: &ChangeKind) -> bool {
        self.changes
            .iter()
            .any(|change| change.object == object && change.kind == *kind)
    }

    /// Number of changes of `kind`.
    pub fn count(&self, kind: &ChangeKind) -> usize {
        self.changes
            .iter()
            .filter(|change| change.kind == *kind)
            .count()
    }

    /// Changes recorded for `object`, in pass order.
    pub fn for_object(&self, object: ObjectId) -> Vec<&ChangeKind> {
        self.changes
            .iter()
            .filter(|change| change.object == object)
            .map(|change| &change.kind)
            .collect()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a Change;
    type IntoIter = std::slice::Iter<'a, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}
