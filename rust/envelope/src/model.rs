// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Arena-backed element catalog.
//!
//! [`InMemoryModel`] owns elements, their decomposition tree, meshes and
//! property sets, and implements both [`ElementIndex`] and [`MeshSource`].
//! Hosts that already keep a model elsewhere implement the traits directly.

use ifc2citygml_geometry::Mesh;
use rustc_hash::FxHashMap;
use slotmap::{SecondaryMap, SlotMap};

use crate::element::{Element, ElementIndex, ElementKey, ElementKind, MeshSource, PsetValue};

/// Property sets of one element: set name → attribute name → value.
type PropertySets = FxHashMap<String, FxHashMap<String, PsetValue>>;

#[derive(Debug, Default)]
pub struct InMemoryModel {
    elements: SlotMap<ElementKey, Element>,
    parents: SecondaryMap<ElementKey, ElementKey>,
    children: SecondaryMap<ElementKey, Vec<ElementKey>>,
    meshes: SecondaryMap<ElementKey, Mesh>,
    psets: SecondaryMap<ElementKey, PropertySets>,
}

impl InMemoryModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an element below `parent` (a root when `None`).
    pub fn add(&mut self, element: Element, parent: Option<ElementKey>) -> ElementKey {
        let key = self.elements.insert(element);
        self.children.insert(key, Vec::new());
        if let Some(parent) = parent.filter(|p| self.elements.contains_key(*p)) {
            self.parents.insert(key, parent);
            if let Some(siblings) = self.children.get_mut(parent) {
                siblings.push(key);
            }
        }
        key
    }

    /// Inserts an element together with its mesh.
    pub fn add_with_mesh(&mut self, element: Element, parent: Option<ElementKey>, mesh: Mesh) -> ElementKey {
        let key = self.add(element, parent);
        self.set_mesh(key, mesh);
        key
    }

    pub fn set_mesh(&mut self, key: ElementKey, mesh: Mesh) {
        if self.elements.contains_key(key) {
            self.meshes.insert(key, mesh);
        }
    }

    pub fn set_property(&mut self, key: ElementKey, set: &str, attribute: &str, value: PsetValue) {
        if !self.elements.contains_key(key) {
            return;
        }
        if !self.psets.contains_key(key) {
            self.psets.insert(key, PropertySets::default());
        }
        if let Some(sets) = self.psets.get_mut(key) {
            sets.entry(set.to_string())
                .or_default()
                .insert(attribute.to_string(), value);
        }
    }

    pub fn parent(&self, key: ElementKey) -> Option<ElementKey> {
        self.parents.get(key).copied()
    }

    /// Root elements in insertion order.
    pub fn roots(&self) -> impl Iterator<Item = ElementKey> + '_ {
        self.elements.keys().filter(|k| !self.parents.contains_key(*k))
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl ElementIndex for InMemoryModel {
    fn element(&self, key: ElementKey) -> Option<&Element> {
        self.elements.get(key)
    }

    fn find_descendants(
        &self,
        root: ElementKey,
        kind: ElementKind,
        predefined_type: Option<&str>,
    ) -> Vec<ElementKey> {
        let matches = |element: &Element| {
            element.kind == kind
                && predefined_type.map_or(true, |wanted| {
                    element
                        .predefined_type
                        .as_deref()
                        .is_some_and(|t| t.eq_ignore_ascii_case(wanted))
                })
        };

        // depth-first, children in insertion order
        let mut found = Vec::new();
        let mut stack: Vec<ElementKey> = self
            .children
            .get(root)
            .map(|c| c.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(key) = stack.pop() {
            if self.elements.get(key).is_some_and(matches) {
                found.push(key);
            }
            if let Some(children) = self.children.get(key) {
                stack.extend(children.iter().rev().copied());
            }
        }
        found
    }

    fn find_pset(&self, element: ElementKey, set: &str, attribute: Option<&str>) -> Option<PsetValue> {
        let properties = self.psets.get(element)?.get(set)?;
        match attribute {
            Some(name) => properties.get(name).cloned(),
            None => Some(PsetValue::Boolean(true)),
        }
    }
}

impl MeshSource for InMemoryModel {
    fn mesh(&self, element: ElementKey) -> Option<Mesh> {
        self.meshes.get(element).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> (InMemoryModel, ElementKey) {
        let mut model = InMemoryModel::new();
        let building = model.add(Element::new(ElementKind::Building, "b"), None);
        let storey = model.add(Element::new(ElementKind::Storey, "s"), Some(building));
        model.add(
            Element::new(ElementKind::Slab, "floor").with_predefined_type("FLOOR"),
            Some(storey),
        );
        model.add(
            Element::new(ElementKind::Slab, "base").with_predefined_type("BASESLAB"),
            Some(storey),
        );
        let roof = model.add(Element::new(ElementKind::Roof, "roof"), Some(building));
        model.add(
            Element::new(ElementKind::Slab, "roof-slab").with_predefined_type("roof"),
            Some(roof),
        );
        (model, building)
    }

    fn ids(model: &InMemoryModel, keys: &[ElementKey]) -> Vec<String> {
        keys.iter()
            .filter_map(|k| model.element(*k))
            .map(|e| e.global_id.clone())
            .collect()
    }

    #[test]
    fn descendants_are_found_at_any_depth_in_order() {
        let (model, building) = tree();
        let slabs = model.find_descendants(building, ElementKind::Slab, None);
        assert_eq!(ids(&model, &slabs), vec!["floor", "base", "roof-slab"]);
    }

    #[test]
    fn predefined_type_filter_ignores_case() {
        let (model, building) = tree();
        let roofs = model.find_descendants(building, ElementKind::Slab, Some("ROOF"));
        assert_eq!(ids(&model, &roofs), vec!["roof-slab"]);
        assert!(model
            .find_descendants(building, ElementKind::Slab, Some("LANDING"))
            .is_empty());
    }

    #[test]
    fn property_lookup() {
        let (mut model, building) = tree();
        model.set_property(building, "BaseQuantities", "Height", PsetValue::Real(7.5));
        assert_eq!(
            model.find_pset(building, "BaseQuantities", Some("Height")),
            Some(PsetValue::Real(7.5))
        );
        assert_eq!(
            model.find_pset(building, "BaseQuantities", None),
            Some(PsetValue::Boolean(true))
        );
        assert_eq!(model.find_pset(building, "BaseQuantities", Some("Width")), None);
        assert_eq!(model.find_pset(building, "Other", None), None);
    }

    #[test]
    fn roots_and_parents() {
        let (model, building) = tree();
        assert_eq!(model.roots().collect::<Vec<_>>(), vec![building]);
        assert_eq!(model.len(), 6);
        let storey = model.find_descendants(building, ElementKind::Storey, None)[0];
        assert_eq!(model.parent(storey), Some(building));
    }
}
