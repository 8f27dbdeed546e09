//! Incremental map layer reconciliation.
//!
//! The reconciler remembers what is currently drawn, keyed by entity, and
//! turns each new entity list into the minimal create/update/remove calls on
//! a [`LayerRenderer`].

use crate::entity::{EntityCategory, EntityKey, MapEntity};
use crate::store::MapLayersView;
use common::LayerFilter;
use std::collections::HashMap;
use tracing::debug;

/// Drawing backend. Handles are whatever the backend needs to find the
/// drawn object again.
pub trait LayerRenderer {
    type Handle;

    fn on_create(&mut self, entity: &MapEntity) -> Self::Handle;
    fn on_update(&mut self, handle: &mut Self::Handle, entity: &MapEntity);
    fn on_remove(&mut self, handle: Self::Handle);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerDiff {
    pub to_create: Vec<EntityKey>,
    pub to_update: Vec<EntityKey>,
    pub to_remove: Vec<EntityKey>,
}

impl LayerDiff {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_remove.is_empty()
    }

    pub fn created_ids(&self) -> Vec<&str> {
        self.to_create.iter().map(|k| k.id.as_str()).collect()
    }

    pub fn updated_ids(&self) -> Vec<&str> {
        self.to_update.iter().map(|k| k.id.as_str()).collect()
    }

    pub fn removed_ids(&self) -> Vec<&str> {
        self.to_remove.iter().map(|k| k.id.as_str()).collect()
    }

    fn extend(&mut self, other: LayerDiff) {
        self.to_create.extend(other.to_create);
        self.to_update.extend(other.to_update);
        self.to_remove.extend(other.to_remove);
    }
}

struct Rendered<H> {
    handle: H,
    entity: MapEntity,
}

pub struct MapLayerReconciler<H> {
    rendered: HashMap<EntityKey, Rendered<H>>,
}

impl<H> Default for MapLayerReconciler<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> MapLayerReconciler<H> {
    pub fn new() -> Self {
        Self {
            rendered: HashMap::new(),
        }
    }

    pub fn rendered_count(&self) -> usize {
        self.rendered.len()
    }

    pub fn is_rendered(&self, key: &EntityKey) -> bool {
        self.rendered.contains_key(key)
    }

    pub fn handle(&self, key: &EntityKey) -> Option<&H> {
        self.rendered.get(key).map(|r| &r.handle)
    }

    /// Bring one category in line with `entities`. Entities of other
    /// categories are ignored; on duplicate ids the last one wins.
    pub fn reconcile<R>(
        &mut self,
        entities: &[MapEntity],
        category: EntityCategory,
        renderer: &mut R,
    ) -> LayerDiff
    where
        R: LayerRenderer<Handle = H>,
    {
        let mut last_index: HashMap<&str, usize> = HashMap::with_capacity(entities.len());
        for (idx, entity) in entities.iter().enumerate() {
            if entity.category == category {
                last_index.insert(entity.id.as_str(), idx);
            }
        }

        let mut diff = LayerDiff::default();

        let mut stale: Vec<EntityKey> = self
            .rendered
            .keys()
            .filter(|k| k.category == category && !last_index.contains_key(k.id.as_str()))
            .cloned()
            .collect();
        stale.sort();
        for key in stale {
            if let Some(gone) = self.rendered.remove(&key) {
                renderer.on_remove(gone.handle);
                diff.to_remove.push(key);
            }
        }

        for (idx, entity) in entities.iter().enumerate() {
            if entity.category != category || last_index.get(entity.id.as_str()) != Some(&idx) {
                continue;
            }
            let key = entity.key();
            match self.rendered.get_mut(&key) {
                Some(existing) => {
                    if !existing.entity.same_content(entity) {
                        renderer.on_update(&mut existing.handle, entity);
                        existing.entity = entity.clone();
                        diff.to_update.push(key);
                    }
                }
                None => {
                    let handle = renderer.on_create(entity);
                    self.rendered.insert(
                        key.clone(),
                        Rendered {
                            handle,
                            entity: entity.clone(),
                        },
                    );
                    diff.to_create.push(key);
                }
            }
        }

        if !diff.is_empty() {
            debug!(
                "{} layer: +{} ~{} -{}",
                category.as_str(),
                diff.to_create.len(),
                diff.to_update.len(),
                diff.to_remove.len()
            );
        }
        diff
    }

    /// Reconcile every category of a map view. Categories hidden by
    /// `filter` are reconciled against nothing, which removes them.
    pub fn reconcile_view<R>(
        &mut self,
        view: &MapLayersView,
        filter: LayerFilter,
        renderer: &mut R,
    ) -> LayerDiff
    where
        R: LayerRenderer<Handle = H>,
    {
        let mut diff = LayerDiff::default();
        for category in EntityCategory::ALL {
            let entities = if shows(filter, category) {
                view.entities(category)
            } else {
                Vec::new()
            };
            diff.extend(self.reconcile(&entities, category, renderer));
        }
        diff
    }

    /// Remove everything currently drawn.
    pub fn clear<R>(&mut self, renderer: &mut R) -> LayerDiff
    where
        R: LayerRenderer<Handle = H>,
    {
        let mut keys: Vec<EntityKey> = self.rendered.keys().cloned().collect();
        keys.sort();
        let mut diff = LayerDiff::default();
        for key in keys {
            if let Some(gone) = self.rendered.remove(&key) {
                renderer.on_remove(gone.handle);
                diff.to_remove.push(key);
            }
        }
        diff
    }
}

pub fn shows(filter: LayerFilter, category: EntityCategory) -> bool {
    match filter {
        LayerFilter::All => true,
        LayerFilter::Zones => category == EntityCategory::Zone,
        LayerFilter::Evacuation => category == EntityCategory::EvacuationPoint,
        LayerFilter::Reports => category == EntityCategory::Report,
    }
}
