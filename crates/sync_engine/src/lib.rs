//! Polling, caching, view derivation and map reconciliation for the
//! SiagaAI client.

pub mod entity;
pub mod fetcher;
pub mod reconcile;
pub mod scheduler;
pub mod store;

pub use entity::{EntityCategory, EntityKey, MapEntity};
pub use fetcher::{FetchPhase, FetchResult, ResourceFetcher, ResourceSpec, UpdateSink};
pub use reconcile::{LayerDiff, LayerRenderer, MapLayerReconciler};
pub use scheduler::{PollingScheduler, ResourceStatus};
pub use store::{MergedViewStore, Subscription, ViewData, ViewKind, ViewSnapshot};
