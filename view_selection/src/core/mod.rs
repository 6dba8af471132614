//! Core data model: views, relation indices and how they are built

/// Import/export of candidate views
pub mod io;
/// Index-building sessions assigning edge ids and building relation indices
pub mod relation_index_builder;
/// Staging relation indices on disk
pub mod staging;
/// [`View`], [`RelationIndex`] and [`ViewCollection`] structs
pub mod view;

#[doc(inline)]
pub use relation_index_builder::{RelationIndexBuilder, RelationSink, ViewBuilder};
#[doc(inline)]
pub use staging::{StagedView, StagingOptions, StagingWriter};
#[doc(inline)]
pub use view::{EdgeId, InstanceIndex, RelationIndex, View, ViewCollection, ViewError};
