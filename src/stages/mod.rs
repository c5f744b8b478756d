//! The four processing stages.
//!
//! Each stage is a [`crate::runtime::StageHandler`] over the shared ports:
//! it decodes its input event, does its work idempotently, publishes the
//! next event, and quarantines permanent failures before surfacing them.

pub mod classifier;
pub mod extractor;
pub mod normalizer;
pub mod warehouse_writer;

pub use classifier::Classifier;
pub use extractor::Extractor;
pub use normalizer::Normalizer;
pub use warehouse_writer::WarehouseWriter;
