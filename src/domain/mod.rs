//! Value types and error taxonomy shared by every stage.
//!
//! Pure and deterministic; adapters and stages depend on this module,
//! never the other way around.

pub mod error;
pub mod events;
pub mod invoice;
pub mod vendor;

pub use error::{FailureKind, PipelineError, Result};
pub use events::{
    ClassifiedEvent, ConvertedEvent, EventPayload, ExtractedEvent, LoadedEvent, PageRef,
    SourceObject, SourceRef,
};
pub use invoice::{Invoice, LineItem};
pub use vendor::{InvoiceId, VendorType};
