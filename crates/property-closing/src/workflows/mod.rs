pub mod buying;
pub mod context;
pub mod documents;
pub mod property;
pub mod rejection;

pub use context::{
    ActionContext, Actor, ActorRole, Clock, FixedClock, IdGenerator, SequentialIds, SystemClock,
    UserId, UuidGenerator,
};
pub use documents::{Document, DocumentId};
pub use property::{
    AdditionalCategory, MandatoryDocument, Property, PropertyActivity, PropertyId, PropertyListing,
    PropertyStatus,
};
pub use rejection::WorkflowRejection;
