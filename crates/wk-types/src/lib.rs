//! Shared domain types for WandererKills: the canonical killmail/event/
//! subscription schema, the cross-pipeline error taxonomy, and the field-name
//! normalization boundary that keeps upstream key aliasing from leaking past
//! stage 1 of the enrichment pipeline.

pub mod error;
pub mod killmail;
pub mod normalize;
pub mod offsets;
pub mod priority;
pub mod subscription;

pub use error::ErrorKind;
pub use killmail::{Event, Killmail, Participant, ResolvedNames};
pub use normalize::Classification;
pub use offsets::ClientOffsets;
pub use priority::Priority;
pub use subscription::{Subscription, SubscriptionKind, SubscriptionRequest};
