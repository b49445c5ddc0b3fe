//! Convenience re-exports for consumers of this crate.

pub use crate::bus::{EventBus, PublishOutcome};
pub use crate::catalog;
pub use crate::envelope::EventEnvelope;
pub use crate::error::{EventBusError, EventBusResult};
pub use crate::middleware::{Middleware, MiddlewareAction};
pub use crate::subscription::{DeliveryMode, EventHandler, FilterPredicate, SubscriberState};
