pub mod publisher;
pub mod types;

pub use publisher::{dispatch_all_in_background, dispatch_in_background, EventBus, EventPublisher};
pub use types::{PublishedEvent, SampleLifecycleEvent};
