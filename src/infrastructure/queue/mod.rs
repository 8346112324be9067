pub mod rabbitmq;

pub use rabbitmq::RabbitMqService;

/// Name of the durable queue carrying transcode job descriptors.
pub const TRANSCODE_QUEUE: &str = "transcode_tasks";

/// Typed result of the broker capability probe. The dispatcher branches
/// on this to pick the queued or the inline execution path; it never
/// infers availability from a caught publish error alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable,
}
