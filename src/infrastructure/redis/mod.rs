pub mod client;
pub mod task_store;

pub use client::RedisService;
pub use task_store::RedisTaskStore;
