//! Request pipeline middleware.

pub mod pipeline;

pub use pipeline::traffic_pipeline;
