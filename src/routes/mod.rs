//! API routes served behind the traffic pipeline.

pub mod devices;
