//! Application services: the refresh engine, its ports and the worker.

pub mod clock;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod repos;
pub mod syndication;
pub mod worker;
