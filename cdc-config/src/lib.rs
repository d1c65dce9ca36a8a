//! Shared configuration types for CDC pipelines.
//!
//! Every type in this crate is deserializable from the layered configuration
//! files loaded by [`load::load_config`] and carries its own validation. A
//! [`shared::PipelineConfig`] is the single immutable input a pipeline is
//! created from; changing it requires removing and recreating the pipeline.

pub mod load;
pub mod shared;
