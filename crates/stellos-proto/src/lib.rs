//! Shared model, geometry and backend plumbing for the stellos galaxy map.

pub mod api;
pub mod config;
pub mod feed;
pub mod geometry;
pub mod platform;
pub mod track;
