//! Core graph logic — identities, values, templates, resolution, planning.

pub mod dot;
pub mod error;
pub mod hasher;
pub mod lifecycle;
pub mod parser;
pub mod planner;
pub mod project;
pub mod registry;
pub mod resolver;
pub mod resource;
pub mod template;
pub mod types;
pub mod value;
