#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

pub mod artifacts;
pub mod config;
pub mod crossing;
pub mod estimate;
pub mod features;
pub mod model;
pub mod report;
pub mod types;
