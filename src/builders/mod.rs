//! Builders to construct repeater services from configuration.

pub mod repeater_builder;

pub use repeater_builder::{build_repeater, build_repeaters, build_waitpoint, BuiltRepeater, GateHandle};
