//! Alert expansion: interpolation, identity tags and composite decomposition

pub mod composite;
pub mod interpolate;
pub mod tags;

pub use composite::decompose;
pub use interpolate::expand;
