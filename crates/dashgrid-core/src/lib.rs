#![forbid(unsafe_code)]

//! Core: grid-cell geometry shared by the dashgrid crates.
//!
//! # Role in dashgrid
//! `dashgrid-core` owns the rectangle model every other crate speaks. The
//! layout engine (`dashgrid-layout`) re-exports these types so hosts only
//! need one dependency.

pub mod geometry;

pub use geometry::{Axis, GridRect, Size};
