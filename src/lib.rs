//! Efficiency-measure market preparation.
//!
//! Turns measure definitions into year-by-year baseline and efficient stock,
//! energy, carbon, and cost markets under competing adoption schemes, and
//! merges prepared measures into packages.

pub mod baseline;
pub mod config;
pub mod convert;
pub mod distribution;
pub mod error;
pub mod io;
pub mod keychain;
pub mod measure;
pub mod mseg;
pub mod package;
pub mod params;
pub mod runner;
pub mod series;
pub mod summary;
