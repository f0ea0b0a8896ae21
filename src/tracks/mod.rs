//! Track selection module

pub mod track;

pub use track::Track;
