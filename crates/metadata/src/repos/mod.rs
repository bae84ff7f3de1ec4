//! Repository traits, one per concern.

pub mod imports;
pub mod photos;

pub use imports::ImportRepo;
pub use photos::{NewPhoto, PhotoRepo};
