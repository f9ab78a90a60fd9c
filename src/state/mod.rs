//! Voicemail state: the on-disk catalog and the controller that drives it

mod catalog;
mod controller;

pub use catalog::Catalog;
pub use controller::Controller;
