//! Domain data types.

pub mod dag;
pub mod index;
pub mod trial;
