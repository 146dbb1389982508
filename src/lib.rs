pub mod annotate;
pub mod cli;
pub mod detect;
pub mod error;
pub mod index;
pub mod load;
pub mod model;
pub mod parsers;
pub mod render;
