pub mod public;
pub mod upstream;
