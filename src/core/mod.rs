pub mod input;
pub mod priority;
