pub mod analysis;
pub mod core;
pub mod embedding;
pub mod index;
pub mod server;
pub mod state;
pub mod vector_math;
