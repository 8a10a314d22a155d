pub mod analyzer;
pub mod config;
pub mod graph;
pub mod layout;
pub mod render;
pub mod state;
#[doc(hidden)]
pub mod test_support;
