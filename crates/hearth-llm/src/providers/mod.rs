pub mod common;
pub mod local;

pub use local::LocalInferenceClient;
