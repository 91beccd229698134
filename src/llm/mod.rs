pub mod client;
pub mod inference;
pub mod mock;

pub use client::{InferenceRequest, ModelClient};
pub use inference::InferenceClient;
pub use mock::{MockModel, MockResponse};
