pub mod validation;

pub use validation::{validate_json, validate_request};
