mod action;
mod models;

pub use action::HttpRequestNode;
pub use models::{AuthConfig, BodyKind, HttpMethod, HttpRequestParams, RequestBody};
