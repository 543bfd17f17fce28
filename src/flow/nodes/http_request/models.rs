use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_timeout() -> u64 {
    30_000
}

/// Parameters of an `http_request` node, deserialized from the resolved
/// parameter set.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HttpRequestParams {
    /// request URL; supports template variables
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    /// header values support template variables
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// query parameter values support template variables
    #[serde(default)]
    pub query: HashMap<String, String>,
    #[serde(default)]
    pub body: RequestBody,
    #[serde(default)]
    pub auth: AuthConfig,
    /// request timeout in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RequestBody {
    #[serde(default)]
    pub kind: BodyKind,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BodyKind {
    #[default]
    None,
    Text,
    Json,
    Form,
}

/// Authorization applied to the outgoing request.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(tag = "auth_type", rename_all = "snake_case")]
pub enum AuthConfig {
    #[default]
    None,
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        password: String,
    },
}
