use serde::{Deserialize, Serialize};

use crate::generation::Usage;

pub use crate::normalize::RawGenerateRequest;

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub ok: bool,
    pub html: String,
    pub usage: Option<Usage>,
}

impl GenerateResponse {
    pub fn new(html: String, usage: Option<Usage>) -> Self {
        Self {
            ok: true,
            html,
            usage,
        }
    }
}
