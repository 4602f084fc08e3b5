use crate::interpret::Interpretation;
use serde::Serialize;

/// The response body for every request: `ok` plus either an interpretation
/// or an error, never both
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interpretation: Option<Interpretation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    pub fn success(interpretation: Interpretation) -> Self {
        Envelope {
            ok: true,
            interpretation: Some(interpretation),
            error: None,
        }
    }

    pub fn failure(error: String) -> Self {
        Envelope {
            ok: false,
            interpretation: None,
            error: Some(error),
        }
    }

    /// Bare `{ok: true}`, used by the liveness probe
    pub fn alive() -> Self {
        Envelope {
            ok: true,
            interpretation: None,
            error: None,
        }
    }
}
