//! APIRule existence probe

use tracing::debug;

use crate::client::{ClientError, RouteClientTrait};

/// Result of looking up an APIRule
#[derive(Debug)]
pub enum Probe {
    /// Lookup succeeded
    Present,
    /// The API answered 404
    Absent,
    /// The lookup itself failed; existence is unknown
    TransientError(ClientError),
}

impl Probe {
    pub fn is_present(&self) -> bool {
        matches!(self, Probe::Present)
    }
}

/// Look up an APIRule by name. No side effects.
pub async fn probe<C: RouteClientTrait + ?Sized>(client: &C, name: &str) -> Probe {
    match client.get_api_rule(name).await {
        Ok(_) => {
            debug!(resource = %name, "APIRule present");
            Probe::Present
        }
        Err(ClientError::NotFound(_)) => {
            debug!(resource = %name, "APIRule absent");
            Probe::Absent
        }
        Err(e) => Probe::TransientError(e),
    }
}
