//! Active input/output sets and the primary lighting output

use crate::device::Endpoint;

/// Snapshot of the session membership
///
/// The active lists always follow the order of the preferred ids and only
/// contain endpoints that are currently connected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub active_inputs: Vec<Endpoint>,
    pub active_outputs: Vec<Endpoint>,
    pub preferred_inputs: Vec<String>,
    pub preferred_outputs: Vec<String>,
}

impl Session {
    /// First lighting-capable active output, else the first active output
    pub fn primary_lighting_output(&self) -> Option<&Endpoint> {
        self.active_outputs
            .iter()
            .find(|ep| ep.shows_lighting())
            .or_else(|| self.active_outputs.first())
    }

    pub fn lighting_outputs(&self) -> impl Iterator<Item = &Endpoint> {
        self.active_outputs.iter().filter(|ep| ep.shows_lighting())
    }

    pub fn is_active_output(&self, id: &str) -> bool {
        self.active_outputs.iter().any(|ep| ep.id == id)
    }

    pub fn is_active_input(&self, id: &str) -> bool {
        self.active_inputs.iter().any(|ep| ep.id == id)
    }
}

/// Drop empty and repeated ids, keeping first occurrences in order
pub(crate) fn dedup_ids<I, S>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for id in ids {
        let id = id.as_ref().trim();
        if !id.is_empty() && !out.iter().any(|seen| seen == id) {
            out.push(id.to_string());
        }
    }
    out
}

/// Connected endpoints matching `preferred`, in preference order
pub(crate) fn resolve(preferred: &[String], connected: &[Endpoint]) -> Vec<Endpoint> {
    preferred
        .iter()
        .filter_map(|id| connected.iter().find(|ep| &ep.id == id).cloned())
        .collect()
}
