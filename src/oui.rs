//! Optional mobile-hotspot OUI detection hook (spec §4.7, a plug point only).

use crate::config::{OuiAction, OuiSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OuiDecision {
    Pass,
    Flagged,
    Excluded,
}

/// Recognizes `{enabled, action, prefixes}` and decides, for a normalized
/// lowercase BSSID, whether it should be flagged, excluded, or passed
/// through. Applied *before* emission (resolved Open Question in spec §9a):
/// an `Exclude` decision means the `Transformer` emits nothing for that
/// observation, so excluded rows never reach quality weighting.
pub struct OuiPolicy<'a> {
    settings: &'a OuiSettings,
}

impl<'a> OuiPolicy<'a> {
    pub fn new(settings: &'a OuiSettings) -> Self {
        Self { settings }
    }

    pub fn decide(&self, normalized_bssid: &str) -> OuiDecision {
        if !self.settings.enabled {
            return OuiDecision::Pass;
        }
        let prefix_matches = self
            .settings
            .prefixes
            .iter()
            .any(|p| normalized_bssid.starts_with(&p.to_lowercase()));
        if !prefix_matches {
            return OuiDecision::Pass;
        }
        match self.settings.action {
            OuiAction::Exclude => OuiDecision::Excluded,
            OuiAction::Flag | OuiAction::Log => OuiDecision::Flagged,
        }
    }
}
