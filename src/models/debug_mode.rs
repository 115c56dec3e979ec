use chrono::{DateTime, Utc};
use serde::Serialize;

/// Single process-wide document. Gates OfferEngine auto-accept (§4.9).
#[derive(Debug, Clone, Serialize)]
pub struct DebugMode {
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}
