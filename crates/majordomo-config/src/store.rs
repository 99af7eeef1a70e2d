//! Durable store backend selection.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Persistence backend used by the durable gateway and dispatcher.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum StoreBackend {
    /// Records live in process memory and vanish on restart.
    Memory,
    /// One file per record under the configured store directory.
    #[default]
    File,
}
