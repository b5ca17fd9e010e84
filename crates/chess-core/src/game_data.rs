use serde::{Deserialize, Serialize};

/// A game as supplied by the worklist: its id plus the serialized mainline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: i64,
    /// SAN movetext (PGN-style) or a UCI move list
    pub movetext: String,
}

impl GameRecord {
    pub fn new(id: i64, movetext: impl Into<String>) -> Self {
        Self {
            id,
            movetext: movetext.into(),
        }
    }
}
