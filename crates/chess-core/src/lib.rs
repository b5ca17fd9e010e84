//! Shared chess plumbing for the tactics worker: worklist game records and
//! movetext decoding.

pub mod game_data;
pub mod movetext;

pub use game_data::GameRecord;
pub use movetext::{decode_movetext, move_to_uci, DecodedMove, MovetextError};
