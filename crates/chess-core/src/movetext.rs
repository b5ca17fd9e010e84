//! Movetext decoding: a regex tokenizer plus a legality replay.
//!
//! Accepts PGN-style SAN movetext (headers, comments, variations, move
//! numbers, NAGs and result tokens are ignored) or a plain UCI move list.
//! Every move is replayed from the standard start position, so a decoded
//! game is always a legal mainline.

use std::sync::LazyLock;

use chess::{Board, ChessMove, File, MoveGen, Piece, Rank, Square};
use regex::Regex;
use thiserror::Error;

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\]]*\]").unwrap());

static MOVE_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.+").unwrap());

static UCI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-h][1-8][a-h][1-8][qrbnQRBN]?$").unwrap());

static SAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:[KQRBN][a-h]?[1-8]?x?[a-h][1-8]|[a-h](?:x[a-h])?[1-8](?:=?[QRBN])?|O-O-O|O-O|0-0-0|0-0)$",
    )
    .unwrap()
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MovetextError {
    #[error("unrecognized token {token:?} at ply {ply}")]
    Unparsable { ply: usize, token: String },

    #[error("illegal move {token:?} at ply {ply}")]
    Illegal { ply: usize, token: String },

    #[error("ambiguous move {token:?} at ply {ply} ({candidates} candidates)")]
    Ambiguous {
        ply: usize,
        token: String,
        candidates: usize,
    },
}

/// One mainline move after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMove {
    /// 1-based ply
    pub ply: usize,
    pub mv: ChessMove,
    pub uci: String,
    /// Original SAN token when the input was SAN movetext
    pub san: Option<String>,
}

/// Decode a serialized mainline into validated moves.
pub fn decode_movetext(text: &str) -> Result<Vec<DecodedMove>, MovetextError> {
    let tokens = tokenize(text);
    let uci_mode = !tokens.is_empty() && tokens.iter().all(|t| UCI_RE.is_match(t));

    let mut board = Board::default();
    let mut moves = Vec::with_capacity(tokens.len());

    for (i, token) in tokens.iter().enumerate() {
        let ply = i + 1;
        let mv = if uci_mode {
            parse_uci_move(token)
                .filter(|m| board.legal(*m))
                .ok_or_else(|| MovetextError::Illegal {
                    ply,
                    token: token.clone(),
                })?
        } else {
            if !SAN_RE.is_match(token) {
                return Err(MovetextError::Unparsable {
                    ply,
                    token: token.clone(),
                });
            }
            resolve_san(&board, token).map_err(|candidates| {
                if candidates == 0 {
                    MovetextError::Illegal {
                        ply,
                        token: token.clone(),
                    }
                } else {
                    MovetextError::Ambiguous {
                        ply,
                        token: token.clone(),
                        candidates,
                    }
                }
            })?
        };

        moves.push(DecodedMove {
            ply,
            mv,
            uci: move_to_uci(mv),
            san: (!uci_mode).then(|| token.clone()),
        });
        board = board.make_move_new(mv);
    }

    Ok(moves)
}

/// Coordinate notation for a move (`e2e4`, `e7e8q`).
pub fn move_to_uci(mv: ChessMove) -> String {
    let promotion = match mv.get_promotion() {
        Some(Piece::Queen) => "q",
        Some(Piece::Rook) => "r",
        Some(Piece::Bishop) => "b",
        Some(Piece::Knight) => "n",
        _ => "",
    };
    format!("{}{}{}", mv.get_source(), mv.get_dest(), promotion)
}

/// Parse a coordinate move. Legality is not checked.
pub fn parse_uci_move(uci: &str) -> Option<ChessMove> {
    let bytes = uci.as_bytes();
    if bytes.len() < 4 {
        return None;
    }
    let square = |file: u8, rank: u8| -> Option<Square> {
        if !(b'a'..=b'h').contains(&file) || !(b'1'..=b'8').contains(&rank) {
            return None;
        }
        Some(Square::make_square(
            Rank::from_index((rank - b'1') as usize),
            File::from_index((file - b'a') as usize),
        ))
    };
    let from = square(bytes[0], bytes[1])?;
    let to = square(bytes[2], bytes[3])?;
    let promotion = match bytes.get(4) {
        None => None,
        Some(b'q' | b'Q') => Some(Piece::Queen),
        Some(b'r' | b'R') => Some(Piece::Rook),
        Some(b'b' | b'B') => Some(Piece::Bishop),
        Some(b'n' | b'N') => Some(Piece::Knight),
        Some(_) => return None,
    };
    Some(ChessMove::new(from, to, promotion))
}

/// Split movetext into move tokens, dropping everything that is not a move.
fn tokenize(text: &str) -> Vec<String> {
    strip_commentary(text)
        .split_whitespace()
        .filter_map(|raw| {
            let token = MOVE_NUMBER_RE.replace(raw, "");
            let token = token.trim_end_matches(['+', '#', '!', '?']);
            if token.is_empty() || token.starts_with('$') || is_result(token) {
                None
            } else {
                Some(token.to_string())
            }
        })
        .collect()
}

fn is_result(token: &str) -> bool {
    matches!(token, "1-0" | "0-1" | "1/2-1/2" | "*")
}

/// Remove headers, `{}` and `;` comments and (possibly nested) variations.
fn strip_commentary(text: &str) -> String {
    let text = HEADER_RE.replace_all(text, " ");
    let mut out = String::with_capacity(text.len());
    let mut variation_depth = 0usize;
    let mut in_brace = false;
    let mut in_line_comment = false;

    for c in text.chars() {
        if in_line_comment {
            if c == '\n' {
                in_line_comment = false;
                out.push(' ');
            }
            continue;
        }
        if in_brace {
            if c == '}' {
                in_brace = false;
                out.push(' ');
            }
            continue;
        }
        match c {
            '{' => in_brace = true,
            ';' => in_line_comment = true,
            '(' => variation_depth += 1,
            ')' => {
                variation_depth = variation_depth.saturating_sub(1);
                out.push(' ');
            }
            _ if variation_depth > 0 => {}
            ',' => out.push(' '),
            _ => out.push(c),
        }
    }

    out
}

/// Find the legal move matching a SAN token. `Err(n)` carries the number of
/// matching candidates (0 = no legal move, >1 = ambiguous).
fn resolve_san(board: &Board, san: &str) -> Result<ChessMove, usize> {
    let legal_moves: Vec<ChessMove> = MoveGen::new_legal(board).collect();

    let castle_direction = match san {
        "O-O" | "0-0" => Some(true),
        "O-O-O" | "0-0-0" => Some(false),
        _ => None,
    };
    if let Some(kingside) = castle_direction {
        return legal_moves
            .into_iter()
            .find(|m| {
                board.piece_on(m.get_source()) == Some(Piece::King) && {
                    let from = m.get_source().get_file().to_index() as i32;
                    let to = m.get_dest().get_file().to_index() as i32;
                    if kingside {
                        to - from == 2
                    } else {
                        from - to == 2
                    }
                }
            })
            .ok_or(0);
    }

    let (piece, rest) = match san.as_bytes()[0] {
        b'K' => (Piece::King, &san[1..]),
        b'Q' => (Piece::Queen, &san[1..]),
        b'R' => (Piece::Rook, &san[1..]),
        b'B' => (Piece::Bishop, &san[1..]),
        b'N' => (Piece::Knight, &san[1..]),
        _ => (Piece::Pawn, san),
    };

    // Promotion suffix, with or without '='
    let (rest, promotion) = match rest.as_bytes().last() {
        Some(b'Q' | b'R' | b'B' | b'N') if piece == Piece::Pawn => {
            let promo = match rest.as_bytes()[rest.len() - 1] {
                b'Q' => Piece::Queen,
                b'R' => Piece::Rook,
                b'B' => Piece::Bishop,
                _ => Piece::Knight,
            };
            (rest[..rest.len() - 1].trim_end_matches('='), Some(promo))
        }
        _ => (rest, None),
    };

    let rest = rest.replace('x', "");
    let bytes = rest.as_bytes();
    if bytes.len() < 2 {
        return Err(0);
    }
    let dest = Square::make_square(
        Rank::from_index((bytes[bytes.len() - 1] - b'1') as usize),
        File::from_index((bytes[bytes.len() - 2] - b'a') as usize),
    );
    let disambiguation = &bytes[..bytes.len() - 2];

    let candidates: Vec<ChessMove> = legal_moves
        .into_iter()
        .filter(|m| {
            m.get_dest() == dest
                && board.piece_on(m.get_source()) == Some(piece)
                && m.get_promotion() == promotion
        })
        .filter(|m| {
            let src = m.get_source();
            disambiguation.iter().all(|&b| match b {
                b'a'..=b'h' => src.get_file().to_index() == (b - b'a') as usize,
                b'1'..=b'8' => src.get_rank().to_index() == (b - b'1') as usize,
                _ => true,
            })
        })
        .collect();

    match candidates.len() {
        1 => Ok(candidates[0]),
        n => Err(n),
    }
}
