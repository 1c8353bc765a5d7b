use chess::{Board, BoardStatus, ChessMove, Color, File, MoveGen, Piece, Rank, Square};
use pgn_reader::{BufferedReader, RawHeader, SanPlus, Skip, Visitor};
use std::str::FromStr;

use crate::errors::{AnalysisError, Result};
use crate::invalid_game;

/// One half-move of the mainline
#[derive(Debug, Clone)]
pub struct PlyRecord {
    /// 1-based half-move index
    pub ply: usize,
    /// Full-move number the ply belongs to
    pub move_number: u32,
    pub side: Color,
    pub san: String,
    pub uci: String,
    pub fen_before: String,
    pub fen_after: String,
    pub board_before: Board,
    pub board_after: Board,
}

#[derive(Debug, Clone)]
pub struct ParsedGame {
    pub headers: Vec<(String, String)>,
    pub starting_fen: String,
    pub plies: Vec<PlyRecord>,
}

impl ParsedGame {
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// PGN visitor collecting the mainline as a list of boards
struct MainlineCollector {
    headers: Vec<(String, String)>,
    board: Board,
    starting_fen: String,
    move_number: u32,
    plies: Vec<PlyRecord>,
    error: Option<AnalysisError>,
}

impl MainlineCollector {
    fn new() -> Self {
        let board = Board::default();
        Self {
            headers: Vec::new(),
            starting_fen: board.to_string(),
            board,
            move_number: 1,
            plies: Vec::new(),
            error: None,
        }
    }
}

impl Visitor for MainlineCollector {
    type Result = ();

    fn begin_game(&mut self) {
        *self = Self::new();
    }

    fn header(&mut self, key: &[u8], value: RawHeader<'_>) {
        self.headers.push((
            String::from_utf8_lossy(key).into_owned(),
            value.decode_utf8_lossy().into_owned(),
        ));
    }

    fn end_headers(&mut self) -> Skip {
        let fen = self
            .headers
            .iter()
            .find(|(k, _)| k == "FEN")
            .map(|(_, v)| v.clone());

        if let Some(fen) = fen {
            match Board::from_str(&fen) {
                Ok(board) => {
                    self.board = board;
                    self.move_number = fullmove_number(&fen);
                    self.starting_fen = fen;
                }
                Err(e) => self.error = Some(invalid_game!("Bad FEN header '{}': {}", fen, e)),
            }
        }

        Skip(self.error.is_some())
    }

    fn san(&mut self, san_plus: SanPlus) {
        if self.error.is_some() {
            return;
        }

        let san = san_plus.to_string();
        let ply = self.plies.len() + 1;

        let chess_move = match resolve_san(&self.board, &san) {
            Some(chess_move) => chess_move,
            None => {
                self.error = Some(invalid_game!("Illegal move '{}' at ply {}", san, ply));
                return;
            }
        };

        let board_before = self.board;
        let board_after = board_before.make_move_new(chess_move);
        let side = board_before.side_to_move();

        self.plies.push(PlyRecord {
            ply,
            move_number: self.move_number,
            side,
            san,
            uci: uci_for_move(chess_move),
            fen_before: board_before.to_string(),
            fen_after: board_after.to_string(),
            board_before,
            board_after,
        });

        if side == Color::Black {
            self.move_number += 1;
        }
        self.board = board_after;
    }

    fn begin_variation(&mut self) -> Skip {
        Skip(true) // Mainline only
    }

    fn end_game(&mut self) -> Self::Result {}
}

/// Parse the first game of a PGN text into its mainline
pub fn parse_game(pgn: &str) -> Result<ParsedGame> {
    if pgn.trim().is_empty() {
        return Err(invalid_game!("Empty PGN"));
    }

    let mut collector = MainlineCollector::new();
    let mut reader = BufferedReader::new_cursor(pgn.as_bytes());

    match reader.read_game(&mut collector) {
        Ok(Some(())) => {}
        Ok(None) => return Err(invalid_game!("No game found in PGN")),
        Err(e) => return Err(invalid_game!("Unreadable PGN: {}", e)),
    }

    if let Some(error) = collector.error {
        return Err(error);
    }

    Ok(ParsedGame {
        headers: collector.headers,
        starting_fen: collector.starting_fen,
        plies: collector.plies,
    })
}

fn fullmove_number(fen: &str) -> u32 {
    fen.split_whitespace()
        .nth(5)
        .and_then(|n| n.parse().ok())
        .filter(|n| *n > 0)
        .unwrap_or(1)
}

/// Find the legal move a SAN string names.
///
/// Accepts check/annotation suffixes, `0-0` castling, promotions with or
/// without `=`, and over-disambiguated moves such as `Ng1f3`.
pub fn resolve_san(board: &Board, san: &str) -> Option<ChessMove> {
    let clean = san.trim_end_matches(|c: char| matches!(c, '+' | '#' | '!' | '?'));
    let legal_moves = MoveGen::new_legal(board);

    let castle = match clean {
        "O-O" | "0-0" => Some(true),
        "O-O-O" | "0-0-0" => Some(false),
        _ => None,
    };
    if let Some(kingside) = castle {
        return legal_moves.into_iter().find(|m| {
            board.piece_on(m.get_source()) == Some(Piece::King) && {
                let from = m.get_source().get_file().to_index() as i32;
                let to = m.get_dest().get_file().to_index() as i32;
                if kingside {
                    to - from == 2
                } else {
                    from - to == 2
                }
            }
        });
    }

    let (body, promotion) = split_promotion(clean);
    let mut chars: Vec<char> = body.chars().filter(|c| *c != 'x' && *c != '-').collect();

    let piece = match chars.first().copied().and_then(piece_from_letter) {
        Some(piece) => {
            chars.remove(0);
            piece
        }
        None => Piece::Pawn,
    };

    if chars.len() < 2 {
        return None;
    }
    let dest_rank = chars.pop().and_then(rank_from_char)?;
    let dest_file = chars.pop().and_then(file_from_char)?;
    let dest = Square::make_square(dest_rank, dest_file);

    let mut from_file = None;
    let mut from_rank = None;
    for c in chars {
        if let Some(file) = file_from_char(c) {
            from_file = Some(file);
        } else if let Some(rank) = rank_from_char(c) {
            from_rank = Some(rank);
        } else {
            return None;
        }
    }

    let mut candidates = legal_moves.into_iter().filter(|m| {
        m.get_dest() == dest
            && m.get_promotion() == promotion
            && board.piece_on(m.get_source()) == Some(piece)
            && from_file.map_or(true, |f| m.get_source().get_file() == f)
            && from_rank.map_or(true, |r| m.get_source().get_rank() == r)
    });

    let found = candidates.next()?;
    match candidates.next() {
        Some(_) => None, // ambiguous
        None => Some(found),
    }
}

fn split_promotion(san: &str) -> (&str, Option<Piece>) {
    if let Some((body, promo)) = san.split_once('=') {
        return (body, promo.chars().next().and_then(piece_from_letter));
    }
    // Pawn promotions written without '=' (e8Q)
    match (san.chars().next(), san.chars().last()) {
        (Some(first), Some(last)) if first.is_ascii_lowercase() && san.len() > 2 => {
            match piece_from_letter(last) {
                Some(piece) => (&san[..san.len() - 1], Some(piece)),
                None => (san, None),
            }
        }
        _ => (san, None),
    }
}

fn piece_from_letter(c: char) -> Option<Piece> {
    match c {
        'N' => Some(Piece::Knight),
        'B' => Some(Piece::Bishop),
        'R' => Some(Piece::Rook),
        'Q' => Some(Piece::Queen),
        'K' => Some(Piece::King),
        _ => None,
    }
}

fn piece_letter(piece: Piece) -> &'static str {
    match piece {
        Piece::Pawn => "",
        Piece::Knight => "N",
        Piece::Bishop => "B",
        Piece::Rook => "R",
        Piece::Queen => "Q",
        Piece::King => "K",
    }
}

fn file_from_char(c: char) -> Option<File> {
    ('a'..='h')
        .contains(&c)
        .then(|| File::from_index(c as usize - 'a' as usize))
}

fn rank_from_char(c: char) -> Option<Rank> {
    ('1'..='8')
        .contains(&c)
        .then(|| Rank::from_index(c as usize - '1' as usize))
}

fn file_char(file: File) -> char {
    (b'a' + file.to_index() as u8) as char
}

fn rank_char(rank: Rank) -> char {
    (b'1' + rank.to_index() as u8) as char
}

/// Long algebraic (UCI) notation: `e2e4`, `e7e8q`
pub fn uci_for_move(chess_move: ChessMove) -> String {
    let promotion = match chess_move.get_promotion() {
        Some(Piece::Queen) => "q",
        Some(Piece::Rook) => "r",
        Some(Piece::Bishop) => "b",
        Some(Piece::Knight) => "n",
        _ => "",
    };
    format!("{}{}{}", chess_move.get_source(), chess_move.get_dest(), promotion)
}

/// The legal move a UCI string names on `board`
pub fn move_from_uci(board: &Board, uci: &str) -> Option<ChessMove> {
    MoveGen::new_legal(board).find(|m| uci_for_move(*m) == uci)
}

/// Standard algebraic notation for a legal move, with check suffix
pub fn san_for_move(board: &Board, chess_move: ChessMove) -> String {
    let source = chess_move.get_source();
    let dest = chess_move.get_dest();
    let piece = board.piece_on(source).unwrap_or(Piece::Pawn);

    let from_file = source.get_file().to_index() as i32;
    let to_file = dest.get_file().to_index() as i32;

    let mut san = String::new();
    if piece == Piece::King && (to_file - from_file).abs() == 2 {
        san.push_str(if to_file > from_file { "O-O" } else { "O-O-O" });
    } else {
        let capture =
            board.piece_on(dest).is_some() || (piece == Piece::Pawn && from_file != to_file);

        san.push_str(piece_letter(piece));
        if piece == Piece::Pawn {
            if capture {
                san.push(file_char(source.get_file()));
            }
        } else {
            let rivals: Vec<Square> = MoveGen::new_legal(board)
                .filter(|m| {
                    m.get_dest() == dest
                        && m.get_source() != source
                        && board.piece_on(m.get_source()) == Some(piece)
                })
                .map(|m| m.get_source())
                .collect();

            if !rivals.is_empty() {
                if rivals.iter().all(|s| s.get_file() != source.get_file()) {
                    san.push(file_char(source.get_file()));
                } else if rivals.iter().all(|s| s.get_rank() != source.get_rank()) {
                    san.push(rank_char(source.get_rank()));
                } else {
                    san.push(file_char(source.get_file()));
                    san.push(rank_char(source.get_rank()));
                }
            }
        }

        if capture {
            san.push('x');
        }
        san.push_str(&dest.to_string());

        if let Some(promotion) = chess_move.get_promotion() {
            san.push('=');
            san.push_str(piece_letter(promotion));
        }
    }

    let after = board.make_move_new(chess_move);
    if after.status() == BoardStatus::Checkmate {
        san.push('#');
    } else if after.checkers().popcnt() > 0 {
        san.push('+');
    }
    san
}
