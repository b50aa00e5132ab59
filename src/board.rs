use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A square on the 8x8 board, stored as its 0x88 index.
///
/// Files map to the low nibble and ranks to bits 4-6 (a8 = 0, h1 = 119),
/// so boundary checks and piece-offset arithmetic reduce to masking with
/// 0x88. See https://www.chessprogramming.org/0x88 for details.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Square(u8);

/// Default square the knight starts the puzzle on.
pub const STARTING_KNIGHT_SQUARE: Square = Square(0x07); // h8

/// Default square the knight must finish on.
pub const ENDING_KNIGHT_SQUARE: Square = Square(0x70); // a1

/// 0x88 offsets for the (at most 8) knight moves.
const KNIGHT_OFFSETS: [i16; 8] = [-31, -14, 18, 33, 31, 14, -18, -33];

/// 0x88 offsets for the queen's eight ray directions.
const QUEEN_OFFSETS: [i16; 8] = [-17, -16, -15, 1, 17, 16, 15, -1];

/// Lookup over the normalized 0x88 index difference (`to - from + 0x77`,
/// range 0..=238) telling whether a queen on `from` attacks `to`. Built at
/// compile time from the ray offsets; the difference of two valid square
/// indices uniquely determines their geometric relation.
const QUEEN_ATTACKS: [bool; 239] = build_queen_attack_table();

const fn build_queen_attack_table() -> [bool; 239] {
    let mut table = [false; 239];
    let mut dir = 0;
    while dir < 8 {
        let mut steps = 1i16;
        while steps < 8 {
            table[(0x77 + QUEEN_OFFSETS[dir] * steps) as usize] = true;
            steps += 1;
        }
        dir += 1;
    }
    table
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SquareParseError {
    #[error("not a board square: {0}")]
    NotASquare(String),
    #[error("not a supported queen square: {0}")]
    NotAQueenSquare(String),
}

impl Square {
    /// Builds a square from a raw 0x88 index, rejecting off-board values.
    pub fn from_index(index: u8) -> Option<Square> {
        if index & 0x88 == 0 {
            Some(Square(index))
        } else {
            None
        }
    }

    /// The square's 0x88 index.
    pub fn index(self) -> u8 {
        self.0
    }

    /// File as 0..=7 (a..=h).
    pub fn file(self) -> u8 {
        self.0 & 0x0F
    }

    /// Rank as 1..=8.
    pub fn rank(self) -> u8 {
        8 - (self.0 >> 4)
    }

    /// All 64 squares in index order (a8 first, h1 last).
    pub fn all() -> impl Iterator<Item = Square> {
        (0u8..128).filter_map(Square::from_index)
    }

    /// The square at a 0x88 offset from this one, if it is on the board.
    pub fn offset(self, delta: i16) -> Option<Square> {
        let index = self.0 as i16 + delta;
        if (0..128).contains(&index) {
            Square::from_index(index as u8)
        } else {
            None
        }
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            (b'a' + self.file()) as char,
            (b'0' + self.rank()) as char
        )
    }
}

impl fmt::Debug for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl FromStr for Square {
    type Err = SquareParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() == 2
            && (b'a'..=b'h').contains(&bytes[0])
            && (b'1'..=b'8').contains(&bytes[1])
        {
            let file = bytes[0] - b'a';
            let row = b'8' - bytes[1];
            Ok(Square((row << 4) | file))
        } else {
            Err(SquareParseError::NotASquare(s.to_string()))
        }
    }
}

impl Serialize for Square {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Square {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// A queen square restricted to the candidate set known to yield a
/// solvable puzzle.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueenSquare(Square);

/// The six queen squares the puzzle supports.
pub const CANDIDATE_QUEEN_SQUARES: [QueenSquare; 6] = [
    QueenSquare(Square(0x33)), // d5
    QueenSquare(Square(0x43)), // d4
    QueenSquare(Square(0x63)), // d2
    QueenSquare(Square(0x34)), // e5
    QueenSquare(Square(0x44)), // e4
    QueenSquare(Square(0x64)), // e2
];

/// Queen square used when no explicit choice has been made.
pub const DEFAULT_QUEEN_SQUARE: QueenSquare = CANDIDATE_QUEEN_SQUARES[0];

impl QueenSquare {
    /// Wraps a square if it belongs to the candidate set.
    pub fn new(square: Square) -> Option<QueenSquare> {
        CANDIDATE_QUEEN_SQUARES
            .iter()
            .copied()
            .find(|q| q.0 == square)
    }

    /// The underlying board square.
    pub fn square(self) -> Square {
        self.0
    }
}

impl fmt::Display for QueenSquare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for QueenSquare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueenSquare {
    type Err = SquareParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let square: Square = s.parse()?;
        QueenSquare::new(square).ok_or_else(|| SquareParseError::NotAQueenSquare(s.to_string()))
    }
}

impl Serialize for QueenSquare {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for QueenSquare {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// True if a queen on `queen_square` attacks `square`. A queen never
/// attacks her own square.
pub fn attacked_by_queen(square: Square, queen_square: Square) -> bool {
    QUEEN_ATTACKS[(square.0 as i16 - queen_square.0 as i16 + 0x77) as usize]
}

/// Options for [`get_knight_dests`].
#[derive(Clone, Copy, Default)]
pub struct KnightDestOptions {
    /// Square the queen is on; excluded from destinations outright.
    pub queen_square: Option<Square>,
    /// Also exclude any destination the queen attacks. Only meaningful
    /// when `queen_square` is set.
    pub exclude_attacked_squares: bool,
}

/// Squares reachable by a single knight move, in the fixed offset-table
/// order (deterministic, so path search ties break the same way every
/// run).
pub fn get_knight_dests(from: Square, options: KnightDestOptions) -> Vec<Square> {
    KNIGHT_OFFSETS
        .iter()
        .filter_map(|&offset| from.offset(offset))
        .filter(|&dest| match options.queen_square {
            Some(queen) => {
                dest != queen
                    && (!options.exclude_attacked_squares || !attacked_by_queen(dest, queen))
            }
            None => true,
        })
        .collect()
}

/// Direction of travel along the canonical linear traversal of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Toward the previous file (h8, g8, ..., a8, h7, ..., a1, wrap).
    PreviousFile,
    /// Toward the next file (a1, b1, ..., h1, a2, ..., h8, wrap).
    NextFile,
}

/// Steps one square left/right within a rank. At a rank boundary the
/// traversal wraps to the adjacent rank, and at the board corners (a1
/// going previous, h8 going next) it cycles to the opposite corner.
pub fn get_square_increment(square: Square, direction: Direction) -> Square {
    let step: i16 = match direction {
        Direction::PreviousFile => -1,
        Direction::NextFile => 1,
    };
    let mut index = square.0 as i16 + step;
    if index < 0 || index & 0x88 != 0 {
        // Off the end of the rank: jump to the far end of the next one.
        index += match direction {
            Direction::PreviousFile => 24,
            Direction::NextFile => -24,
        };
        if index < 0 || index & 0x88 != 0 {
            return match direction {
                Direction::PreviousFile => Square(0x07), // h8
                Direction::NextFile => Square(0x70),     // a1
            };
        }
    }
    Square(index as u8)
}

/// Walks the canonical traversal until `predicate` stops holding.
///
/// The caller must guarantee the predicate eventually fails somewhere on
/// the (cyclic) traversal; the queen-attack predicates do, since a queen
/// attacks at most 27 of the 64 squares.
pub fn increment_while(
    square: Square,
    predicate: impl Fn(Square) -> bool,
    direction: Direction,
) -> Square {
    let mut current = square;
    while predicate(current) {
        current = get_square_increment(current, direction);
    }
    current
}

/// First square at or after `square` (in `direction`) that the queen
/// neither attacks nor occupies.
pub fn increment_while_attacked(
    square: Square,
    queen_square: Square,
    direction: Direction,
) -> Square {
    increment_while(
        square,
        |s| attacked_by_queen(s, queen_square) || s == queen_square,
        direction,
    )
}

/// FEN encoding of the knight + queen placement, for board rendering.
/// Returns `None` if both pieces share a square.
pub fn get_puzzle_fen(knight_square: Square, queen_square: Option<Square>) -> Option<String> {
    if Some(knight_square) == queen_square {
        return None;
    }

    let mut fen = String::new();
    for row in 0..8u8 {
        if row > 0 {
            fen.push('/');
        }
        let mut empty = 0;
        for file in 0..8u8 {
            let square = Square((row << 4) | file);
            let piece = if square == knight_square {
                Some('N') // white knight
            } else if Some(square) == queen_square {
                Some('q') // black queen
            } else {
                None
            };
            match piece {
                Some(c) => {
                    if empty > 0 {
                        fen.push((b'0' + empty) as char);
                        empty = 0;
                    }
                    fen.push(c);
                }
                None => empty += 1,
            }
        }
        if empty > 0 {
            fen.push((b'0' + empty) as char);
        }
    }
    fen.push_str(" w - - 0 1");
    Some(fen)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(name: &str) -> Square {
        name.parse().unwrap()
    }

    fn to_rank_file(square: Square) -> (i16, i16) {
        (square.rank() as i16, square.file() as i16 + 1)
    }

    fn from_rank_file(rank: i16, file: i16) -> Option<Square> {
        if (1..=8).contains(&rank) && (1..=8).contains(&file) {
            format!(
                "{}{}",
                (b'a' + (file - 1) as u8) as char,
                (b'0' + rank as u8) as char
            )
            .parse()
            .ok()
        } else {
            None
        }
    }

    #[test]
    fn test_parse_accepts_exactly_the_64_squares() {
        for file in b'a'..=b'h' {
            for rank in b'1'..=b'8' {
                let name = format!("{}{}", file as char, rank as char);
                let square: Square = name.parse().unwrap();
                assert_eq!(square.to_string(), name);
            }
        }
        for bad in ["", "e", "i4", "a9", "a0", "e44", "4e", "D5"] {
            assert!(bad.parse::<Square>().is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn test_index_round_trips_for_all_squares() {
        assert_eq!(Square::all().count(), 64);
        for square in Square::all() {
            assert_eq!(Square::from_index(square.index()), Some(square));
        }
        assert_eq!(Square::from_index(0x08), None);
        assert_eq!(Square::from_index(0x80), None);
        assert_eq!(sq("a8").index(), 0);
        assert_eq!(sq("h1").index(), 119);
    }

    #[test]
    fn test_squares_are_ordered_by_index() {
        assert!(sq("a8") < sq("h8"));
        assert!(sq("h8") < sq("a7"));
        assert!(sq("a2") < sq("h1"));
    }

    #[test]
    fn test_attacked_by_queen_matches_rank_file_diagonal_rule() {
        for square in Square::all() {
            for queen in Square::all() {
                let (rank, file) = to_rank_file(square);
                let (queen_rank, queen_file) = to_rank_file(queen);
                let expected = square != queen
                    && (rank == queen_rank
                        || file == queen_file
                        || (rank - queen_rank).abs() == (file - queen_file).abs());
                assert_eq!(
                    attacked_by_queen(square, queen),
                    expected,
                    "queen {queen} vs {square}"
                );
            }
        }
    }

    #[test]
    fn test_knight_dests_match_offset_rule() {
        let offsets = [
            (-2, -1),
            (-2, 1),
            (-1, 2),
            (1, 2),
            (2, 1),
            (2, -1),
            (1, -2),
            (-1, -2),
        ];
        for square in Square::all() {
            let (rank, file) = to_rank_file(square);
            let mut expected: Vec<Square> = offsets
                .iter()
                .filter_map(|&(dr, df)| from_rank_file(rank + dr, file + df))
                .collect();
            expected.sort();
            let mut dests = get_knight_dests(square, KnightDestOptions::default());
            dests.sort();
            assert_eq!(dests, expected, "from {square}");
        }
    }

    #[test]
    fn test_knight_dests_exclude_queen_and_attacked_squares() {
        let queen = sq("e5");
        // g4's plain destinations include e5 itself and several squares
        // the e5 queen covers.
        let dests = get_knight_dests(
            sq("g4"),
            KnightDestOptions {
                queen_square: Some(queen),
                exclude_attacked_squares: false,
            },
        );
        assert!(!dests.contains(&queen));
        assert!(dests.contains(&sq("f2"))); // attacked, but only queen excluded

        let safe_dests = get_knight_dests(
            sq("g4"),
            KnightDestOptions {
                queen_square: Some(queen),
                exclude_attacked_squares: true,
            },
        );
        for dest in &safe_dests {
            assert!(!attacked_by_queen(*dest, queen));
            assert_ne!(*dest, queen);
        }
        assert!(!safe_dests.contains(&sq("f2"))); // e5-f2 is a diagonal
    }

    #[test]
    fn test_square_increment_round_trips() {
        for square in Square::all() {
            let next = get_square_increment(square, Direction::NextFile);
            assert_eq!(
                get_square_increment(next, Direction::PreviousFile),
                square,
                "next/previous from {square}"
            );
            let previous = get_square_increment(square, Direction::PreviousFile);
            assert_eq!(
                get_square_increment(previous, Direction::NextFile),
                square,
                "previous/next from {square}"
            );
        }
    }

    #[test]
    fn test_square_increment_wraps_ranks_and_corners() {
        assert_eq!(get_square_increment(sq("h8"), Direction::PreviousFile), sq("g8"));
        assert_eq!(get_square_increment(sq("a8"), Direction::PreviousFile), sq("h7"));
        assert_eq!(get_square_increment(sq("a1"), Direction::PreviousFile), sq("h8"));
        assert_eq!(get_square_increment(sq("h1"), Direction::NextFile), sq("a2"));
        assert_eq!(get_square_increment(sq("a2"), Direction::NextFile), sq("b2"));
        assert_eq!(get_square_increment(sq("h8"), Direction::NextFile), sq("a1"));
    }

    #[test]
    fn test_increment_while_attacked_finds_safe_squares() {
        assert_eq!(
            increment_while_attacked(sq("f7"), sq("c4"), Direction::PreviousFile),
            sq("e7")
        );
        assert_eq!(
            increment_while_attacked(sq("e6"), sq("d5"), Direction::PreviousFile),
            sq("b6")
        );
        assert_eq!(
            increment_while_attacked(sq("c7"), sq("e4"), Direction::PreviousFile),
            sq("c7")
        );
        assert_eq!(
            increment_while_attacked(sq("b4"), sq("d2"), Direction::NextFile),
            sq("c4")
        );
        assert_eq!(
            increment_while_attacked(sq("d5"), sq("e4"), Direction::NextFile),
            sq("g5")
        );
        assert_eq!(
            increment_while_attacked(sq("e8"), sq("d4"), Direction::NextFile),
            sq("e8")
        );
    }

    #[test]
    fn test_increment_while_attacked_never_returns_attacked_square() {
        for square in Square::all() {
            for queen in Square::all() {
                for direction in [Direction::PreviousFile, Direction::NextFile] {
                    let found = increment_while_attacked(square, queen, direction);
                    assert!(!attacked_by_queen(found, queen));
                    assert_ne!(found, queen);
                }
            }
        }
    }

    #[test]
    fn test_queen_square_guard() {
        for name in ["d5", "d4", "d2", "e5", "e4", "e2"] {
            assert!(name.parse::<QueenSquare>().is_ok());
        }
        assert!("a5".parse::<QueenSquare>().is_err());
        assert!("d6".parse::<QueenSquare>().is_err());
        assert_eq!(QueenSquare::new(sq("a1")), None);
        assert_eq!(DEFAULT_QUEEN_SQUARE.square(), sq("d5"));
    }

    #[test]
    fn test_square_serde_rejects_corrupt_values() {
        let square: Square = serde_json::from_str("\"e4\"").unwrap();
        assert_eq!(square, sq("e4"));
        assert_eq!(serde_json::to_string(&square).unwrap(), "\"e4\"");
        assert!(serde_json::from_str::<Square>("\"z9\"").is_err());
        assert!(serde_json::from_str::<Square>("42").is_err());
        assert!(serde_json::from_str::<QueenSquare>("\"a8\"").is_err());
    }

    #[test]
    fn test_puzzle_fen() {
        assert_eq!(
            get_puzzle_fen(sq("h8"), Some(sq("d5"))).unwrap(),
            "7N/8/8/3q4/8/8/8/8 w - - 0 1"
        );
        assert_eq!(
            get_puzzle_fen(sq("a1"), None).unwrap(),
            "8/8/8/8/8/8/8/N7 w - - 0 1"
        );
        assert_eq!(get_puzzle_fen(sq("d5"), Some(sq("d5"))), None);
    }
}
