use crate::board::{
    Direction, KnightDestOptions, Square, attacked_by_queen, get_knight_dests,
    get_square_increment, increment_while, increment_while_attacked,
};
use std::collections::VecDeque;

/// Shortest sequence of squares (inclusive of both endpoints) a knight can
/// take from `start` to `end` without ever standing on a square the queen
/// attacks or occupies. `None` if an endpoint is unsafe or no path exists.
///
/// Plain breadth-first search; neighbors are visited in the fixed
/// destination order, so among equal-length paths the same one is found
/// every time.
pub fn get_shortest_knight_path(
    start: Square,
    end: Square,
    queen_square: Square,
) -> Option<Vec<Square>> {
    if start == queen_square
        || end == queen_square
        || attacked_by_queen(start, queen_square)
        || attacked_by_queen(end, queen_square)
    {
        return None;
    }
    if start == end {
        return Some(vec![start]);
    }

    let options = KnightDestOptions {
        queen_square: Some(queen_square),
        exclude_attacked_squares: true,
    };
    // Parent pointers indexed by 0x88 square index; `Some` doubles as the
    // visited marker.
    let mut parents: [Option<Square>; 128] = [None; 128];
    let mut queue = VecDeque::new();
    queue.push_back(start);

    while let Some(current) = queue.pop_front() {
        for dest in get_knight_dests(current, options) {
            if dest == start || parents[dest.index() as usize].is_some() {
                continue;
            }
            parents[dest.index() as usize] = Some(current);
            if dest == end {
                // Walk the parent chain back to the start, whose parent
                // slot is the only `None` on the chain.
                let mut path = vec![dest];
                let mut node = current;
                path.push(node);
                while let Some(parent) = parents[node.index() as usize] {
                    node = parent;
                    path.push(node);
                }
                path.reverse();
                return Some(path);
            }
            queue.push_back(dest);
        }
    }

    None
}

/// Full solution path for the puzzle: shortest knight paths between each
/// consecutive pair of squares in the canonical visitation order, from a
/// safe version of `starting_square` down to a safe version of
/// `ending_square`, concatenated with junction squares deduplicated.
/// `None` if any leg is unreachable.
///
/// Used for validating that a start/end/queen configuration is solvable,
/// not by the interactive game loop.
pub fn get_puzzle_knight_path(
    starting_square: Square,
    ending_square: Square,
    queen_square: Square,
) -> Option<Vec<Square>> {
    let start = increment_while_attacked(starting_square, queen_square, Direction::PreviousFile);
    let end = increment_while(
        ending_square,
        |s| attacked_by_queen(s, queen_square) || s == queen_square || s == start,
        Direction::NextFile,
    );

    let mut path = vec![start];
    let mut current = start;
    while current != end {
        let next = increment_while_attacked(
            get_square_increment(current, Direction::PreviousFile),
            queen_square,
            Direction::PreviousFile,
        );
        let leg = get_shortest_knight_path(current, next, queen_square)?;
        path.extend(leg.into_iter().skip(1));
        current = next;
    }
    Some(path)
}
