use knight_gauntlet::{
    CANDIDATE_QUEEN_SQUARES, ENDING_KNIGHT_SQUARE, STARTING_KNIGHT_SQUARE, get_puzzle_knight_path,
};

fn main() {
    println!("Knight Gauntlet - full solution path per queen placement\n");

    for queen in CANDIDATE_QUEEN_SQUARES {
        match get_puzzle_knight_path(
            STARTING_KNIGHT_SQUARE,
            ENDING_KNIGHT_SQUARE,
            queen.square(),
        ) {
            Some(path) => {
                let rendered: Vec<String> = path.iter().map(|s| s.to_string()).collect();
                println!("queen on {queen}: {} moves", path.len() - 1);
                println!("  {}\n", rendered.join(" "));
            }
            None => println!("queen on {queen}: no solution\n"),
        }
    }
}
