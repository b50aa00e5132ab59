use knight_gauntlet::web::run_server;

#[tokio::main]
async fn main() {
    println!("Knight Gauntlet - Queen vs Knight Endurance Puzzle");
    println!("==================================================\n");

    // Optional first argument overrides where scores and the in-progress
    // session are stored.
    let store_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "knight-gauntlet.json".to_string());
    println!("Using store file: {store_path}");

    if let Err(err) = run_server(&store_path).await {
        eprintln!("server error: {err}");
        std::process::exit(1);
    }
}
