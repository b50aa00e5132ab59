pub mod board;
pub mod game;
pub mod path;
pub mod session;
pub mod store;
pub mod web;

pub use board::*;
pub use game::*;
pub use path::*;
pub use session::*;
pub use store::*;
