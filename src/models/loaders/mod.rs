pub mod toml_loader;

pub use toml_loader::{load_game_file, load_games, GameEntry, GameList};
