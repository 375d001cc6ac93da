pub mod game_flow;
pub mod progress;
pub mod test_ctx;

pub use game_flow::{select_images, GameFlow};
pub use progress::ProgressSink;
pub use test_ctx::TestCtx;
