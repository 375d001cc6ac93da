pub mod batch_job;
pub mod loaders;
pub mod report;
pub mod test_job;

pub use batch_job::{BatchCounts, BatchJob, BatchRequest, BatchStatus, BatchView, MAX_BATCH_URLS};
pub use loaders::{load_game_file, load_games};
pub use report::{LogEntry, RenderMode, Report, Score, Screenshot, ScreenshotRef, VideoSummary};
pub use test_job::{Phase, TestJob, TestJobView, TestRequest, TestStatus};
