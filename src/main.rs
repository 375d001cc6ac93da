use anyhow::Result;
use game_qa_runner::utils::logging;
use game_qa_runner::{api, App, Config};
use tracing::error;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::from_env();
    config.validate()?;
    let batch_file = config.batch_file.clone();
    let bind_addr = config.bind_addr.clone();

    // 初始化应用
    let app = App::initialize(config).await?;

    match batch_file {
        // 命令行批量模式：跑完即退出
        Some(path) => {
            let summary = app.run_batch_file(&path).await?;
            app.shutdown();
            if summary.failed > 0 {
                error!("❌ {} 个游戏测试失败", summary.failed);
                std::process::exit(1);
            }
        }
        None => api::serve(app, &bind_addr).await?,
    }

    Ok(())
}
