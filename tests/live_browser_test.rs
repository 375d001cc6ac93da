//! 需要本机 Chrome（以及 LLM 密钥）的测试，默认忽略：
//! cargo test --test live_browser_test -- --ignored

use std::sync::Arc;

use game_qa_runner::persistence::MemoryStore;
use game_qa_runner::services::{ChromeLauncher, SessionLauncher};
use game_qa_runner::utils::logging;
use game_qa_runner::{App, Collaborators, Config, TestRequest, TestStatus};

#[tokio::test]
#[ignore]
async fn test_chrome_session_captures_page() {
    logging::init();
    let config = Arc::new(Config::from_env());

    let launcher = ChromeLauncher::new(config);
    let session = launcher.open(true).await.expect("启动浏览器失败");
    session
        .navigate("https://example.com")
        .await
        .expect("打开页面失败");

    let shot = session
        .screen_capture()
        .capture("initial")
        .await
        .expect("截图失败");
    assert!(shot.png.starts_with(&[0x89, b'P', b'N', b'G']));

    let ui = session.ui_automation();
    ui.detect_render_mode().await.expect("渲染方式检测失败");
    session.close().await;
}

#[tokio::test]
#[ignore] // 需要 LLM_API_KEY
async fn test_full_run_against_live_game() {
    logging::init();
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(Config {
        artifacts_dir: dir.path().display().to_string(),
        gameplay_duration_secs: 5,
        database_path: None,
        ..Config::from_env()
    });

    let app = Arc::new(App::new(
        config.clone(),
        Collaborators::production(config),
        Arc::new(MemoryStore::new()),
    ));
    let url = std::env::var("LIVE_GAME_URL")
        .unwrap_or_else(|_| "https://play2048.co/".to_string());
    let id = app
        .submit_test(TestRequest::new(&url, Some(120), true).unwrap())
        .await
        .unwrap();

    let view = loop {
        let view = app.get_test(id).await.unwrap();
        if view.status.is_terminal() {
            break view;
        }
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    };
    assert_eq!(view.status, TestStatus::Completed, "error: {:?}", view.error);

    let report = app.get_report(id).await.unwrap();
    println!("score: {} ({})", report.score.playability, report.score.summary);
}
