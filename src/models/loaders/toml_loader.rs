//! 游戏列表加载（命令行批量模式）
//!
//! 文件格式：
//!
//! ```toml
//! max_duration = 60
//! headless = true
//!
//! [[games]]
//! url = "https://example.com/game"
//!
//! [[games]]
//! url = "https://example.com/other"
//! headless = false
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::fs;
use tracing::{info, warn};

use crate::error::{AppError, AppResult, ConfigError};
use crate::models::test_job::TestRequest;

/// 一个 TOML 文件中的游戏列表
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GameList {
    /// 文件级默认值
    pub max_duration: Option<u64>,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default)]
    pub games: Vec<GameEntry>,
}

/// 单个游戏条目，未填写的字段继承文件级默认值
#[derive(Debug, Clone, Deserialize)]
pub struct GameEntry {
    pub url: String,
    pub max_duration: Option<u64>,
    pub headless: Option<bool>,
}

fn default_headless() -> bool {
    true
}

impl GameList {
    /// 转换为测试请求，无效条目跳过并告警
    pub fn into_requests(self, source: &Path) -> Vec<TestRequest> {
        let mut requests = Vec::with_capacity(self.games.len());
        for (idx, game) in self.games.into_iter().enumerate() {
            let max_duration = game.max_duration.or(self.max_duration);
            let headless = game.headless.unwrap_or(self.headless);
            match TestRequest::new(&game.url, max_duration, headless) {
                Ok(request) => requests.push(request),
                Err(e) => warn!(
                    "⚠️ 跳过 {} 第 {} 个游戏 ({}): {}",
                    source.display(),
                    idx + 1,
                    game.url,
                    e
                ),
            }
        }
        requests
    }
}

/// 解析单个游戏列表文件
pub async fn load_game_file(path: &Path) -> AppResult<GameList> {
    let content = fs::read_to_string(path).await?;
    toml::from_str(&content).map_err(|source| {
        AppError::Config(ConfigError::BatchFileParseFailed {
            path: path.display().to_string(),
            source,
        })
    })
}

/// 加载文件或文件夹中所有 TOML 文件里的游戏
pub async fn load_games(path: &str) -> AppResult<Vec<TestRequest>> {
    let root = PathBuf::from(path);
    let metadata = fs::metadata(&root).await?;

    let files = if metadata.is_dir() {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file = entry.path();
            if file.extension().and_then(|s| s.to_str()) == Some("toml") {
                files.push(file);
            }
        }
        files.sort();
        files
    } else {
        vec![root]
    };

    let mut requests = Vec::new();
    for file in files {
        info!(
            "正在加载: {}",
            file.file_name().unwrap_or_default().to_string_lossy()
        );
        match load_game_file(&file).await {
            Ok(list) => {
                let loaded = list.into_requests(&file);
                info!("成功加载 {} 个游戏", loaded.len());
                requests.extend(loaded);
            }
            Err(e) => warn!("加载文件失败 {}: {}", file.display(), e),
        }
    }

    Ok(requests)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_inherit_file_defaults() {
        let list: GameList = toml::from_str(
            r#"
            max_duration = 45

            [[games]]
            url = "https://example.com/a"

            [[games]]
            url = "https://example.com/b"
            max_duration = 90
            headless = false

            [[games]]
            url = "mailto:someone@example.com"
            "#,
        )
        .unwrap();

        let requests = list.into_requests(Path::new("games.toml"));
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].max_duration, 45);
        assert!(requests[0].headless);
        assert_eq!(requests[1].max_duration, 90);
        assert!(!requests[1].headless);
    }

    #[tokio::test]
    async fn test_load_games_from_folder() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.toml"),
            "[[games]]\nurl = \"https://example.com/a\"\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("b.toml"),
            "[[games]]\nurl = \"https://example.com/b\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.toml"), "[[games]\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let requests = load_games(dir.path().to_str().unwrap()).await.unwrap();
        let urls: Vec<&str> = requests.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com/a", "https://example.com/b"]);
    }
}
