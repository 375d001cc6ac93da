//! 批量测试任务

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppResult, ValidationError};
use crate::models::test_job::{TestJobView, TestRequest, TestStatus};

/// 单个批次最多包含的 URL 数量
pub const MAX_BATCH_URLS: usize = 10;

/// 批量提交请求
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub urls: Vec<String>,
    pub max_duration: Option<u64>,
    pub headless: bool,
}

impl BatchRequest {
    /// 校验批次并展开为单个测试请求
    pub fn into_test_requests(self) -> AppResult<Vec<TestRequest>> {
        if self.urls.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }
        if self.urls.len() > MAX_BATCH_URLS {
            return Err(ValidationError::TooManyUrls {
                count: self.urls.len(),
                max: MAX_BATCH_URLS,
            }
            .into());
        }
        if let Some(index) = self.urls.iter().position(|u| u.trim().is_empty()) {
            return Err(ValidationError::EmptyBatchUrl { index }.into());
        }
        self.urls
            .iter()
            .map(|url| TestRequest::new(url, self.max_duration, self.headless))
            .collect()
    }
}

/// 批次状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Running,
    Completed,
    CompletedWithFailures,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BatchStatus::Running)
    }
}

/// 批次汇总计数，`running` 包含仍在等待槽位的任务
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchCounts {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub running: usize,
}

impl BatchCounts {
    /// 所有子任务都尚未结束
    pub fn all_running(total: usize) -> Self {
        Self {
            total,
            running: total,
            ..Self::default()
        }
    }

    /// 根据子任务状态汇总；找不到的子任务按失败计，避免批次永远无法结束
    pub fn tally(statuses: impl IntoIterator<Item = Option<TestStatus>>) -> Self {
        let mut counts = Self::default();
        for status in statuses {
            counts.total += 1;
            match status {
                Some(TestStatus::Completed) => counts.completed += 1,
                Some(TestStatus::Failed) | None => counts.failed += 1,
                Some(TestStatus::Pending) | Some(TestStatus::Running) => counts.running += 1,
            }
        }
        counts
    }

    pub fn is_settled(&self) -> bool {
        self.running == 0
    }

    /// 汇总对应的批次状态
    pub fn status(&self) -> BatchStatus {
        if !self.is_settled() {
            BatchStatus::Running
        } else if self.failed > 0 {
            BatchStatus::CompletedWithFailures
        } else {
            BatchStatus::Completed
        }
    }
}

/// 批次记录
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub id: Uuid,
    pub test_ids: Vec<Uuid>,
    pub status: BatchStatus,
    pub counts: BatchCounts,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BatchJob {
    pub fn new(id: Uuid, test_ids: Vec<Uuid>) -> Self {
        let now = Utc::now();
        let counts = BatchCounts::all_running(test_ids.len());
        Self {
            id,
            test_ids,
            status: BatchStatus::Running,
            counts,
            created_at: now,
            updated_at: now,
        }
    }

    /// 写入监控任务的最新汇总；终态之后不再变化，计数未变时不刷新时间戳
    pub fn apply_counts(&mut self, counts: BatchCounts) -> BatchStatus {
        if !self.status.is_terminal() && counts != self.counts {
            self.counts = counts;
            self.status = counts.status();
            self.updated_at = Utc::now();
        }
        self.status
    }

    pub fn view(&self, tests: Vec<TestJobView>) -> BatchView {
        BatchView {
            batch_id: self.id,
            status: self.status,
            tests,
            total_tests: self.counts.total,
            completed_tests: self.counts.completed,
            failed_tests: self.counts.failed,
            running_tests: self.counts.running,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// 批次查询视图
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchView {
    pub batch_id: Uuid,
    pub status: BatchStatus,
    pub tests: Vec<TestJobView>,
    pub total_tests: usize,
    pub completed_tests: usize,
    pub failed_tests: usize,
    pub running_tests: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    fn batch(urls: &[&str]) -> BatchRequest {
        BatchRequest {
            urls: urls.iter().map(|u| u.to_string()).collect(),
            max_duration: Some(30),
            headless: true,
        }
    }

    #[test]
    fn test_batch_validation() {
        assert!(matches!(
            batch(&[]).into_test_requests(),
            Err(AppError::Validation(ValidationError::EmptyBatch))
        ));
        let eleven: Vec<&str> = vec!["https://example.com/g"; 11];
        assert!(matches!(
            batch(&eleven).into_test_requests(),
            Err(AppError::Validation(ValidationError::TooManyUrls { count: 11, .. }))
        ));
        assert!(matches!(
            batch(&["https://example.com/a", " "]).into_test_requests(),
            Err(AppError::Validation(ValidationError::EmptyBatchUrl { index: 1 }))
        ));

        let requests = batch(&["https://example.com/a", "https://example.com/b"])
            .into_test_requests()
            .unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.max_duration == 30 && r.headless));
    }

    #[test]
    fn test_tally_sums_to_total() {
        use TestStatus::*;
        let counts = BatchCounts::tally(vec![
            Some(Pending),
            Some(Running),
            Some(Completed),
            Some(Failed),
            None,
        ]);
        assert_eq!(counts.total, 5);
        assert_eq!(counts.completed + counts.failed + counts.running, counts.total);
        assert_eq!(counts.running, 2);
        assert_eq!(counts.failed, 2);
        assert_eq!(counts.status(), BatchStatus::Running);
    }

    #[test]
    fn test_settled_status() {
        use TestStatus::*;
        let clean = BatchCounts::tally(vec![Some(Completed), Some(Completed)]);
        assert_eq!(clean.status(), BatchStatus::Completed);
        let mixed = BatchCounts::tally(vec![Some(Completed), Some(Failed), Some(Completed)]);
        assert_eq!(mixed.status(), BatchStatus::CompletedWithFailures);
        assert_eq!(mixed.failed, 1);
        assert_eq!(mixed.completed, 2);
    }

    #[test]
    fn test_terminal_batch_ignores_later_counts() {
        let mut job = BatchJob::new(Uuid::new_v4(), vec![Uuid::new_v4()]);
        let done = BatchCounts::tally(vec![Some(TestStatus::Completed)]);
        assert_eq!(job.apply_counts(done), BatchStatus::Completed);
        let regressed = BatchCounts::all_running(1);
        assert_eq!(job.apply_counts(regressed), BatchStatus::Completed);
        assert_eq!(job.counts, done);
    }
}
