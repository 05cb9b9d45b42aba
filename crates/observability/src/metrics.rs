//! Pipeline 指标收集模块
//!
//! 记录阶段执行、模型调用与报告分发的运行指标，并在内存中聚合统计。

use std::collections::BTreeMap;

use contracts::{RunStatus, StageRecord, StageStatus};
use metrics::{counter, gauge, histogram};

/// 记录一次阶段尝试
///
/// `outcome`: success / retryable_error / error / timeout
pub fn record_stage_attempt(stage: &str, outcome: &str) {
    counter!(
        "aipipe_stage_attempts_total",
        "stage" => stage.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// 记录阶段重试
pub fn record_stage_retry(stage: &str, backoff_ms: u64) {
    counter!("aipipe_stage_retries_total", "stage" => stage.to_string()).increment(1);
    histogram!("aipipe_stage_backoff_ms", "stage" => stage.to_string()).record(backoff_ms as f64);
}

/// 记录阶段最终状态与耗时
pub fn record_stage_completed(record: &StageRecord) {
    counter!(
        "aipipe_stages_total",
        "stage" => record.name.clone(),
        "status" => record.status.to_string()
    )
    .increment(1);

    if record.status != StageStatus::Skipped {
        histogram!("aipipe_stage_latency_ms", "stage" => record.name.clone())
            .record(record.duration_ms as f64);
    }
}

/// 记录模型调用
pub fn record_model_call(provider: &str, outcome: &str, latency_ms: f64) {
    counter!(
        "aipipe_model_calls_total",
        "provider" => provider.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    histogram!("aipipe_model_latency_ms", "provider" => provider.to_string()).record(latency_ms);
}

/// 记录报告分发
pub fn record_report_dispatched(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "aipipe_reports_dispatched_total",
        "sink" => sink_name.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录整次运行
pub fn record_run_completed(pipeline: &str, status: Option<RunStatus>, duration_ms: u64) {
    let status = status.map_or("failed".to_string(), |s| s.to_string());
    counter!(
        "aipipe_runs_total",
        "pipeline" => pipeline.to_string(),
        "status" => status
    )
    .increment(1);
    gauge!("aipipe_last_run_duration_ms", "pipeline" => pipeline.to_string())
        .set(duration_ms as f64);
}

/// 运行指标聚合器
///
/// 在内存中聚合阶段记录，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct RunMetricsAggregator {
    /// 运行次数
    pub total_runs: u64,

    /// 各阶段统计
    pub stages: BTreeMap<String, StageStats>,
}

/// 单个阶段的累计统计
#[derive(Debug, Clone, Default)]
pub struct StageStats {
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub retries: u64,
    pub model_calls: u64,
    pub latency_ms: RunningStats,
}

impl RunMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, records: &[StageRecord]) {
        self.total_runs += 1;
        for record in records {
            let stats = self.stages.entry(record.name.clone()).or_default();
            match record.status {
                StageStatus::Succeeded => stats.succeeded += 1,
                StageStatus::Failed => stats.failed += 1,
                StageStatus::Skipped => {
                    stats.skipped += 1;
                    continue;
                }
            }
            stats.retries += u64::from(record.attempts.saturating_sub(1));
            stats.model_calls += u64::from(record.model_calls);
            stats.latency_ms.push(record.duration_ms as f64);
        }
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let total_retries = self.stages.values().map(|s| s.retries).sum();
        let total_model_calls = self.stages.values().map(|s| s.model_calls).sum();
        MetricsSummary {
            total_runs: self.total_runs,
            total_retries,
            total_model_calls,
            stage_latency_ms: self
                .stages
                .iter()
                .map(|(name, s)| (name.clone(), StatsSummary::from(&s.latency_ms)))
                .collect(),
            stage_failures: self
                .stages
                .iter()
                .filter(|(_, s)| s.failed > 0)
                .map(|(name, s)| (name.clone(), s.failed))
                .collect(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_runs: u64,
    pub total_retries: u64,
    pub total_model_calls: u64,
    pub stage_latency_ms: BTreeMap<String, StatsSummary>,
    pub stage_failures: BTreeMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Pipeline Metrics Summary ===")?;
        writeln!(f, "Runs: {}", self.total_runs)?;
        writeln!(f, "Retries: {}", self.total_retries)?;
        writeln!(f, "Model calls: {}", self.total_model_calls)?;
        writeln!(f, "Stage latency (ms):")?;
        for (stage, stats) in &self.stage_latency_ms {
            writeln!(f, "  {}: {}", stage, stats)?;
        }

        if !self.stage_failures.is_empty() {
            writeln!(f, "Stage failures:")?;
            for (stage, count) in &self.stage_failures {
                writeln!(f, "  {}: {}", stage, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// 最小值
    pub fn min(&self) -> f64 {
        self.min
    }

    /// 最大值
    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, status: StageStatus, attempts: u32, duration_ms: u64) -> StageRecord {
        StageRecord {
            name: name.to_string(),
            status,
            attempts,
            duration_ms,
            model_calls: attempts,
            error: None,
            notes: Vec::new(),
        }
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = RunMetricsAggregator::new();
        aggregator.update(&[
            record("analyze", StageStatus::Succeeded, 3, 120),
            record("validate", StageStatus::Failed, 1, 5),
            StageRecord::skipped("report", "missing input"),
        ]);

        assert_eq!(aggregator.total_runs, 1);
        let analyze = &aggregator.stages["analyze"];
        assert_eq!(analyze.succeeded, 1);
        assert_eq!(analyze.retries, 2);
        assert_eq!(analyze.model_calls, 3);
        assert_eq!(aggregator.stages["report"].skipped, 1);
        assert_eq!(aggregator.stages["report"].latency_ms.count(), 0);

        let summary = aggregator.summary();
        assert_eq!(summary.total_retries, 2);
        assert_eq!(summary.stage_failures.get("validate"), Some(&1));
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = RunMetricsAggregator::new();
        aggregator.update(&[record("analyze", StageStatus::Succeeded, 1, 40)]);
        let output = format!("{}", aggregator.summary());
        assert!(output.contains("Runs: 1"));
        assert!(output.contains("analyze: min=40.0"), "got: {output}");
    }
}
