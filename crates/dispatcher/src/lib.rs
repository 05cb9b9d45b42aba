//! # Dispatcher
//!
//! 报告分发模块。
//!
//! 负责：
//! - 消费 `AggregatedReport`
//! - Fan-out 到多个 sinks (Markdown / JSON / 摘要 / 日志)
//! - 隔离慢 sink，不阻塞其余输出
//! - 收集各 sink 生成的文件路径

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod sinks;
pub mod stats;

pub use contracts::{AggregatedReport, ReportSink};
pub use dispatcher::{
    create_dispatcher, dispatch_report, DispatchSummary, Dispatcher, DispatcherBuilder,
    DispatcherConfig,
};
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use sinks::{JsonSink, LogSink, MarkdownSink, SummarySink, DEFAULT_OUTPUT_DIR};
pub use stats::{SinkStats, SinkStatsSnapshot};
