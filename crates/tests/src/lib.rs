//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 财报分析管道 e2e（Mock 模型，无需 API key）
//! - 校友内推管道 e2e
//! - 重试、超时、失败策略贯穿整个栈
//! - 配置文件驱动的通用管道

#[cfg(test)]
mod support;

#[cfg(test)]
mod financial_e2e;

#[cfg(test)]
mod referral_e2e;

#[cfg(test)]
mod orchestration_e2e;
