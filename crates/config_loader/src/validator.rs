//! 配置校验模块
//!
//! 校验规则：
//! - 数值范围 (validator derive：temperature、max_tokens、max_attempts、multiplier)
//! - 退避时间 initial <= max
//! - stage 名称唯一且非空
//! - stage 数据契约：produces 唯一，requires 由种子或更早的 stage 提供
//! - sink 名称唯一且非空

use std::collections::HashSet;

use contracts::{ContractError, PipelineBlueprint, RetryPolicy, StageKind};
use validator::Validate;

/// 校验 PipelineBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    validate_ranges(blueprint)?;
    validate_timeouts(blueprint)?;
    validate_retry_policies(blueprint)?;
    validate_stage_names(blueprint)?;
    validate_stage_contracts(blueprint)?;
    validate_stage_chain(blueprint)?;
    validate_sinks(blueprint)?;
    Ok(())
}

/// 校验数值范围
fn validate_ranges(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    blueprint
        .model
        .validate()
        .map_err(|e| ContractError::config_validation("model", e.to_string()))?;
    blueprint
        .retry
        .validate()
        .map_err(|e| ContractError::config_validation("retry", e.to_string()))?;
    for stage in &blueprint.stages {
        if let Some(retry) = &stage.retry {
            retry.validate().map_err(|e| {
                ContractError::config_validation(
                    format!("stages[{}].retry", stage.name),
                    e.to_string(),
                )
            })?;
        }
    }
    Ok(())
}

/// 校验超时
fn validate_timeouts(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    if blueprint.stage_timeout_secs == 0 {
        return Err(ContractError::config_validation(
            "stage_timeout_secs",
            "stage_timeout_secs must be > 0",
        ));
    }
    for stage in &blueprint.stages {
        if stage.timeout_secs == Some(0) {
            return Err(ContractError::config_validation(
                format!("stages[{}].timeout_secs", stage.name),
                "timeout_secs must be > 0",
            ));
        }
    }
    Ok(())
}

fn check_backoff(field: String, policy: &RetryPolicy) -> Result<(), ContractError> {
    if policy.initial_backoff_ms > policy.max_backoff_ms {
        return Err(ContractError::config_validation(
            field,
            format!(
                "initial_backoff_ms ({}) must be <= max_backoff_ms ({})",
                policy.initial_backoff_ms, policy.max_backoff_ms
            ),
        ));
    }
    Ok(())
}

/// 校验退避区间
fn validate_retry_policies(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    check_backoff("retry".to_string(), &blueprint.retry)?;
    for stage in &blueprint.stages {
        if let Some(retry) = &stage.retry {
            check_backoff(format!("stages[{}].retry", stage.name), retry)?;
        }
    }
    Ok(())
}

/// 校验 stage 名称唯一性
fn validate_stage_names(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    if blueprint.stages.is_empty() {
        return Err(ContractError::config_validation(
            "stages",
            "pipeline must declare at least one stage",
        ));
    }
    let mut seen = HashSet::new();
    for (idx, stage) in blueprint.stages.iter().enumerate() {
        if stage.name.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("stages[{idx}].name"),
                "stage name cannot be empty",
            ));
        }
        if !seen.insert(stage.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("stages[name={}]", stage.name),
                "duplicate stage name",
            ));
        }
    }
    Ok(())
}

/// 校验单个 stage 的契约形状
fn validate_stage_contracts(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    for stage in &blueprint.stages {
        let field = format!("stages[{}]", stage.name);
        match stage.kind {
            StageKind::Prompt => {
                if stage.produces.as_deref().is_none_or(|p| p.trim().is_empty()) {
                    return Err(ContractError::config_validation(
                        format!("{field}.produces"),
                        "prompt stages must declare 'produces'",
                    ));
                }
                if stage.param_str("template").is_none_or(|t| t.trim().is_empty()) {
                    return Err(ContractError::config_validation(
                        format!("{field}.params.template"),
                        "prompt stages require a non-empty 'template' param",
                    ));
                }
            }
            kind => {
                if let Some(requires) = &stage.requires {
                    let expected = kind.default_requires().len();
                    if requires.len() != expected {
                        return Err(ContractError::config_validation(
                            format!("{field}.requires"),
                            format!(
                                "{kind:?} binds {expected} inputs positionally, got {}",
                                requires.len()
                            ),
                        ));
                    }
                }
                if stage.produces.as_deref().is_some_and(|p| p.trim().is_empty()) {
                    return Err(ContractError::config_validation(
                        format!("{field}.produces"),
                        "produces cannot be empty",
                    ));
                }
            }
        }
    }
    Ok(())
}

/// 校验 stage 数据链：每个 requires 都由种子或更早的 stage 产出
fn validate_stage_chain(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let seeds: HashSet<String> = blueprint.seed_keys().into_iter().collect();
    let mut available = seeds.clone();
    let mut produced = HashSet::new();

    for stage in &blueprint.stages {
        let descriptor = stage.descriptor();
        for key in &descriptor.requires {
            if !available.contains(key) {
                return Err(ContractError::config_validation(
                    format!("stages[{}].requires", stage.name),
                    format!("input '{key}' is not produced by a seed or an earlier stage"),
                ));
            }
        }
        if seeds.contains(&descriptor.produces) {
            return Err(ContractError::config_validation(
                format!("stages[{}].produces", stage.name),
                format!("'{}' shadows a seed key", descriptor.produces),
            ));
        }
        if !produced.insert(descriptor.produces.clone()) {
            return Err(ContractError::config_validation(
                format!("stages[{}].produces", stage.name),
                format!("'{}' is produced by more than one stage", descriptor.produces),
            ));
        }
        available.insert(descriptor.produces);
    }
    Ok(())
}

/// 校验 sink 配置
fn validate_sinks(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("sinks[{}].queue_capacity", sink.name),
                "queue_capacity must be > 0",
            ));
        }
    }
    Ok(())
}
