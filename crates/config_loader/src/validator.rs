//! 配置校验模块
//!
//! 校验规则：
//! - 字段级约束 (`validator` derive)：名称非空、pool 数值范围
//! - 至少一个 attribute，attribute 名称唯一
//! - 至少一个 transport，transport 名称唯一
//! - min_workers <= max_workers 等跨字段约束

use std::collections::HashSet;

use ::validator::Validate;
use contracts::{ContractError, OutputBlueprint};

/// 校验 OutputBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &OutputBlueprint) -> Result<(), ContractError> {
    validate_fields(blueprint)?;
    validate_attributes(blueprint)?;
    validate_transport_names(blueprint)?;
    validate_pools(blueprint)?;
    Ok(())
}

/// 字段级校验
fn validate_fields(blueprint: &OutputBlueprint) -> Result<(), ContractError> {
    blueprint
        .validate()
        .map_err(|e| ContractError::configuration("blueprint", e.to_string()))
}

/// 校验 attribute 列表
fn validate_attributes(blueprint: &OutputBlueprint) -> Result<(), ContractError> {
    let stream = &blueprint.stream;
    if stream.attributes.is_empty() {
        return Err(ContractError::configuration(
            "stream.attributes",
            format!("stream '{}' must declare at least one attribute", stream.id),
        ));
    }

    let mut seen = HashSet::new();
    for attribute in &stream.attributes {
        if !seen.insert(attribute.name.as_str()) {
            return Err(ContractError::configuration(
                format!("stream.attributes[name={}]", attribute.name),
                "duplicate attribute name",
            ));
        }
    }
    Ok(())
}

/// 校验 transport 名称唯一性
fn validate_transport_names(blueprint: &OutputBlueprint) -> Result<(), ContractError> {
    if blueprint.transports.is_empty() {
        return Err(ContractError::configuration(
            "transports",
            "at least one transport is required",
        ));
    }

    let mut seen = HashSet::new();
    for transport in &blueprint.transports {
        if !seen.insert(transport.name.as_str()) {
            return Err(ContractError::configuration(
                format!("transports[name={}]", transport.name),
                "duplicate transport name",
            ));
        }
    }
    Ok(())
}

/// 校验 pool 配置
fn validate_pools(blueprint: &OutputBlueprint) -> Result<(), ContractError> {
    for transport in &blueprint.transports {
        transport.pool.check().map_err(|e| match e {
            ContractError::Configuration { field, message } => {
                ContractError::configuration(format!("transports[{}].{}", transport.name, field), message)
            }
            other => other,
        })?;
    }
    Ok(())
}
