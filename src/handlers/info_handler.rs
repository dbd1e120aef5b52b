// info_handler.rs
// GET /system/info：provider 的版本信息加上网关自己的版本
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::GatewayError;
use crate::scaling::service_query::ExternalServiceQuery;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub commit_message: String,
    #[serde(default)]
    pub sha: String,
    #[serde(default)]
    pub release: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    #[serde(rename = "provider")]
    pub name: String,
    pub version: VersionInfo,
    pub orchestration: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayInfo {
    pub provider: ProviderInfo,
    pub version: VersionInfo,
    pub arch: String,
}

pub fn gateway_version() -> VersionInfo {
    VersionInfo {
        commit_message: String::new(),
        sha: option_env!("GIT_SHA").unwrap_or("dev").to_string(),
        release: env!("CARGO_PKG_VERSION").to_string(),
    }
}

pub async fn gateway_info(provider: &ExternalServiceQuery) -> Result<GatewayInfo, GatewayError> {
    let raw = provider.provider_info().await.map_err(|e| {
        log::error!("Error fetching provider info: {}", e);
        GatewayError::BadGateway(format!("unable to fetch provider info: {}", e))
    })?;
    let provider: ProviderInfo = serde_json::from_value(raw).map_err(|e| {
        log::error!("Error unmarshalling provider info: {}", e);
        GatewayError::BadGateway(format!("unexpected provider info: {}", e))
    })?;

    Ok(GatewayInfo {
        provider,
        version: gateway_version(),
        arch: std::env::consts::ARCH.to_string(),
    })
}

pub async fn handle_info(provider: web::Data<Arc<ExternalServiceQuery>>) -> Result<HttpResponse, GatewayError> {
    let info = gateway_info(provider.get_ref()).await?;
    Ok(HttpResponse::Ok().json(info))
}
