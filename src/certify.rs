use crate::calc::model::OverallResult;
use crate::config::EngineConfig;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// SHA-256 over the compact JSON encoding. Struct fields serialize in
/// declaration order and maps are ordered, so equal values hash equally.
pub fn digest_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Issuance record handed to the reporting side alongside a result. The
/// result itself stays free of clocks and random ids.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub certificate_id: String,
    pub student_id: String,
    pub issued_at: String,
    pub engine_version: &'static str,
    pub config_digest: String,
    pub result_digest: String,
}

pub fn issue(config: &EngineConfig, result: &OverallResult) -> Certificate {
    Certificate {
        certificate_id: Uuid::new_v4().to_string(),
        student_id: result.student_id.clone(),
        issued_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        engine_version: env!("CARGO_PKG_VERSION"),
        config_digest: config.digest().to_string(),
        result_digest: result.digest.clone(),
    }
}
