//! JSON batch files.

use crate::utils::file_stamp;
use chrono::Local;
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Serialize `batch` to `{output_dir}/{prefix}_{YYYYmmdd_HHMMSS}.json` and
/// return the path written.
#[instrument(level = "info", skip_all, fields(%output_dir, %prefix))]
pub async fn write_batch<T: Serialize>(
    batch: &T,
    output_dir: &str,
    prefix: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(batch)?;

    if let Err(e) = fs::create_dir_all(output_dir).await {
        error!(%output_dir, error = %e, "Failed to create output dir");
        return Err(e.into());
    }

    let path = Path::new(output_dir).join(format!("{}_{}.json", prefix, file_stamp(&Local::now())));
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote JSON batch");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CompanyBatch, CompanyBatchMetadata};

    #[tokio::test]
    async fn test_write_batch_pretty_prints_under_prefix() {
        let dir = std::env::temp_dir().join(format!("wns_json_{}", std::process::id()));
        let batch = CompanyBatch {
            metadata: CompanyBatchMetadata {
                timestamp: "2025-02-17T20:29:00+07:00".to_string(),
                total_companies: 0,
                location: "Kabupaten Bekasi, Jawa Barat".to_string(),
                data_sources: vec![],
            },
            companies: vec![],
        };

        let path = write_batch(&batch, dir.to_str().unwrap(), "companies")
            .await
            .unwrap();
        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("companies_"));
        assert!(name.ends_with(".json"));
        assert_eq!(name.len(), "companies_20250217_202900.json".len());

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\n  \"metadata\": {"));
        let parsed: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed["metadata"]["location"], "Kabupaten Bekasi, Jawa Barat");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
