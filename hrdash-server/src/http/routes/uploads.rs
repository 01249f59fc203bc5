//! Spreadsheet upload endpoint
//!
//! The request body is the raw file. Options travel in the query string:
//! `POST /uploads/employees?format=xlsx&mode=upsert&on_malformed=skip&sheet=Q3`

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{routing::post, Json, Router};
use hrdash_core::dataset::Ident;
use hrdash_core::{
    Action, FileFormat, HrError, IngestOptions, IngestReport, Ingestor, MalformedPolicy, Outcome,
    WriteMode,
};
use serde::Deserialize;

use crate::http::error::ApiError;
use crate::http::server::AppState;

/// Zip container magic (xlsx, xlsm, ods)
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
/// OLE2 compound document magic (legacy xls)
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];

#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    pub format: Option<String>,
    pub mode: Option<String>,
    pub on_malformed: Option<String>,
    pub sheet: Option<String>,
}

impl UploadParams {
    /// Merge query-string overrides onto the configured ingest defaults
    fn options(&self, defaults: IngestOptions) -> Result<IngestOptions, HrError> {
        let mut options = defaults;
        if let Some(mode) = non_blank(&self.mode) {
            options.mode = mode.parse::<WriteMode>()?;
        }
        if let Some(policy) = non_blank(&self.on_malformed) {
            options.on_malformed = policy.parse::<MalformedPolicy>()?;
        }
        options.sheet = non_blank(&self.sheet).map(str::to_owned);
        Ok(options)
    }

    fn format(&self, body: &[u8]) -> Result<FileFormat, HrError> {
        match non_blank(&self.format) {
            Some(format) => format.parse(),
            None => Ok(sniff_format(body)),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Guess the format from the leading bytes when the client did not say
pub fn sniff_format(body: &[u8]) -> FileFormat {
    if body.starts_with(ZIP_MAGIC) || body.starts_with(OLE_MAGIC) {
        FileFormat::Spreadsheet
    } else {
        FileFormat::Csv
    }
}

/// POST /uploads/{table}
async fn upload(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestReport>), ApiError> {
    let size = body.len();
    let result = ingest(&state, &table, &params, body).await;

    let detail = match &result {
        Ok(report) => format!(
            "{} of {} rows written ({} mode, {} warnings, {} bytes)",
            report.rows_written,
            report.rows_read,
            report.mode,
            report.warnings.len(),
            size
        ),
        Err(e) => e.to_string(),
    };
    state.audit(Action::Upload, table, detail, Outcome::of(&result));

    let report = result?;
    let status = if report.created_table {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(report)))
}

async fn ingest(
    state: &AppState,
    table: &str,
    params: &UploadParams,
    body: Bytes,
) -> Result<IngestReport, HrError> {
    Ident::new(table)?;
    if body.is_empty() {
        return Err(HrError::malformed_file("the upload is empty"));
    }

    let format = params.format(&body)?;
    let options = params.options(IngestOptions::from(&state.config.ingest))?;

    Ingestor::new(&state.pool, options)
        .ingest_bytes(body.to_vec(), format, table)
        .await
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/uploads/{table}", post(upload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_workbooks_by_magic() {
        assert_eq!(sniff_format(b"PK\x03\x04rest"), FileFormat::Spreadsheet);
        assert_eq!(
            sniff_format(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1]),
            FileFormat::Spreadsheet
        );
        assert_eq!(sniff_format(b"name,amount\n"), FileFormat::Csv);
    }

    #[test]
    fn explicit_format_wins() {
        let params = UploadParams {
            format: Some("tsv".into()),
            ..UploadParams::default()
        };
        assert_eq!(params.format(b"PK\x03\x04").unwrap(), FileFormat::Tsv);
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let params = UploadParams {
            mode: Some("Upsert".into()),
            on_malformed: Some("fail".into()),
            sheet: Some("  ".into()),
            ..UploadParams::default()
        };
        let options = params.options(IngestOptions::default()).unwrap();
        assert_eq!(options.mode, WriteMode::Upsert);
        assert_eq!(options.on_malformed, MalformedPolicy::FailFast);
        assert_eq!(options.sheet, None);
        assert_eq!(options.batch_size, IngestOptions::default().batch_size);
    }

    #[test]
    fn bad_mode_is_invalid_parameter() {
        let params = UploadParams {
            mode: Some("merge".into()),
            ..UploadParams::default()
        };
        assert!(matches!(
            params.options(IngestOptions::default()),
            Err(HrError::InvalidParameter { .. })
        ));
    }
}
