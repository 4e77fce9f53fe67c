use serde::Serialize;

use crate::{
    canonical::{canonicalize_email, canonicalize_phone, resolve_iso_hint, PhoneValidationError},
    dedup::{DuplicateIndex, Identifiers},
    error::StructuralError,
    pipeline::{check_structure, ImportRequest, PipelineOptions},
    schema::row_country_hint,
    validate::{validate_row, RowRejection},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RowWarning {
    // Import still accepts the row, see PipelineOptions::strict_phone
    InvalidPhone(String),
    DuplicateInFile { first_row: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowReport {
    pub row_number: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub warnings: Vec<RowWarning>,
    #[serde(skip)]
    pub rejection: Option<RowRejection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSummary {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub with_warnings: usize,
    pub rows: Vec<RowReport>,
}

/// The interactive check run before an upload is submitted. Stricter than the import
/// itself: phone numbers are validated against their country and repeated contacts
/// within the file are pointed out. Nothing is read from or written to a store.
///
/// Only rows with an error or a warning are listed.
pub fn preview_rows(
    request: &ImportRequest,
    options: &PipelineOptions,
) -> Result<PreviewSummary, StructuralError> {
    check_structure(request)?;

    let mut summary = PreviewSummary {
        total: request.rows.len(),
        ..Default::default()
    };
    let mut seen = DuplicateIndex::new();
    // (row number, identifiers) of every accepted row, to name the first occurrence
    let mut accepted: Vec<(usize, Identifiers)> = vec![];

    for (position, row) in request.rows.iter().enumerate() {
        let row_number = position + 1 + options.header_rows;
        let validated = match validate_row(row, &request.schema) {
            Ok(v) => v,
            Err(rejection) => {
                summary.invalid += 1;
                summary.rows.push(RowReport {
                    row_number,
                    error: Some(rejection.to_string()),
                    warnings: vec![],
                    rejection: Some(rejection),
                });
                continue;
            }
        };

        let country = row_country_hint(row);
        let iso_hint = country.as_deref().and_then(resolve_iso_hint);
        let identifiers = Identifiers {
            email: validated.identity.email.as_deref().and_then(canonicalize_email),
            phone: validated
                .identity
                .phone
                .as_deref()
                .map(|raw| canonicalize_phone(raw, iso_hint, &options.default_iso_code))
                .filter(|p| !p.is_empty()),
        };

        let mut warnings = vec![];
        if let Some(phone) = &identifiers.phone {
            if let Err(e) = phone.validate() {
                warnings.push(phone_warning(e));
            }
        }
        if seen.contains(&identifiers) {
            let first_row = accepted
                .iter()
                .find(|(_, other)| shares_identifier(other, &identifiers))
                .map(|(n, _)| *n)
                .unwrap_or(row_number);
            warnings.push(RowWarning::DuplicateInFile { first_row });
        } else {
            seen.insert(&identifiers);
            accepted.push((row_number, identifiers));
        }

        summary.valid += 1;
        if !warnings.is_empty() {
            summary.with_warnings += 1;
            summary.rows.push(RowReport {
                row_number,
                error: None,
                warnings,
                rejection: None,
            });
        }
    }

    Ok(summary)
}

fn phone_warning(e: PhoneValidationError) -> RowWarning {
    RowWarning::InvalidPhone(e.to_string())
}

fn shares_identifier(a: &Identifiers, b: &Identifiers) -> bool {
    let email = matches!((&a.email, &b.email), (Some(x), Some(y)) if x == y);
    let phones = b.phone_variants();
    email || a.phone_variants().iter().any(|v| phones.contains(v))
}
