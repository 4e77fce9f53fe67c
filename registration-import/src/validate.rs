use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::{
    canonical::PhoneValidationError,
    record::{ClassicFields, FieldMap, RawRow, RegistrationFields},
    schema::{
        FieldSchema, FieldSpec, Identity, InputType, CLASSIC_COMPANY, CLASSIC_EMAIL,
        CLASSIC_FULL_NAME, CLASSIC_PHONE,
    },
};

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid")
});

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

/// Why a single row was not imported. None of these abort a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowRejection {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingRequiredFields(Vec<String>),
    #[error("invalid email address {value:?} in {field}")]
    InvalidEmail { field: String, value: String },
    #[error("invalid value {value:?} for {field}, expected one of: {}", .allowed.join(", "))]
    InvalidEnumValue {
        field: String,
        value: String,
        allowed: Vec<String>,
    },
    #[error("invalid phone number: {0}")]
    InvalidPhone(#[from] PhoneValidationError),
}

impl RowRejection {
    /// Stable label for metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            RowRejection::MissingRequiredFields(_) => "missing_required_fields",
            RowRejection::InvalidEmail { .. } => "invalid_email",
            RowRejection::InvalidEnumValue { .. } => "invalid_enum_value",
            RowRejection::InvalidPhone(_) => "invalid_phone",
        }
    }
}

/// A row that passed structural validation, resolved against its schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRow {
    pub fields: RegistrationFields,
    pub identity: Identity,
}

/// Checks one row against the schema. Pure, no duplicate or store lookups.
pub fn validate_row(row: &RawRow, schema: &FieldSchema) -> Result<ValidatedRow, RowRejection> {
    match schema {
        FieldSchema::Classic => validate_classic(row),
        FieldSchema::Dynamic(fields) => validate_dynamic(row, schema, fields),
    }
}

fn validate_classic(row: &RawRow) -> Result<ValidatedRow, RowRejection> {
    let full_name = row.text(CLASSIC_FULL_NAME);
    let email = row.text(CLASSIC_EMAIL);

    let (Some(full_name), Some(email)) = (full_name.clone(), email.clone()) else {
        let mut missing = vec![];
        if full_name.is_none() {
            missing.push(CLASSIC_FULL_NAME.to_string());
        }
        if email.is_none() {
            missing.push(CLASSIC_EMAIL.to_string());
        }
        return Err(RowRejection::MissingRequiredFields(missing));
    };

    if !is_valid_email(&email) {
        return Err(RowRejection::InvalidEmail {
            field: CLASSIC_EMAIL.to_string(),
            value: email,
        });
    }

    let fields = ClassicFields {
        full_name,
        email,
        phone: row.text(CLASSIC_PHONE),
        company: row.text(CLASSIC_COMPANY),
    };
    let identity = FieldSchema::Classic.extract_identity(row);

    Ok(ValidatedRow {
        fields: RegistrationFields::Classic(fields),
        identity,
    })
}

fn validate_dynamic(
    row: &RawRow,
    schema: &FieldSchema,
    specs: &[FieldSpec],
) -> Result<ValidatedRow, RowRejection> {
    let values: Vec<(&FieldSpec, Option<String>)> =
        specs.iter().map(|spec| (spec, row.text(&spec.name))).collect();

    let missing: Vec<String> = values
        .iter()
        .filter(|(spec, value)| spec.required && value.is_none())
        .map(|(spec, _)| spec.name.clone())
        .collect();
    if !missing.is_empty() {
        return Err(RowRejection::MissingRequiredFields(missing));
    }

    let mut fields = FieldMap::new();
    for (spec, value) in values {
        let Some(value) = value else {
            continue;
        };
        check_value(spec, &value)?;
        fields.insert(spec.name.clone(), value);
    }

    // Alias matching needs the original columns, the schema may not declare them
    let mut identity = schema.extract_identity(&fields);
    if identity.email.is_none() || identity.phone.is_none() {
        let from_row = schema.extract_identity(row);
        if identity.email.is_none() {
            identity.email = from_row.email;
            identity.email_field_name = from_row.email_field_name;
        }
        if identity.phone.is_none() {
            identity.phone = from_row.phone;
            identity.phone_field_name = from_row.phone_field_name;
        }
    }

    Ok(ValidatedRow {
        fields: RegistrationFields::Dynamic(fields),
        identity,
    })
}

fn check_value(spec: &FieldSpec, value: &str) -> Result<(), RowRejection> {
    match spec.input_type {
        t if t.is_enum() => {
            if spec.allowed_values.iter().any(|allowed| allowed == value) {
                Ok(())
            } else {
                Err(RowRejection::InvalidEnumValue {
                    field: spec.name.clone(),
                    value: value.to_string(),
                    allowed: spec.allowed_values.clone(),
                })
            }
        }
        InputType::Email if !is_valid_email(value) => Err(RowRejection::InvalidEmail {
            field: spec.name.clone(),
            value: value.to_string(),
        }),
        _ => Ok(()),
    }
}
