use serde::{Deserialize, Serialize};

use crate::record::FieldMap;

pub const CLASSIC_FULL_NAME: &str = "fullName";
pub const CLASSIC_EMAIL: &str = "email";
pub const CLASSIC_PHONE: &str = "phone";
pub const CLASSIC_COMPANY: &str = "company";

const CLASSIC_REQUIRED: [&str; 2] = [CLASSIC_FULL_NAME, CLASSIC_EMAIL];

// Already normalized, see normalize_key
const EMAIL_ALIASES: [&str; 2] = ["email", "emailaddress"];
const PHONE_ALIASES: [&str; 5] = ["phone", "phonenumber", "mobile", "contact", "whatsapp"];
const ISO_CODE_ALIASES: [&str; 3] = ["isocode", "countrycode", "countryiso"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Text,
    Email,
    Phone,
    Radio,
    List,
    Number,
    // Anything else the admin UI can produce (date, textarea, checkbox, ...) is
    // treated as free text by the engine
    #[serde(other)]
    Other,
}

impl InputType {
    pub fn is_enum(&self) -> bool {
        matches!(self, InputType::Radio | InputType::List)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub name: String,
    pub input_type: InputType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
    #[serde(default)]
    pub is_identity: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, input_type: InputType) -> Self {
        Self {
            name: name.into(),
            input_type,
            required: false,
            allowed_values: vec![],
            is_identity: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn identity(mut self) -> Self {
        self.is_identity = true;
        self
    }

    pub fn with_allowed_values<S: Into<String>>(
        mut self,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        self.allowed_values = values.into_iter().map(Into::into).collect();
        self
    }
}

/// An event's field configuration. An event that never configured custom fields
/// uses the classic fixed set, fullName + email required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<FieldSpec>", into = "Vec<FieldSpec>")]
pub enum FieldSchema {
    #[default]
    Classic,
    Dynamic(Vec<FieldSpec>),
}

impl From<Vec<FieldSpec>> for FieldSchema {
    fn from(fields: Vec<FieldSpec>) -> Self {
        if fields.is_empty() {
            FieldSchema::Classic
        } else {
            FieldSchema::Dynamic(fields)
        }
    }
}

impl From<FieldSchema> for Vec<FieldSpec> {
    fn from(schema: FieldSchema) -> Self {
        match schema {
            FieldSchema::Classic => vec![],
            FieldSchema::Dynamic(fields) => fields,
        }
    }
}

/// The contact identifiers of one record, plus the columns they were read from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub email_field_name: Option<String>,
    pub phone_field_name: Option<String>,
}

/// Lowercases and drops every non-alphanumeric character, so "E-mail Address" and
/// "email_address" compare equal.
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

impl FieldSchema {
    pub fn is_classic(&self) -> bool {
        matches!(self, FieldSchema::Classic)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        match self {
            FieldSchema::Classic => &[],
            FieldSchema::Dynamic(fields) => fields,
        }
    }

    pub fn required_fields(&self) -> Vec<&str> {
        match self {
            FieldSchema::Classic => CLASSIC_REQUIRED.to_vec(),
            FieldSchema::Dynamic(fields) => fields
                .iter()
                .filter(|f| f.required)
                .map(|f| f.name.as_str())
                .collect(),
        }
    }

    /// Required field names that no uploaded header addresses. Empty means the
    /// upload covers the schema.
    pub fn missing_required_columns<'a, I>(&self, headers: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let headers: Vec<String> = headers.into_iter().map(normalize_key).collect();
        self.required_fields()
            .into_iter()
            .filter(|name| !headers.contains(&normalize_key(name)))
            .map(str::to_string)
            .collect()
    }

    pub fn identity_fields(&self) -> Vec<&FieldSpec> {
        self.fields().iter().filter(|f| f.is_identity).collect()
    }

    fn typed_field(&self, input_type: InputType) -> Option<&FieldSpec> {
        self.fields().iter().find(|f| f.input_type == input_type)
    }

    /// Resolves which column of `record` carries the email and phone.
    ///
    /// A field typed as email/phone wins. Otherwise the record's columns are matched
    /// against a small alias set after normalization.
    pub fn extract_identity(&self, record: &FieldMap) -> Identity {
        match self {
            FieldSchema::Classic => Identity {
                email: record.text(CLASSIC_EMAIL),
                phone: record.text(CLASSIC_PHONE),
                email_field_name: Some(CLASSIC_EMAIL.to_string()),
                phone_field_name: Some(CLASSIC_PHONE.to_string()),
            },
            FieldSchema::Dynamic(_) => {
                let email_field_name = self
                    .typed_field(InputType::Email)
                    .map(|f| f.name.clone())
                    .or_else(|| alias_column(record, &EMAIL_ALIASES));
                let phone_field_name = self
                    .typed_field(InputType::Phone)
                    .map(|f| f.name.clone())
                    .or_else(|| alias_column(record, &PHONE_ALIASES));

                Identity {
                    email: email_field_name.as_deref().and_then(|n| record.text(n)),
                    phone: phone_field_name.as_deref().and_then(|n| record.text(n)),
                    email_field_name,
                    phone_field_name,
                }
            }
        }
    }
}

/// The raw value of a row's country column, if the upload has one.
pub fn row_country_hint(record: &FieldMap) -> Option<String> {
    alias_column(record, &ISO_CODE_ALIASES).and_then(|c| record.text(&c))
}

fn alias_column(record: &FieldMap, aliases: &[&str]) -> Option<String> {
    record
        .columns()
        .find(|c| aliases.contains(&normalize_key(c).as_str()))
        .map(str::to_string)
}
