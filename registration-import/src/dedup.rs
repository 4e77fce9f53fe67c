use std::collections::HashSet;

use crate::{
    canonical::{canonicalize_email, canonicalize_phone, CanonicalPhone},
    schema::FieldSchema,
    store::ExistingRecord,
};

/// The canonical contact identifiers of one record, as compared for duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identifiers {
    pub email: Option<String>,
    pub phone: Option<CanonicalPhone>,
}

impl Identifiers {
    pub fn phone_variants(&self) -> Vec<&str> {
        self.phone
            .as_ref()
            .map(CanonicalPhone::variants)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone_variants().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateMatch {
    Email,
    Phone,
}

impl DuplicateMatch {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateMatch::Email => "email",
            DuplicateMatch::Phone => "phone",
        }
    }
}

/// Email and phone sets for one event, built once per run and only ever grown.
///
/// Phones are stored under every representation we know (national and
/// international), so a lookup only needs the incoming row's variants.
#[derive(Debug, Default)]
pub struct DuplicateIndex {
    emails: HashSet<String>,
    phones: HashSet<String>,
}

impl DuplicateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build<'a, I>(records: I, schema: &FieldSchema, default_iso: &str) -> Self
    where
        I: IntoIterator<Item = &'a ExistingRecord>,
    {
        let mut index = Self::new();
        for record in records {
            index.insert(&record.identifiers(schema, default_iso));
        }
        index
    }

    pub fn find(&self, identifiers: &Identifiers) -> Option<DuplicateMatch> {
        if let Some(email) = &identifiers.email {
            // Identifiers are meant to arrive canonical, but don't rely on it
            if self.emails.contains(email) || self.emails.contains(&email.to_lowercase()) {
                return Some(DuplicateMatch::Email);
            }
        }
        identifiers
            .phone_variants()
            .into_iter()
            .any(|v| self.phones.contains(v))
            .then_some(DuplicateMatch::Phone)
    }

    pub fn contains(&self, identifiers: &Identifiers) -> bool {
        self.find(identifiers).is_some()
    }

    pub fn insert(&mut self, identifiers: &Identifiers) {
        if let Some(email) = identifiers.email.as_deref().and_then(canonicalize_email) {
            self.emails.insert(email);
        }
        for variant in identifiers.phone_variants() {
            self.phones.insert(variant.to_string());
        }
    }

    pub fn email_count(&self) -> usize {
        self.emails.len()
    }

    pub fn phone_count(&self) -> usize {
        self.phones.len()
    }
}

impl ExistingRecord {
    /// Canonical identifiers of a persisted record. Top level email/phone columns win,
    /// custom fields are searched through the schema's identity resolution otherwise.
    pub fn identifiers(&self, schema: &FieldSchema, default_iso: &str) -> Identifiers {
        let resolved = schema.extract_identity(&self.custom_fields);
        let email = self
            .email
            .as_deref()
            .and_then(canonicalize_email)
            .or_else(|| resolved.email.as_deref().and_then(canonicalize_email));
        let phone = self
            .phone
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .or(resolved.phone.as_deref())
            .map(|raw| canonicalize_phone(raw, self.iso_code.as_deref(), default_iso))
            .filter(|p| !p.is_empty());

        Identifiers { email, phone }
    }
}
