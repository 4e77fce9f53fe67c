use std::fmt;

use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};

use crate::schema::normalize_key;

/// A single spreadsheet cell, as handed over by the parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Empty,
}

impl CellValue {
    /// The trimmed textual form of the cell, or None if the cell is blank.
    ///
    /// Spreadsheets routinely store phone numbers as numeric cells, so whole numbers
    /// are rendered without a fractional part or exponent.
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            CellValue::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
                Some(format!("{}", *n as i64))
            }
            CellValue::Number(n) if n.is_finite() => Some(n.to_string()),
            CellValue::Number(_) | CellValue::Empty => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.as_text().is_none()
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

/// An ordered column → value mapping. Column order is the order the parser (or the
/// JSON document) produced it in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    cells: Vec<(String, CellValue)>,
}

/// One uploaded spreadsheet row. Rows carry no identity of their own, they are
/// referred to by position.
pub type RawRow = FieldMap;

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column, replacing any existing value under the same exact name.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<CellValue>) {
        let column = column.into();
        let value = value.into();
        match self.cells.iter_mut().find(|(c, _)| *c == column) {
            Some((_, existing)) => *existing = value,
            None => self.cells.push((column, value)),
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.cells.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Looks a column up by exact name first, then by normalized name, so that
    /// "Full Name", "full_name" and "fullName" all address the same column.
    pub fn lookup(&self, name: &str) -> Option<&CellValue> {
        if let Some((_, v)) = self.cells.iter().find(|(c, _)| c == name) {
            return Some(v);
        }
        let wanted = normalize_key(name);
        self.cells
            .iter()
            .find(|(c, _)| normalize_key(c) == wanted)
            .map(|(_, v)| v)
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.lookup(name).and_then(CellValue::as_text)
    }
}

impl<K: Into<String>, V: Into<CellValue>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = FieldMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (k, v) in &self.cells {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldMapVisitor;

        impl<'de> Visitor<'de> for FieldMapVisitor {
            type Value = FieldMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of column names to cell values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FieldMap, A::Error> {
                let mut map = FieldMap::new();
                while let Some((k, v)) = access.next_entry::<String, CellValue>()? {
                    map.insert(k, v);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(FieldMapVisitor)
    }
}

/// The fixed field set used by events that never configured custom fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassicFields {
    pub full_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

/// A registrant's submitted data, resolved once against the event's schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegistrationFields {
    Classic(ClassicFields),
    Dynamic(FieldMap),
}

impl RegistrationFields {
    /// Flattens either shape into a column map, the form persisted as custom fields.
    pub fn to_field_map(&self) -> FieldMap {
        match self {
            RegistrationFields::Dynamic(map) => map.clone(),
            RegistrationFields::Classic(classic) => {
                let mut map = FieldMap::new();
                map.insert("fullName", classic.full_name.as_str());
                map.insert("email", classic.email.as_str());
                if let Some(phone) = &classic.phone {
                    map.insert("phone", phone.as_str());
                }
                if let Some(company) = &classic.company {
                    map.insert("company", company.as_str());
                }
                map
            }
        }
    }
}
