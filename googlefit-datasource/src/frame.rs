use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Column values of a field. The tag becomes the field's `type` on the wire.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", content = "values", rename_all = "lowercase")]
pub enum FieldValues {
    Time(Vec<DateTime<Utc>>),
    Int64(Vec<i64>),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Field {
    pub name: String,
    #[serde(flatten)]
    pub values: FieldValues,
}

impl Field {
    pub fn time(name: impl Into<String>, values: Vec<DateTime<Utc>>) -> Self {
        Field {
            name: name.into(),
            values: FieldValues::Time(values),
        }
    }

    pub fn int64(name: impl Into<String>, values: Vec<i64>) -> Self {
        Field {
            name: name.into(),
            values: FieldValues::Int64(values),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        match &self.values {
            FieldValues::Time(v) => v.len(),
            FieldValues::Int64(v) => v.len(),
        }
    }
}

/// A named table of columns, the unit of data returned per query.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Frame {
    pub name: String,
    pub fields: Vec<Field>,
}

impl Frame {
    pub fn new(name: impl Into<String>) -> Self {
        Frame {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    #[cfg(test)]
    pub fn rows(&self) -> usize {
        self.fields.first().map(Field::len).unwrap_or(0)
    }
}
