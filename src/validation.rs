//! Required-field gate for export.

use std::fmt;

/// A field that must be filled before a card can be exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Image,
    Heading,
    Content1,
    Content2,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::Image, Field::Heading, Field::Content1, Field::Content2];

    pub fn label(self) -> &'static str {
        match self {
            Field::Image => "mugshot image",
            Field::Heading => "heading",
            Field::Content1 => "content #1",
            Field::Content2 => "content #2",
        }
    }
}

/// Snapshot of what the user has entered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldValues {
    pub has_image: bool,
    pub heading: String,
    pub content: String,
    pub content_2: String,
}

impl FieldValues {
    fn is_filled(&self, field: Field) -> bool {
        match field {
            Field::Image => self.has_image,
            Field::Heading => !self.heading.trim().is_empty(),
            Field::Content1 => !self.content.trim().is_empty(),
            Field::Content2 => !self.content_2.trim().is_empty(),
        }
    }
}

/// Fields still missing, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingFields(pub Vec<Field>);

impl MissingFields {
    pub fn fields(&self) -> &[Field] {
        &self.0
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.0.iter().map(|f| f.label()).collect()
    }
}

impl fmt::Display for MissingFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Please provide: {}.", self.labels().join(", "))
    }
}

/// Tracks whether export is allowed.
#[derive(Debug, Clone)]
pub struct ValidationGate {
    missing: Vec<Field>,
}

impl Default for ValidationGate {
    fn default() -> Self {
        Self::new(&FieldValues::default())
    }
}

impl ValidationGate {
    pub fn new(values: &FieldValues) -> Self {
        let mut gate = Self {
            missing: Vec::new(),
        };
        gate.recompute(values);
        gate
    }

    /// Re-evaluate the gate. Returns whether export is now enabled.
    pub fn recompute(&mut self, values: &FieldValues) -> bool {
        self.missing = Field::ALL
            .into_iter()
            .filter(|f| !values.is_filled(*f))
            .collect();
        self.is_enabled()
    }

    pub fn is_enabled(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn missing(&self) -> Option<MissingFields> {
        (!self.missing.is_empty()).then(|| MissingFields(self.missing.clone()))
    }
}
