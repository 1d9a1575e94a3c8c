use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use strum_macros::{Display, EnumIter, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Unknown,
}

/// Label to confidence pairs, kept in the order they were inserted.
///
/// Serializes as a JSON object so the key order seen by clients is the
/// order of the underlying vector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Probabilities(Vec<(String, f64)>);

impl Probabilities {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Sets the confidence for `label`. A label seen before keeps its
    /// position and takes the new value.
    pub fn insert(&mut self, label: String, confidence: f64) {
        match self.0.iter_mut().find(|(existing, _)| *existing == label) {
            Some(entry) => entry.1 = confidence,
            None => self.0.push((label, confidence)),
        }
    }

    /// Stable sort, highest confidence first.
    pub fn sort_descending(&mut self) {
        self.0.sort_by(|a, b| b.1.total_cmp(&a.1));
    }

    pub fn first(&self) -> Option<(&str, f64)> {
        self.0.first().map(|(label, confidence)| (label.as_str(), *confidence))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(label, _)| label.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, f64)> for Probabilities {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut probabilities = Probabilities::new();
        for (label, confidence) in iter {
            probabilities.insert(label, confidence);
        }
        probabilities
    }
}

impl Serialize for Probabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, confidence) in &self.0 {
            map.serialize_entry(label, confidence)?;
        }
        map.end()
    }
}

struct ProbabilitiesVisitor;

impl<'de> Visitor<'de> for ProbabilitiesVisitor {
    type Value = Probabilities;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of label to confidence")
    }

    fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<Self::Value, M::Error> {
        let mut probabilities = Probabilities::new();
        while let Some((label, confidence)) = access.next_entry::<String, f64>()? {
            probabilities.insert(label, confidence);
        }
        Ok(probabilities)
    }
}

impl<'de> Deserialize<'de> for Probabilities {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ProbabilitiesVisitor)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PredictionResponse {
    pub predicted_class: String,
    pub confidence: f64,
    pub severity: Severity,
    pub treatment: String,
    pub probabilities: Probabilities,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StatusResponse {
    pub message: String,
    pub status: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub detail: String,
}
