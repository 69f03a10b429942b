//! Registry identifiers and lookup results

use serde::{Deserialize, Serialize};

/// Globally unique schema identifier assigned by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaId(pub u32);

impl SchemaId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SchemaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name under which schema versions are registered
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject(pub String);

impl Subject {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Subject {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Subject {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Version of a schema within a subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaVersion(pub u32);

impl SchemaVersion {
    pub fn new(version: u32) -> Self {
        Self(version)
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Schema format as reported by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchemaType {
    /// Confluent registries omit `schemaType` for Avro
    #[default]
    Avro,
    Json,
    Protobuf,
}

impl std::str::FromStr for SchemaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "AVRO" => Ok(SchemaType::Avro),
            "JSON" | "JSONSCHEMA" => Ok(SchemaType::Json),
            "PROTOBUF" | "PROTO" => Ok(SchemaType::Protobuf),
            other => Err(format!("unknown schema type: {}", other)),
        }
    }
}

impl std::fmt::Display for SchemaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaType::Avro => write!(f, "AVRO"),
            SchemaType::Json => write!(f, "JSON"),
            SchemaType::Protobuf => write!(f, "PROTOBUF"),
        }
    }
}

/// A schema as registered under a subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectSchema {
    pub subject: Subject,
    pub version: SchemaVersion,
    pub id: SchemaId,
    pub schema_type: SchemaType,
    /// Raw schema definition text
    pub schema: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_type_parse() {
        assert_eq!("avro".parse::<SchemaType>().unwrap(), SchemaType::Avro);
        assert_eq!("JSON".parse::<SchemaType>().unwrap(), SchemaType::Json);
        assert_eq!("proto".parse::<SchemaType>().unwrap(), SchemaType::Protobuf);
        assert!("xml".parse::<SchemaType>().is_err());
    }

    #[test]
    fn test_schema_type_defaults_to_avro() {
        assert_eq!(SchemaType::default(), SchemaType::Avro);
    }
}
