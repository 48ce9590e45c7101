use serde::{Deserialize, Deserializer};
use std::fmt;

/// Declared type of a tunable variable, fixed for the variable's lifetime.
///
/// The backend sends either a numeric code or a lowercase name. Tags the
/// panel does not know about are kept verbatim in [`Datatype::Other`] so an
/// extension factory can still claim them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Datatype {
    Integer,
    Float,
    Double,
    Time,
    Other(String),
}

impl Datatype {
    pub const NUMERIC: [Datatype; 3] = [Datatype::Integer, Datatype::Float, Datatype::Double];

    #[must_use]
    pub fn from_code(code: u64) -> Self {
        match code {
            0 => Self::Integer,
            1 => Self::Float,
            2 => Self::Double,
            3 => Self::Time,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "integer" | "int" => Self::Integer,
            "float" => Self::Float,
            "double" => Self::Double,
            "time" => Self::Time,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Double => "double",
            Self::Time => "time",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDatatype {
    Code(u64),
    Name(String),
}

impl<'de> Deserialize<'de> for Datatype {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match RawDatatype::deserialize(deserializer)? {
            RawDatatype::Code(code) => Self::from_code(code),
            RawDatatype::Name(name) => Self::from_name(&name),
        })
    }
}
