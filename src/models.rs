use serde::{Deserialize, Serialize};
use std::fmt;

/// Labels the model can emit, in the order of its output vector.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum LeafClass {
    #[serde(rename = "Early Blight")]
    EarlyBlight,
    #[serde(rename = "Late Blight")]
    LateBlight,
    #[serde(rename = "Healthy")]
    Healthy,
}

impl LeafClass {
    pub const ALL: [LeafClass; 3] = [
        LeafClass::EarlyBlight,
        LeafClass::LateBlight,
        LeafClass::Healthy,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            LeafClass::EarlyBlight => "Early Blight",
            LeafClass::LateBlight => "Late Blight",
            LeafClass::Healthy => "Healthy",
        }
    }
}

impl fmt::Display for LeafClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct PredictionResponse {
    pub class: LeafClass,
    pub confidence: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorResponse {
    pub detail: String,
}
