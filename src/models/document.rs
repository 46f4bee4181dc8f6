use crate::utils::ExtractionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    DrivingLicence,      // ID-1 card (85.6mm × 53.98mm)
    VehicleRegistration, // ID-1 card registration certificate
}

impl DocumentType {
    pub fn dimensions(&self) -> (f64, f64) {
        match self {
            DocumentType::DrivingLicence => (85.6, 53.98),         // mm
            DocumentType::VehicleRegistration => (85.6, 53.98),    // mm
        }
    }

    /// Landscape width over height.
    pub fn aspect_ratio(&self) -> f64 {
        let (width, height) = self.dimensions();
        width / height
    }

    pub fn mandatory_fields(&self) -> &'static [&'static str] {
        match self {
            DocumentType::DrivingLicence => {
                &["surname", "first_names", "date_of_birth", "licence_number"]
            }
            DocumentType::VehicleRegistration => &[
                "registration_number",
                "vin",
                "make",
                "first_registration_date",
            ],
        }
    }

    pub fn secondary_fields(&self) -> &'static [&'static str] {
        match self {
            DocumentType::DrivingLicence => {
                &["issue_date", "expiry_date", "issuing_authority", "categories"]
            }
            DocumentType::VehicleRegistration => {
                &["model", "colour", "keeper_name", "keeper_address"]
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::DrivingLicence => "driving_licence",
            DocumentType::VehicleRegistration => "vehicle_registration",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = ExtractionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "driving_licence" | "driving_license" | "licence" | "license" => {
                Ok(DocumentType::DrivingLicence)
            }
            "vehicle_registration" | "registration" | "v5c" => {
                Ok(DocumentType::VehicleRegistration)
            }
            other => Err(ExtractionError::UnknownDocumentType(other.to_string())),
        }
    }
}
