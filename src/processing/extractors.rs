// Regular-expression field parsing of full-page OCR text
use crate::models::DocumentType;
use crate::processing::ocr::clean_text;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;

lazy_static! {
    // Numbered labels printed on the front of a photocard licence
    static ref LICENCE_PATTERNS: Vec<(&'static str, Regex)> = vec![
        ("surname", Regex::new(r"(?m)^\s*1\.\s*([A-Z][A-Z' -]+?)\s*$").unwrap()),
        ("first_names", Regex::new(r"(?m)^\s*2\.\s*([A-Z][A-Z' -]+?)\s*$").unwrap()),
        ("date_of_birth", Regex::new(r"(?m)^\s*3\.\s*(\d{2}[./-]\d{2}[./-]\d{4})").unwrap()),
        ("place_of_birth", Regex::new(r"(?m)^\s*3\.\s*\d{2}[./-]\d{2}[./-]\d{4}\s+(\S.*?)\s*$").unwrap()),
        ("issue_date", Regex::new(r"(?mi)^\s*4a\.?\s*(\d{2}[./-]\d{2}[./-]\d{4})").unwrap()),
        ("expiry_date", Regex::new(r"(?mi)^\s*4b\.?\s*(\d{2}[./-]\d{2}[./-]\d{4})").unwrap()),
        ("issuing_authority", Regex::new(r"(?mi)^\s*4c\.?\s*(\S.*?)\s*$").unwrap()),
        ("licence_number", Regex::new(r"(?m)^\s*5\.\s*([A-Z9]{5}\d{6}[A-Z9]{2}\d[A-Z0-9]{2})").unwrap()),
        // Printed without its label, e.g. when the "5." was lost to glare
        ("licence_number", Regex::new(r"\b([A-Z9]{5}\d{6}[A-Z9]{2}\d[A-Z]{2})\b").unwrap()),
        ("address", Regex::new(r"(?m)^\s*8\.\s*(\S.*?)\s*$").unwrap()),
        ("categories", Regex::new(r"(?m)^\s*9\.\s*([A-Z0-9+/ ]+?)\s*$").unwrap()),
    ];

    // Harmonised EU registration certificate codes
    static ref REGISTRATION_PATTERNS: Vec<(&'static str, Regex)> = vec![
        ("registration_number", Regex::new(r"(?m)^\s*A\.?\s+([A-Z]{2}\d{2}\s?[A-Z]{3}|[A-Z0-9]{1,4}\s?[A-Z0-9]{1,4})\s*$").unwrap()),
        ("first_registration_date", Regex::new(r"(?m)^\s*B\.?\s+(\d{2}[./-]\d{2}[./-]\d{4})").unwrap()),
        ("keeper_name", Regex::new(r"(?m)^\s*C\.1\.1\.?\s+(\S.*?)\s*$").unwrap()),
        ("keeper_address", Regex::new(r"(?m)^\s*C\.1\.3\.?\s+(\S.*?)\s*$").unwrap()),
        ("make", Regex::new(r"(?m)^\s*D\.1\.?\s+(\S.*?)\s*$").unwrap()),
        ("model", Regex::new(r"(?m)^\s*D\.3\.?\s+(\S.*?)\s*$").unwrap()),
        ("vin", Regex::new(r"(?m)^\s*E\.?\s+([A-HJ-NPR-Z0-9]{17})\b").unwrap()),
        ("vin", Regex::new(r"\b([A-HJ-NPR-Z0-9]{17})\b").unwrap()),
        ("engine_capacity", Regex::new(r"(?m)^\s*P\.1\.?\s+(\d{2,5})").unwrap()),
        ("colour", Regex::new(r"(?m)^\s*R\.?\s+([A-Z][A-Z ]*?)\s*$").unwrap()),
    ];
}

pub struct PatternExtractor;

impl PatternExtractor {
    /// Fields recognisable in `text`; the first matching pattern wins per field.
    pub fn extract(document_type: DocumentType, text: &str) -> BTreeMap<String, String> {
        let patterns = match document_type {
            DocumentType::DrivingLicence => LICENCE_PATTERNS.iter(),
            DocumentType::VehicleRegistration => REGISTRATION_PATTERNS.iter(),
        };

        let mut fields = BTreeMap::new();
        for (field, pattern) in patterns {
            if fields.contains_key(*field) {
                continue;
            }
            if let Some(matched) = pattern.captures(text).and_then(|c| c.get(1)) {
                let value = clean_text(matched.as_str());
                if !value.is_empty() {
                    fields.insert(field.to_string(), value);
                }
            }
        }
        fields
    }
}
