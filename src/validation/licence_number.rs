use chrono::{Datelike, Local, NaiveDate};
use std::collections::BTreeMap;

const MIN_LENGTH: usize = 11;
const FEMALE_MONTH_OFFSET: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sex {
    Female,
    Male,
}

/// Sub-fields of a UK driving licence number. Anything that failed to
/// decode is `None`; a short input decodes to all `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedLicenceNumber {
    pub surname_code: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub sex: Option<Sex>,
    pub initials: Option<String>,
    pub check: Option<String>,
}

impl DecodedLicenceNumber {
    pub fn is_empty(&self) -> bool {
        *self == DecodedLicenceNumber::default()
    }

    pub fn to_fields(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        if let Some(code) = &self.surname_code {
            fields.insert("licence_surname_code".to_string(), code.clone());
        }
        if let Some(date) = self.birth_date {
            fields.insert(
                "licence_birth_date".to_string(),
                date.format("%d.%m.%Y").to_string(),
            );
        }
        if let Some(sex) = self.sex {
            let value = match sex {
                Sex::Female => "female",
                Sex::Male => "male",
            };
            fields.insert("licence_sex".to_string(), value.to_string());
        }
        if let Some(initials) = &self.initials {
            fields.insert("licence_initials".to_string(), initials.clone());
        }
        fields
    }
}

pub struct LicenceNumberDecoder;

impl LicenceNumberDecoder {
    pub fn decode(licence_number: &str) -> DecodedLicenceNumber {
        Self::decode_with_reference(licence_number, Local::now().year())
    }

    /// Layout: surname (5, padded with 9), decade digit, month (+50 for
    /// female), day, year digit, initials (2, padded with 9), then an
    /// arbitrary digit and two check characters.
    ///
    /// Two-digit years resolve to 20yy unless that lies after
    /// `reference_year`, otherwise 19yy.
    pub fn decode_with_reference(licence_number: &str, reference_year: i32) -> DecodedLicenceNumber {
        let chars: Vec<char> = licence_number
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(|c| c.to_uppercase())
            .collect();

        if chars.len() < MIN_LENGTH {
            return DecodedLicenceNumber::default();
        }

        let text = |range: std::ops::Range<usize>| chars[range].iter().collect::<String>();
        let padded = |range: std::ops::Range<usize>| {
            let value = text(range).trim_end_matches('9').to_string();
            if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphabetic()) {
                None
            } else {
                Some(value)
            }
        };
        let digit = |i: usize| chars[i].to_digit(10);
        let number = |i: usize| Some(digit(i)? * 10 + digit(i + 1)?);

        let mut decoded = DecodedLicenceNumber {
            surname_code: padded(0..5),
            ..Default::default()
        };

        let (month, sex) = match number(6) {
            Some(m @ 1..=12) => (Some(m), Some(Sex::Male)),
            Some(m @ 51..=62) => (Some(m - FEMALE_MONTH_OFFSET), Some(Sex::Female)),
            _ => (None, None),
        };
        decoded.sex = sex;

        let year = match (digit(5), digit(10)) {
            (Some(decade), Some(unit)) => {
                let yy = (decade * 10 + unit) as i32;
                Some(if 2000 + yy > reference_year { 1900 + yy } else { 2000 + yy })
            }
            _ => None,
        };

        if let (Some(year), Some(month), Some(day)) = (year, month, number(8)) {
            decoded.birth_date = NaiveDate::from_ymd_opt(year, month, day);
        }

        if chars.len() >= 13 {
            decoded.initials = padded(11..13);
        }
        if chars.len() >= 16 {
            decoded.check = Some(text(13..16));
        }

        decoded
    }
}
