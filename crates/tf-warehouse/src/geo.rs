//! Postal sector to district to region lookup.

use serde::Serialize;

/// Planning region of a postal district
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Region {
    Central,
    East,
    Northeast,
    North,
    West,
    Unknown,
}

impl Region {
    pub fn as_str(self) -> &'static str {
        match self {
            Region::Central => "Central",
            Region::East => "East",
            Region::Northeast => "Northeast",
            Region::North => "North",
            Region::West => "West",
            Region::Unknown => "Unknown",
        }
    }

    /// Parse a stored region name; anything unrecognised is `Unknown`
    pub fn parse(name: &str) -> Self {
        match name {
            "Central" => Region::Central,
            "East" => Region::East,
            "Northeast" => Region::Northeast,
            "North" => Region::North,
            "West" => Region::West,
            _ => Region::Unknown,
        }
    }

    fn of_district(district: u8) -> Self {
        match district {
            1..=13 => Region::Central,
            14..=18 => Region::East,
            19 | 20 | 28 => Region::Northeast,
            25..=27 => Region::North,
            21..=24 => Region::West,
            _ => Region::Unknown,
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Postal sector ranges (inclusive) for each district
const DISTRICT_SECTORS: &[(u8, u8, u8)] = &[
    (1, 1, 6),
    (2, 7, 8),
    (3, 14, 16),
    (4, 9, 10),
    (5, 11, 13),
    (6, 17, 17),
    (7, 18, 19),
    (8, 20, 21),
    (9, 22, 23),
    (10, 24, 27),
    (11, 28, 30),
    (12, 31, 33),
    (13, 34, 37),
    (14, 38, 41),
    (15, 42, 45),
    (16, 46, 48),
    (17, 49, 50),
    (18, 51, 52),
    (19, 53, 55),
    (20, 56, 57),
    (21, 58, 59),
    (22, 60, 64),
    (23, 65, 68),
    (24, 69, 71),
    (25, 72, 73),
    (26, 77, 78),
    (27, 75, 76),
    (28, 79, 82),
];

/// District of a postal code from its two-digit sector
pub fn postal_district(postal_code: &str) -> Option<u8> {
    let sector: u8 = postal_code.get(..2)?.parse().ok()?;
    DISTRICT_SECTORS
        .iter()
        .find(|(_, start, end)| (*start..=*end).contains(&sector))
        .map(|(district, _, _)| *district)
}

/// Region of a postal code; short, non-numeric or unmapped codes are `Unknown`
pub fn postal_region(postal_code: &str) -> Region {
    postal_district(postal_code).map_or(Region::Unknown, Region::of_district)
}
