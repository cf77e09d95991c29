//! Terminal error code descriptions.
//!
//! Failed requests come back with a numeric code from the terminal's
//! runtime. The table ships embedded so lookups work without the terminal
//! installation present.

use std::sync::LazyLock;

use ahash::AHashMap;

const RAW_TABLE: &str = include_str!("../assets/mql_errors.csv");

static DESCRIPTIONS: LazyLock<AHashMap<i64, &'static str>> = LazyLock::new(|| {
    let mut map = AHashMap::new();
    for line in RAW_TABLE.lines().skip(1) {
        let Some((code, description)) = line.split_once(',') else {
            continue;
        };
        let Ok(code) = code.trim().parse::<i64>() else {
            continue;
        };
        map.insert(code, description.trim());
    }
    map
});

/// Description for a terminal error code, if the table carries it.
pub fn lookup(code: i64) -> Option<&'static str> {
    DESCRIPTIONS.get(&code).copied()
}

/// Description for a terminal error code, with a fallback for unknown codes.
pub fn describe(code: i64) -> &'static str {
    lookup(code).unwrap_or("Unrecognized terminal error code")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_resolve() {
        assert_eq!(describe(4106), "Unknown symbol");
        assert_eq!(describe(129), "Invalid price");
        assert_eq!(lookup(136), Some("Off quotes"));
    }

    #[test]
    fn unknown_codes_fall_back() {
        assert_eq!(lookup(-1), None);
        assert_eq!(describe(999_999), "Unrecognized terminal error code");
    }

    #[test]
    fn every_table_line_parses() {
        let data_lines = RAW_TABLE.lines().skip(1).filter(|l| !l.trim().is_empty());
        let mut count = 0;
        for line in data_lines {
            let (code, description) = line.split_once(',').unwrap();
            code.trim().parse::<i64>().unwrap();
            assert!(!description.trim().is_empty(), "blank description: {line}");
            count += 1;
        }
        assert_eq!(count, DESCRIPTIONS.len(), "duplicate codes in the table");
    }
}
