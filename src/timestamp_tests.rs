#[cfg(test)]
mod timestamp_parsing_tests {
    use crate::parser;
    use chrono::{Datelike, Timelike};

    struct TimestampTestCase {
        input: &'static str,
        /// Expected UTC offset in seconds; `None` means the token must not parse.
        offset_secs: Option<i32>,
        hour: u32,
        description: &'static str,
    }

    const TEST_CASES: &[TimestampTestCase] = &[
        TimestampTestCase {
            input: "19/Sep/2025:00:00:39 +0530",
            offset_secs: Some(19_800),
            hour: 0,
            description: "NCSA with positive half-hour offset",
        },
        TimestampTestCase {
            input: "10/Oct/2000:13:55:36 -0700",
            offset_secs: Some(-25_200),
            hour: 13,
            description: "NCSA with negative offset",
        },
        TimestampTestCase {
            input: "19/Sep/2025:07:15:00",
            offset_secs: Some(0),
            hour: 7,
            description: "NCSA without offset is read as UTC",
        },
        TimestampTestCase {
            input: "2025-08-07T06:41:18.123456Z",
            offset_secs: Some(0),
            hour: 6,
            description: "RFC3339 with microseconds and Z",
        },
        TimestampTestCase {
            input: "2024-12-09 14:30:45.999-0800",
            offset_secs: Some(-28_800),
            hour: 14,
            description: "ISO with space separator and colon-less offset",
        },
        TimestampTestCase {
            input: "2025-01-01 12:00:00",
            offset_secs: Some(0),
            hour: 12,
            description: "naive ISO",
        },
        TimestampTestCase {
            input: "not a date",
            offset_secs: None,
            hour: 0,
            description: "garbage",
        },
        TimestampTestCase {
            input: "",
            offset_secs: None,
            hour: 0,
            description: "empty token",
        },
        TimestampTestCase {
            input: "32/Foo/2025:99:00:00 +0000",
            offset_secs: None,
            hour: 0,
            description: "NCSA shape with impossible values",
        },
    ];

    #[test]
    fn test_timestamp_table() {
        for case in TEST_CASES {
            let parsed = parser::parse_timestamp(case.input);
            match case.offset_secs {
                Some(off) => {
                    let ts = parsed.unwrap_or_else(|| panic!("should parse '{}': {}", case.input, case.description));
                    assert_eq!(ts.offset().local_minus_utc(), off, "offset for {}", case.description);
                    assert_eq!(ts.hour(), case.hour, "local hour for {}", case.description);
                }
                None => assert!(parsed.is_none(), "should not parse '{}': {}", case.input, case.description),
            }
        }
    }

    #[test]
    fn test_offset_is_preserved_not_normalized() {
        let ts = parser::parse_timestamp("19/Sep/2025:00:00:39 +0530").unwrap();
        assert_eq!(ts.day(), 19);
        assert_eq!(ts.minute(), 0);
        assert_eq!(ts.second(), 39);
        assert_eq!(ts.to_rfc3339(), "2025-09-19T00:00:39+05:30");
    }

    #[test]
    fn test_epoch_tokens() {
        let secs = parser::parse_timestamp("1700000000").unwrap();
        assert_eq!(secs.timestamp(), 1_700_000_000);
        let millis = parser::parse_timestamp("1700000000123").unwrap();
        assert_eq!(millis.timestamp_millis(), 1_700_000_000_123);
    }

    #[test]
    fn test_entry_detection_prefers_bracket() {
        let entry = r#"1.2.3.4 - - [19/Sep/2025:00:00:39 +0530] "GET /?t=2020-01-01T00:00:00Z HTTP/1.1" 200 1"#;
        let ts = parser::detect_timestamp_in_entry(entry).unwrap();
        assert_eq!(ts.year(), 2025);
    }

    #[test]
    fn test_entry_detection_falls_back_to_iso() {
        let entry = "1.2.3.4 2025-03-01T10:00:00+01:00 GET /x 200 5";
        let ts = parser::detect_timestamp_in_entry(entry).unwrap();
        assert_eq!(ts.offset().local_minus_utc(), 3600);
        assert_eq!(ts.hour(), 10);
    }

    #[test]
    fn test_unparseable_bracket_without_iso_is_none() {
        assert!(parser::detect_timestamp_in_entry("1.2.3.4 - - [garbage] \"GET / HTTP/1.1\" 200 0").is_none());
    }
}
