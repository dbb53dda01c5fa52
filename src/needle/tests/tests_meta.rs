#[cfg(test)]
mod tests {
    use crate::needle::meta::MetaHeaders;
    use crate::needle::NeedleError;

    #[test]
    fn names_are_canonicalized() {
        let mut meta = MetaHeaders::new();
        meta.set("content-type", "text/plain");
        meta.set("x-FILENAME", "report.txt");

        assert_eq!(meta.get("Content-Type"), Some("text/plain"));
        assert_eq!(meta.get("CONTENT-TYPE"), Some("text/plain"));
        assert_eq!(meta.get("X-Filename"), Some("report.txt"));
    }

    #[test]
    fn serialization_is_sorted_and_crlf_terminated() {
        let mut meta = MetaHeaders::new();
        meta.set("X-Filename", "a.bin");
        meta.set("Content-Type", "application/octet-stream");

        let bytes = meta.to_bytes();
        assert_eq!(
            bytes,
            b"Content-Type: application/octet-stream\r\nX-Filename: a.bin\r\n"
        );
    }

    #[test]
    fn round_trip() {
        let mut meta = MetaHeaders::new();
        meta.set("Content-Type", "image/png");
        meta.add("X-Filename", "cat.png");

        let parsed = MetaHeaders::parse(&meta.to_bytes()).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn disallowed_headers_dropped_on_write() {
        let mut meta = MetaHeaders::new();
        meta.set("Content-Type", "text/html");
        meta.set("X-Secret", "hunter2");
        meta.set("Content-Disposition", "attachment");

        let parsed = MetaHeaders::parse(&meta.to_bytes()).unwrap();
        assert_eq!(parsed.get("Content-Type"), Some("text/html"));
        assert_eq!(parsed.get("X-Secret"), None);
        assert_eq!(parsed.get("Content-Disposition"), None);
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn only_disallowed_headers_serialize_to_nothing() {
        let mut meta = MetaHeaders::new();
        meta.set("X-Whatever", "v");
        assert!(meta.to_bytes().is_empty());
    }

    #[test]
    fn folded_continuation_lines() {
        let block = b"Content-Type: text/plain;\r\n charset=utf-8\r\n";
        let parsed = MetaHeaders::parse(block).unwrap();
        assert_eq!(parsed.get("Content-Type"), Some("text/plain; charset=utf-8"));
    }

    #[test]
    fn bare_lf_line_endings_accepted() {
        let parsed = MetaHeaders::parse(b"X-Filename: a\nContent-Type: b\n").unwrap();
        assert_eq!(parsed.get("X-Filename"), Some("a"));
        assert_eq!(parsed.get("Content-Type"), Some("b"));
    }

    #[test]
    fn line_without_colon_is_rejected() {
        let err = MetaHeaders::parse(b"not a header line\r\n").unwrap_err();
        assert!(matches!(err, NeedleError::InvalidMetadata(_)));
    }

    #[test]
    fn continuation_without_header_is_rejected() {
        let err = MetaHeaders::parse(b" leading fold\r\n").unwrap_err();
        assert!(matches!(err, NeedleError::InvalidMetadata(_)));
    }

    #[test]
    fn block_is_truncated_at_u16_max() {
        let mut meta = MetaHeaders::new();
        meta.set("X-Filename", "x".repeat(90_000));
        let bytes = meta.to_bytes();
        assert_eq!(bytes.len(), u16::MAX as usize);
    }
}
