//! Feed parsers.
//!
//! Every provider publishes its own document format. A [`FeedParser`] turns
//! one such document into a locked [`RateTable`](crate::table::RateTable), or
//! fails without producing anything.

mod ecb;
mod yahoo;

pub use ecb::EcbParser;
pub use yahoo::YahooParser;

use std::io::{BufReader, Read};

use quick_xml::events::BytesStart;
use quick_xml::Reader;

use crate::error::{ParseError, ParseResult};
use crate::table::RateTable;

/// Parses one provider's wire format.
pub trait FeedParser: Send + Sync {
    /// Provider name, used in logs and cache file names.
    fn name(&self) -> &str;

    /// Parse a complete feed document.
    fn parse(&self, source: &mut dyn Read) -> ParseResult<RateTable>;
}

/// XML reader over a byte source, trimming whitespace-only text.
pub(crate) fn xml_reader(source: &mut dyn Read) -> Reader<BufReader<&mut dyn Read>> {
    let mut reader = Reader::from_reader(BufReader::new(source));
    reader.trim_text(true);
    reader
}

/// Value of attribute `name` on `element`, unescaped.
pub(crate) fn attribute(element: &BytesStart<'_>, name: &str) -> ParseResult<Option<String>> {
    match element.try_get_attribute(name)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.trim().to_string())),
        None => Ok(None),
    }
}

/// Parse a decimal number from a feed field.
pub(crate) fn parse_number(field: &'static str, value: &str) -> ParseResult<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| ParseError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

/// Tracks element nesting so truncated documents are rejected.
#[derive(Debug, Default)]
pub(crate) struct Depth {
    current: usize,
    seen_root: bool,
}

impl Depth {
    pub(crate) fn open(&mut self) {
        self.current += 1;
        self.seen_root = true;
    }

    pub(crate) fn close(&mut self) {
        self.current = self.current.saturating_sub(1);
    }

    pub(crate) fn current(&self) -> usize {
        self.current
    }

    /// Validate the document once EOF is reached.
    pub(crate) fn finish(&self) -> ParseResult<()> {
        if !self.seen_root {
            return Err(ParseError::Malformed("document has no root element".into()));
        }
        if self.current != 0 {
            return Err(ParseError::Malformed(format!(
                "document ends with {} unclosed element(s)",
                self.current
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("rate", " 1.3655 ").unwrap(), 1.3655);
        assert!(matches!(
            parse_number("rate", "N/A"),
            Err(ParseError::InvalidNumber { field: "rate", .. })
        ));
    }

    #[test]
    fn test_depth_detects_truncation() {
        let mut depth = Depth::default();
        assert!(depth.finish().is_err());

        depth.open();
        depth.open();
        depth.close();
        assert!(depth.finish().is_err());

        depth.close();
        assert!(depth.finish().is_ok());
    }
}
