//! European Central Bank reference-rate feed.
//!
//! ```xml
//! <gesmes:Envelope xmlns:gesmes="http://www.gesmes.org/xml/2002-08-01"
//!                  xmlns="http://www.ecb.int/vocabulary/2002-08-01/eurofxref">
//!   <Cube>
//!     <Cube time="2013-08-02">
//!       <Cube currency="USD" rate="1.3225"/>
//!       <Cube currency="JPY" rate="130.54"/>
//!     </Cube>
//!   </Cube>
//! </gesmes:Envelope>
//! ```
//!
//! All rates are quoted against the euro. The historical feeds list several
//! days newest first; only the first day is used.

use std::io::Read;

use chrono::{DateTime, NaiveDate, Utc};
use quick_xml::events::{BytesStart, Event};
use refrate_common::{CurrencyCode, Timestamp};
use tracing::debug;

use super::{attribute, parse_number, xml_reader, Depth, FeedParser};
use crate::error::{ParseError, ParseResult};
use crate::table::{RateTable, RateTableBuilder};

/// Parser for the ECB `eurofxref` XML feeds.
#[derive(Debug, Clone)]
pub struct EcbParser {
    reference: CurrencyCode,
}

impl EcbParser {
    pub fn new() -> Self {
        Self {
            reference: CurrencyCode::eur(),
        }
    }
}

impl Default for EcbParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the `time` attribute: a plain date, or a full RFC 3339 timestamp.
fn parse_time(value: &str) -> ParseResult<Timestamp> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ParseError::InvalidTimestamp(value.to_string()))
}

/// Where the parser is relative to the first dated cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    BeforeDay,
    /// Inside the dated cube, at the given element depth.
    InDay(usize),
    AfterDay,
}

impl FeedParser for EcbParser {
    fn name(&self) -> &str {
        "ECB"
    }

    fn parse(&self, source: &mut dyn Read) -> ParseResult<RateTable> {
        let mut reader = xml_reader(source);
        let mut buf = Vec::new();
        let mut depth = Depth::default();
        let mut section = Section::BeforeDay;
        let mut valid_at = None;
        let mut builder = RateTableBuilder::new(self.reference.clone());

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    depth.open();
                    self.on_cube(&e, &depth, &mut section, &mut valid_at, &mut builder)?;
                }
                Event::Empty(e) => {
                    depth.open();
                    self.on_cube(&e, &depth, &mut section, &mut valid_at, &mut builder)?;
                    // A self-closing dated cube ends its day immediately.
                    if section == Section::InDay(depth.current()) {
                        section = Section::AfterDay;
                    }
                    depth.close();
                }
                Event::End(_) => {
                    if section == Section::InDay(depth.current()) {
                        section = Section::AfterDay;
                    }
                    depth.close();
                }
                Event::Text(_) | Event::CData(_) if depth.current() == 0 => {
                    return Err(ParseError::Malformed("text outside root element".into()));
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        depth.finish()?;

        let valid_at = valid_at.ok_or(ParseError::MissingField("time"))?;
        debug!(rates = builder.len(), valid_at = %valid_at, "Parsed ECB feed");
        builder.finish(valid_at)
    }
}

impl EcbParser {
    fn on_cube(
        &self,
        element: &BytesStart<'_>,
        depth: &Depth,
        section: &mut Section,
        valid_at: &mut Option<Timestamp>,
        builder: &mut RateTableBuilder,
    ) -> ParseResult<()> {
        if element.local_name().as_ref() != b"Cube" {
            return Ok(());
        }

        if let Some(time) = attribute(element, "time")? {
            if *section == Section::BeforeDay {
                *valid_at = Some(parse_time(&time)?);
                *section = Section::InDay(depth.current());
            } else {
                debug!(time = %time, "Skipping older ECB day");
            }
            return Ok(());
        }

        let currency = attribute(element, "currency")?;
        let rate = attribute(element, "rate")?;
        if currency.is_none() && rate.is_none() {
            // Outer wrapper cube.
            return Ok(());
        }

        match *section {
            Section::InDay(_) => {}
            Section::AfterDay => return Ok(()),
            Section::BeforeDay => {
                return Err(ParseError::Malformed(
                    "rate listed outside a dated Cube".into(),
                ))
            }
        }

        let currency = currency.ok_or(ParseError::MissingField("currency"))?;
        let rate = rate.ok_or(ParseError::MissingField("rate"))?;

        let code = CurrencyCode::new(&currency)?;
        let rate = parse_number("rate", &rate)?;
        builder.insert(code, rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const DAILY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gesmes:Envelope xmlns:gesmes="http://www.gesmes.org/xml/2002-08-01" xmlns="http://www.ecb.int/vocabulary/2002-08-01/eurofxref">
  <gesmes:subject>Reference rates</gesmes:subject>
  <gesmes:Sender><gesmes:name>European Central Bank</gesmes:name></gesmes:Sender>
  <Cube>
    <Cube time='2013-08-02'>
      <Cube currency='USD' rate='1.3655'/>
      <Cube currency='JPY' rate='130.54'/>
      <Cube currency='GBP' rate='0.87070'/>
    </Cube>
  </Cube>
</gesmes:Envelope>"#;

    const HISTORY: &str = r#"<gesmes:Envelope xmlns:gesmes="http://www.gesmes.org/xml/2002-08-01">
  <Cube>
    <Cube time="2013-08-02"><Cube currency="USD" rate="1.3655"/></Cube>
    <Cube time="2013-08-01"><Cube currency="USD" rate="1.3200"/><Cube currency="CHF" rate="1.23"/></Cube>
  </Cube>
</gesmes:Envelope>"#;

    fn parse(doc: &str) -> ParseResult<RateTable> {
        EcbParser::new().parse(&mut doc.as_bytes())
    }

    #[test]
    fn test_parse_daily_feed() {
        let table = parse(DAILY).unwrap();

        assert_eq!(table.reference(), &CurrencyCode::eur());
        assert_eq!(table.len(), 4);
        assert_eq!(table.rate("USD"), Some(1.3655));
        assert_eq!(table.rate("EUR"), Some(1.0));
        assert_eq!(
            table.valid_at(),
            Utc.with_ymd_and_hms(2013, 8, 2, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_history_uses_first_day_only() {
        let table = parse(HISTORY).unwrap();

        assert_eq!(table.rate("USD"), Some(1.3655));
        assert!(!table.contains("CHF"));
        assert_eq!(
            table.valid_at(),
            Utc.with_ymd_and_hms(2013, 8, 2, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_explicit_reference_entry() {
        let doc = r#"<E><Cube><Cube time="2013-08-02">
            <Cube currency="EUR" rate="1.0"/><Cube currency="USD" rate="1.3655"/>
        </Cube></Cube></E>"#;

        let table = parse(doc).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_rfc3339_time() {
        let doc = r#"<E><Cube time="2013-08-02T14:15:00+01:00"><Cube currency="USD" rate="1.3"/></Cube></E>"#;
        let table = parse(doc).unwrap();

        assert_eq!(
            table.valid_at(),
            Utc.with_ymd_and_hms(2013, 8, 2, 13, 15, 0).unwrap()
        );
    }

    #[test]
    fn test_rejects_not_xml() {
        assert!(matches!(
            parse("this is not a feed"),
            Err(ParseError::Malformed(_))
        ));
        assert!(matches!(parse(""), Err(ParseError::Malformed(_))));
    }

    #[test]
    fn test_rejects_truncated_document() {
        let truncated = &DAILY[..DAILY.len() / 2];
        assert!(parse(truncated).is_err());
    }

    #[test]
    fn test_rejects_truncated_start_tag() {
        // The unterminated tag is still reported as an element, minus its
        // missing attributes.
        let doc = "<gesmes:Envelope><Cube><Cube time='2013-08-06'><Cube currency='USD'";
        assert!(matches!(parse(doc), Err(ParseError::MissingField("rate"))));

        let doc = "<gesmes:Envelope><Cube><Cube time='2013-08-06'><Cube currency='USD' rate='1.3'";
        assert!(parse(doc).is_err());
    }

    #[test]
    fn test_rejects_mismatched_tags() {
        let doc = r#"<E><Cube time="2013-08-02"><Cube currency="USD" rate="1.3"/></E></Cube>"#;
        assert!(matches!(parse(doc), Err(ParseError::Malformed(_))));
    }

    #[test]
    fn test_rejects_missing_time() {
        let doc = r#"<E><Cube><Cube currency="USD" rate="1.3"/></Cube></E>"#;
        assert!(matches!(parse(doc), Err(ParseError::Malformed(_))));

        let doc = r#"<html><body>Service unavailable</body></html>"#;
        assert!(matches!(parse(doc), Err(ParseError::MissingField("time"))));
    }

    #[test]
    fn test_rejects_bad_time() {
        let doc = r#"<E><Cube time="yesterday"><Cube currency="USD" rate="1.3"/></Cube></E>"#;
        assert!(matches!(parse(doc), Err(ParseError::InvalidTimestamp(_))));
    }

    #[test]
    fn test_rejects_missing_or_bad_rate() {
        let doc = r#"<E><Cube time="2013-08-02"><Cube currency="USD"/></Cube></E>"#;
        assert!(matches!(parse(doc), Err(ParseError::MissingField("rate"))));

        let doc = r#"<E><Cube time="2013-08-02"><Cube rate="1.3"/></Cube></E>"#;
        assert!(matches!(parse(doc), Err(ParseError::MissingField("currency"))));

        let doc = r#"<E><Cube time="2013-08-02"><Cube currency="USD" rate="abc"/></Cube></E>"#;
        assert!(matches!(parse(doc), Err(ParseError::InvalidNumber { .. })));

        let doc = r#"<E><Cube time="2013-08-02"><Cube currency="USD" rate="-1"/></Cube></E>"#;
        assert!(matches!(parse(doc), Err(ParseError::InvalidRate { .. })));
    }

    #[test]
    fn test_rejects_day_without_rates() {
        let doc = r#"<E><Cube><Cube time="2013-08-02"></Cube></Cube></E>"#;
        assert!(matches!(parse(doc), Err(ParseError::Empty)));
    }
}
