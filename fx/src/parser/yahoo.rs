//! Yahoo finance `xchange` feed.
//!
//! ```xml
//! <query yahoo:count="2" yahoo:created="2013-08-04T10:23:57Z">
//!   <results>
//!     <rate id="EURUSD">
//!       <Name>EUR to USD</Name><Rate>1.3280</Rate>
//!       <Date>8/2/2013</Date><Time>11:55pm</Time>
//!     </rate>
//!   </results>
//! </query>
//! ```
//!
//! Each `rate` element quotes one pair with its own timestamp. The quotes are
//! chained onto the base currency of the first pair, which becomes the table
//! reference; the latest quote time becomes the table timestamp.

use std::io::Read;

use chrono::NaiveDateTime;
use quick_xml::events::Event;
use refrate_common::{CurrencyCode, Timestamp};
use tracing::debug;

use super::{attribute, parse_number, xml_reader, Depth, FeedParser};
use crate::error::{ParseError, ParseResult};
use crate::table::{RateTable, RateTableBuilder};

/// Parser for Yahoo pair-quote feeds.
#[derive(Debug, Clone, Default)]
pub struct YahooParser;

impl YahooParser {
    pub fn new() -> Self {
        Self
    }
}

/// Child element of `rate` currently being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Name,
    Rate,
    Date,
    Time,
}

impl Field {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"Name" => Some(Field::Name),
            b"Rate" => Some(Field::Rate),
            b"Date" => Some(Field::Date),
            b"Time" => Some(Field::Time),
            _ => None,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            Field::Name => "Name",
            Field::Rate => "Rate",
            Field::Date => "Date",
            Field::Time => "Time",
        }
    }
}

/// Fields of one `rate` element as found in the document.
#[derive(Debug, Default)]
struct RawQuote {
    id: Option<String>,
    name: String,
    rate: String,
    date: String,
    time: String,
}

impl RawQuote {
    fn text_mut(&mut self, field: Field) -> &mut String {
        match field {
            Field::Name => &mut self.name,
            Field::Rate => &mut self.rate,
            Field::Date => &mut self.date,
            Field::Time => &mut self.time,
        }
    }

    fn into_quote(self) -> ParseResult<Quote> {
        let (base, quote) = self.pair()?;

        if self.rate.trim().is_empty() {
            return Err(ParseError::MissingField("Rate"));
        }
        let rate = parse_number("Rate", &self.rate)?;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ParseError::InvalidRate {
                code: format!("{base}{quote}"),
                rate,
            });
        }

        if self.date.trim().is_empty() {
            return Err(ParseError::MissingField("Date"));
        }
        if self.time.trim().is_empty() {
            return Err(ParseError::MissingField("Time"));
        }
        let at = parse_quote_time(&self.date, &self.time)?;

        Ok(Quote {
            base,
            quote,
            rate,
            at,
        })
    }

    /// Pair codes from the `id` attribute, or from a `Name` like "EUR to USD".
    fn pair(&self) -> ParseResult<(CurrencyCode, CurrencyCode)> {
        if let Some(id) = self.id.as_deref() {
            if id.len() == 6 && id.is_ascii() {
                let (base, quote) = id.split_at(3);
                return Ok((CurrencyCode::new(base)?, CurrencyCode::new(quote)?));
            }
        }

        let name = self.name.trim();
        if let Some((base, quote)) = name.split_once(" to ").or_else(|| name.split_once('/')) {
            return Ok((CurrencyCode::new(base)?, CurrencyCode::new(quote)?));
        }

        match &self.id {
            Some(id) => Err(ParseError::Malformed(format!("unrecognized pair id {id:?}"))),
            None => Err(ParseError::MissingField("id")),
        }
    }
}

/// A validated pair quote.
#[derive(Debug, Clone)]
struct Quote {
    base: CurrencyCode,
    quote: CurrencyCode,
    /// Units of `quote` per unit of `base`.
    rate: f64,
    at: Timestamp,
}

/// Parse `8/2/2013` + `11:55pm`; quote times are taken as UTC.
fn parse_quote_time(date: &str, time: &str) -> ParseResult<Timestamp> {
    let raw = format!("{} {}", date.trim(), time.trim().to_ascii_uppercase());
    NaiveDateTime::parse_from_str(&raw, "%m/%d/%Y %I:%M%p")
        .map(|t| t.and_utc())
        .map_err(|_| ParseError::InvalidTimestamp(raw))
}

/// Express every quote against the base of the first one.
///
/// Pairs are resolved as soon as one of their currencies is known, so the
/// feed may list them in any order as long as they form a connected set.
fn normalize(quotes: Vec<Quote>) -> ParseResult<RateTable> {
    let first = quotes.first().ok_or(ParseError::Empty)?;
    let reference = first.base.clone();
    let valid_at = quotes.iter().map(|q| q.at).max().unwrap_or(first.at);

    let mut builder = RateTableBuilder::new(reference.clone());
    let mut pending = quotes;

    while !pending.is_empty() {
        let before = pending.len();
        let mut unresolved = Vec::new();

        for quote in pending {
            match (builder.get(&quote.base), builder.get(&quote.quote)) {
                (Some(_), Some(_)) => {
                    debug!(base = %quote.base, quote = %quote.quote, "Redundant pair ignored");
                }
                (Some(base), None) => builder.insert(quote.quote.clone(), base * quote.rate)?,
                (None, Some(known)) => builder.insert(quote.base.clone(), known / quote.rate)?,
                (None, None) => unresolved.push(quote),
            }
        }

        if unresolved.len() == before {
            let stuck = &unresolved[0];
            return Err(ParseError::Unnormalizable {
                pair: format!("{}{}", stuck.base, stuck.quote),
                reference: reference.to_string(),
            });
        }
        pending = unresolved;
    }

    builder.finish(valid_at)
}

fn nested_in(field: Field) -> ParseError {
    ParseError::Malformed(format!("element nested inside <{}>", field.tag()))
}

impl FeedParser for YahooParser {
    fn name(&self) -> &str {
        "Yahoo"
    }

    fn parse(&self, source: &mut dyn Read) -> ParseResult<RateTable> {
        let mut reader = xml_reader(source);
        let mut buf = Vec::new();
        let mut depth = Depth::default();
        let mut current: Option<RawQuote> = None;
        let mut field: Option<Field> = None;
        let mut quotes = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    if let Some(field) = field {
                        return Err(nested_in(field));
                    }
                    depth.open();
                    let tag = e.local_name();
                    if tag.as_ref() == b"rate" {
                        current = Some(RawQuote {
                            id: attribute(&e, "id")?,
                            ..Default::default()
                        });
                    } else if current.is_some() {
                        field = Field::from_tag(tag.as_ref());
                    }
                }
                Event::Empty(e) => {
                    if depth.current() == 0 {
                        return Err(ParseError::Empty);
                    }
                    if let Some(field) = field {
                        return Err(nested_in(field));
                    }
                    if e.local_name().as_ref() == b"rate" {
                        let raw = RawQuote {
                            id: attribute(&e, "id")?,
                            ..Default::default()
                        };
                        quotes.push(raw.into_quote()?);
                    }
                }
                Event::Text(e) => {
                    if depth.current() == 0 {
                        return Err(ParseError::Malformed("text outside root element".into()));
                    }
                    if let (Some(quote), Some(field)) = (current.as_mut(), field) {
                        quote.text_mut(field).push_str(&e.unescape()?);
                    }
                }
                Event::CData(e) => {
                    if depth.current() == 0 {
                        return Err(ParseError::Malformed("text outside root element".into()));
                    }
                    if let (Some(quote), Some(field)) = (current.as_mut(), field) {
                        let text = std::str::from_utf8(&e)
                            .map_err(|_| ParseError::Malformed("CDATA is not UTF-8".into()))?;
                        quote.text_mut(field).push_str(text);
                    }
                }
                Event::End(e) => {
                    depth.close();
                    if e.local_name().as_ref() == b"rate" {
                        if let Some(raw) = current.take() {
                            quotes.push(raw.into_quote()?);
                        }
                    }
                    field = None;
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        depth.finish()?;

        debug!(quotes = quotes.len(), "Parsed Yahoo feed");
        normalize(quotes)
    }
}
