//! PROPFIND request body and multistatus parsing
//!
//! Servers differ in namespace prefixes (`d:`, `D:`, none), so elements are
//! matched by local name only.

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::WebDavError;

/// Body asking only for the properties the sync engine reads
pub const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:resourcetype/>
    <d:getcontentlength/>
    <d:getlastmodified/>
    <d:getetag/>
  </d:prop>
</d:propfind>"#;

/// One `<response>` element of a multistatus body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DavEntry {
    /// Raw, still percent-encoded href
    pub href: String,
    pub is_collection: bool,
    pub content_length: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

impl DavEntry {
    /// Decoded last path segment of the href
    pub fn name(&self) -> String {
        let segment = self
            .href
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        urlencoding::decode(segment)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| segment.to_string())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    None,
    Href,
    ContentLength,
    LastModified,
    Etag,
}

/// Parse a 207 multistatus body into its entries, in document order
pub fn parse_multistatus(xml: &str) -> Result<Vec<DavEntry>, WebDavError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<DavEntry> = None;
    let mut field = Field::None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"response" => current = Some(DavEntry::default()),
                b"href" => field = Field::Href,
                b"getcontentlength" => field = Field::ContentLength,
                b"getlastmodified" => field = Field::LastModified,
                b"getetag" => field = Field::Etag,
                b"collection" => mark_collection(&mut current),
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"collection" {
                    mark_collection(&mut current);
                }
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| WebDavError::InvalidResponse(e.to_string()))?;
                if let Some(entry) = current.as_mut() {
                    apply_text(entry, field, text.trim());
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"response" {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                }
                field = Field::None;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(WebDavError::InvalidResponse(e.to_string())),
        }
    }

    Ok(entries)
}

fn mark_collection(current: &mut Option<DavEntry>) {
    if let Some(entry) = current.as_mut() {
        entry.is_collection = true;
    }
}

fn apply_text(entry: &mut DavEntry, field: Field, text: &str) {
    match field {
        Field::Href => entry.href = text.to_string(),
        Field::ContentLength => entry.content_length = text.parse().unwrap_or(0),
        Field::LastModified => entry.last_modified = parse_http_date(text),
        Field::Etag => entry.etag = Some(text.trim_matches('"').to_string()),
        Field::None => {}
    }
}

/// RFC 1123 date as sent in `getlastmodified`
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
