//! Decoding of PROPFIND multistatus bodies into resource descriptors

use chrono::{DateTime, NaiveDate, Utc};
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use thiserror::Error;

use crate::models::{DateWindow, Resource};

const DAV_NAMESPACE: &[u8] = b"DAV:";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct XmlParseError(pub String);

/// What happened to a single `<d:response>` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    Accepted(Resource),
    /// No `propstat` reported a 2xx status; the entry is dropped, not fatal
    Skipped { path: String, status: String },
    /// File outside the date window
    FilteredByWindow(Resource),
}

/// All entries of one multistatus response, in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropfindListing {
    pub entries: Vec<EntryOutcome>,
}

impl PropfindListing {
    pub fn accepted(&self) -> impl Iterator<Item = &Resource> {
        self.entries.iter().filter_map(|entry| match entry {
            EntryOutcome::Accepted(resource) => Some(resource),
            _ => None,
        })
    }

    pub fn into_accepted(self) -> Vec<Resource> {
        self.entries
            .into_iter()
            .filter_map(|entry| match entry {
                EntryOutcome::Accepted(resource) => Some(resource),
                _ => None,
            })
            .collect()
    }

    pub fn skipped_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, EntryOutcome::Skipped { .. }))
            .count()
    }

    pub fn filtered_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, EntryOutcome::FilteredByWindow(_)))
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DavElement {
    Multistatus,
    Response,
    Href,
    Propstat,
    Status,
    Prop,
    ResourceType,
    Collection,
    ContentLength,
    LastModified,
    Other,
}

impl DavElement {
    fn resolve(ns: &ResolveResult, local_name: &[u8]) -> Self {
        match ns {
            ResolveResult::Bound(Namespace(uri)) if *uri == DAV_NAMESPACE => match local_name {
                b"multistatus" => Self::Multistatus,
                b"response" => Self::Response,
                b"href" => Self::Href,
                b"propstat" => Self::Propstat,
                b"status" => Self::Status,
                b"prop" => Self::Prop,
                b"resourcetype" => Self::ResourceType,
                b"collection" => Self::Collection,
                b"getcontentlength" => Self::ContentLength,
                b"getlastmodified" => Self::LastModified,
                _ => Self::Other,
            },
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Default)]
struct PropstatBuilder {
    status: Option<String>,
    is_collection: bool,
    content_length: Option<String>,
    last_modified: Option<String>,
}

impl PropstatBuilder {
    fn is_success(&self) -> bool {
        self.status.as_deref().map(status_is_success).unwrap_or(false)
    }
}

#[derive(Debug, Default)]
struct EntryBuilder {
    href: String,
    response_status: Option<String>,
    propstats: Vec<PropstatBuilder>,
    open_propstat: Option<PropstatBuilder>,
}

impl EntryBuilder {
    fn open(&mut self, element: DavElement, parent: Option<DavElement>) {
        match element {
            DavElement::Propstat => self.open_propstat = Some(PropstatBuilder::default()),
            DavElement::Collection if parent == Some(DavElement::ResourceType) => {
                if let Some(propstat) = self.open_propstat.as_mut() {
                    propstat.is_collection = true;
                }
            }
            _ => {}
        }
    }

    fn close(&mut self, element: DavElement) {
        if element == DavElement::Propstat {
            if let Some(propstat) = self.open_propstat.take() {
                self.propstats.push(propstat);
            }
        }
    }

    fn text(&mut self, element: DavElement, parent: Option<DavElement>, text: &str) {
        match (element, parent) {
            (DavElement::Href, Some(DavElement::Response)) => self.href.push_str(text),
            (DavElement::Status, Some(DavElement::Response)) => {
                self.response_status.get_or_insert_with(String::new).push_str(text)
            }
            (DavElement::Status, Some(DavElement::Propstat)) => {
                if let Some(propstat) = self.open_propstat.as_mut() {
                    propstat.status.get_or_insert_with(String::new).push_str(text);
                }
            }
            (DavElement::ContentLength, _) => {
                if let Some(propstat) = self.open_propstat.as_mut() {
                    propstat.content_length.get_or_insert_with(String::new).push_str(text);
                }
            }
            (DavElement::LastModified, _) => {
                if let Some(propstat) = self.open_propstat.as_mut() {
                    propstat.last_modified.get_or_insert_with(String::new).push_str(text);
                }
            }
            _ => {}
        }
    }

    fn finish(self, host_prefix: &str, window: &DateWindow) -> Result<EntryOutcome, XmlParseError> {
        let href = self.href.trim();
        if href.is_empty() {
            return Err(XmlParseError("response entry without href".to_string()));
        }
        let path = format!("{}{}", host_prefix, href);

        let successful: Vec<&PropstatBuilder> = self.propstats.iter().filter(|p| p.is_success()).collect();
        if successful.is_empty() {
            let status = self
                .propstats
                .iter()
                .find_map(|p| p.status.clone())
                .or(self.response_status)
                .unwrap_or_else(|| "no status".to_string());
            return Ok(EntryOutcome::Skipped {
                path,
                status: status.trim().to_string(),
            });
        }

        if successful.iter().any(|p| p.is_collection) {
            return Ok(EntryOutcome::Accepted(Resource::collection(path)));
        }

        let size_text = successful
            .iter()
            .find_map(|p| p.content_length.as_deref())
            .ok_or_else(|| XmlParseError(format!("file entry {} has no getcontentlength", path)))?;
        let size = size_text
            .trim()
            .parse::<u64>()
            .map_err(|_| XmlParseError(format!("file entry {} has invalid getcontentlength '{}'", path, size_text.trim())))?;

        let modified_text = successful
            .iter()
            .find_map(|p| p.last_modified.as_deref())
            .ok_or_else(|| XmlParseError(format!("file entry {} has no getlastmodified", path)))?;
        let modified = parse_http_date(modified_text)
            .ok_or_else(|| XmlParseError(format!("file entry {} has invalid getlastmodified '{}'", path, modified_text.trim())))?;

        let resource = Resource::file(path, size, modified);
        if window.admits(&resource) {
            Ok(EntryOutcome::Accepted(resource))
        } else {
            Ok(EntryOutcome::FilteredByWindow(resource))
        }
    }
}

/// Parses a PROPFIND multistatus body.
///
/// Every resource path is `host_prefix` followed by the trimmed href. Files
/// outside `window` come back as [`EntryOutcome::FilteredByWindow`];
/// collections are never filtered.
pub fn parse_propfind_response(
    body: &str,
    host_prefix: &str,
    window: &DateWindow,
) -> Result<PropfindListing, XmlParseError> {
    let mut reader = NsReader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<DavElement> = Vec::new();
    let mut saw_multistatus = false;
    let mut current: Option<EntryBuilder> = None;
    let mut listing = PropfindListing::default();

    loop {
        let (ns, event) = reader
            .read_resolved_event()
            .map_err(|e| XmlParseError(format!("XML error: {}", e)))?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let element = DavElement::resolve(&ns, e.local_name().as_ref());
                let parent = stack.last().copied();
                let is_empty = matches!(event, Event::Empty(_));

                match element {
                    DavElement::Multistatus => saw_multistatus = true,
                    DavElement::Response if !is_empty => current = Some(EntryBuilder::default()),
                    _ => {
                        if let Some(entry) = current.as_mut() {
                            entry.open(element, parent);
                            if is_empty {
                                entry.close(element);
                            }
                        }
                    }
                }

                if !is_empty {
                    stack.push(element);
                }
            }
            Event::Text(e) => {
                let text = e
                    .unescape()
                    .map_err(|e| XmlParseError(format!("text unescape error: {}", e)))?;
                push_text(&stack, current.as_mut(), &text);
            }
            Event::CData(e) => {
                let raw = e.into_inner();
                push_text(&stack, current.as_mut(), &String::from_utf8_lossy(&raw));
            }
            Event::End(_) => match stack.pop() {
                Some(DavElement::Response) => {
                    if let Some(entry) = current.take() {
                        listing.entries.push(entry.finish(host_prefix, window)?);
                    }
                }
                Some(element) => {
                    if let Some(entry) = current.as_mut() {
                        entry.close(element);
                    }
                }
                None => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_multistatus {
        return Err(XmlParseError("body is not a DAV: multistatus document".to_string()));
    }
    if !stack.is_empty() {
        return Err(XmlParseError("truncated multistatus document".to_string()));
    }

    Ok(listing)
}

fn push_text(stack: &[DavElement], entry: Option<&mut EntryBuilder>, text: &str) {
    let Some(entry) = entry else { return };
    let Some(&element) = stack.last() else { return };
    let parent = stack.len().checked_sub(2).map(|i| stack[i]);
    entry.text(element, parent, text);
}

/// `true` for status lines such as `HTTP/1.1 200 OK`
pub fn status_is_success(status_line: &str) -> bool {
    status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .map(|code| (200..300).contains(&code))
        .unwrap_or(false)
}

/// Parses an HTTP-date (`Wed, 21 Oct 2015 07:28:00 GMT`) down to its UTC day
pub fn parse_http_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|dt| dt.with_timezone(&Utc).date_naive())
        .ok()
}
