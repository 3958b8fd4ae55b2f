use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use quick_xml::Writer;
use tracing::{debug, warn};
use url::{form_urlencoded, Url};

use crate::config::ENCODING;
use crate::domain::{Entry, EntryKind};
use crate::errors::{GatewayError, GatewayResult};

/// Marker that classifies an entry as short-form content
const SHORTS_TOKEN: &str = "#short";

/// Prefix used when the media namespace has to be declared by us
const MEDIA_PREFIX: &str = "media";

/// Decides which entries are dropped from a rewritten feed.
pub trait EntryFilter: Send + Sync {
    /// True when the entry must be removed
    fn excludes(&self, entry: &Entry) -> bool;
}

/// Drops short-form videos, recognised by a `#short`/`#shorts` tag in the
/// title or description.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShortsFilter;

impl EntryFilter for ShortsFilter {
    fn excludes(&self, entry: &Entry) -> bool {
        entry.text().to_lowercase().contains(SHORTS_TOKEN)
    }
}

#[derive(Default, Clone, Copy)]
pub struct RewriteOptions<'a> {
    pub remove_existing_media: bool,
    pub entry_filter: Option<&'a dyn EntryFilter>,
}

/// Link that resolves an entry's source URL through this gateway
pub fn download_url(base_url: &str, source_url: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(source_url.as_bytes()).collect();
    format!(
        "{}/download?video_url={}",
        base_url.trim_end_matches('/'),
        encoded
    )
}

/// Injects a media enclosure into every feed entry.
///
/// The document is streamed event by event; entries are buffered until their
/// closing tag so the entry filter can see the whole entry before anything is
/// written. Work happens in three steps per entry: filter, strip existing
/// enclosures, append the new one.
#[derive(Debug, Clone)]
pub struct FeedRewriter {
    default_namespace: String,
}

impl FeedRewriter {
    /// `default_namespace` applies when the document binds nothing to `media`
    pub fn new(default_namespace: impl Into<String>) -> Self {
        Self {
            default_namespace: default_namespace.into(),
        }
    }

    pub fn rewrite(
        &self,
        xml: &[u8],
        options: &RewriteOptions<'_>,
        base_url: &str,
    ) -> GatewayResult<Vec<u8>> {
        let mut reader = NsReader::from_reader(xml);

        let mut out = Output::new();
        let mut media: Option<MediaNamespace> = None;
        let mut pending: Option<PendingEntry> = None;
        let mut skip_depth: Option<usize> = None;
        let mut depth = 0usize;
        let mut root_closed = false;

        loop {
            let position = reader.buffer_position();
            let event = reader
                .read_event()
                .map_err(|e| malformed(format!("at byte {}: {}", position, e)))?;

            if let Event::Decl(decl) = &event {
                if out.started {
                    return Err(malformed("XML declaration after content"));
                }
                out.write_decl(Some(decl))?;
                continue;
            }
            if matches!(event, Event::Eof) {
                break;
            }
            // Layout whitespace; the writer re-indents
            if matches!(&event, Event::Text(text) if is_blank(text)) {
                continue;
            }
            if !out.started {
                out.write_decl(None)?;
            }

            match event {
                Event::Start(start) => {
                    let element_depth = depth;
                    depth += 1;

                    if skip_depth.is_some() {
                        continue;
                    }

                    if element_depth == 0 {
                        if media.is_some() {
                            return Err(malformed("more than one root element"));
                        }
                        let (namespace, root) = self.prepare_root(start)?;
                        media = Some(namespace);
                        out.write(Event::Start(root))?;
                        continue;
                    }

                    let Some(media) = media.as_ref() else {
                        return Err(malformed("element outside the root"));
                    };

                    if options.remove_existing_media && media.matches(&reader, &start) {
                        skip_depth = Some(element_depth);
                        continue;
                    }

                    if let Some(entry) = pending.as_mut() {
                        if element_depth == entry.depth + 1 {
                            entry.enter_child(&start);
                        }
                        entry.events.push(Event::Start(start.into_owned()));
                        continue;
                    }

                    match EntryKind::from_local_name(start.local_name().as_ref()) {
                        Some(kind) => {
                            pending = Some(PendingEntry::new(kind, element_depth, start.into_owned()))
                        }
                        None => out.write(Event::Start(start))?,
                    }
                }
                Event::End(end) => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| malformed("unexpected closing tag"))?;

                    if let Some(skip) = skip_depth {
                        if depth == skip {
                            skip_depth = None;
                        }
                        continue;
                    }

                    match pending.take() {
                        Some(entry) if depth == entry.depth => {
                            // media is always set once an entry is open
                            if let Some(media) = media.as_ref() {
                                self.finish_entry(entry, options, media, base_url, &mut out)?;
                            }
                        }
                        Some(mut entry) => {
                            if depth == entry.depth + 1 {
                                entry.leave_child();
                            }
                            entry.events.push(Event::End(end.into_owned()));
                            pending = Some(entry);
                        }
                        None => {
                            if depth == 0 {
                                root_closed = true;
                            }
                            out.write(Event::End(end))?;
                        }
                    }
                }
                Event::Empty(element) => {
                    if skip_depth.is_some() {
                        continue;
                    }

                    if depth == 0 {
                        if media.is_some() {
                            return Err(malformed("more than one root element"));
                        }
                        let (namespace, root) = self.prepare_root(element)?;
                        media = Some(namespace);
                        root_closed = true;
                        out.write(Event::Empty(root))?;
                        continue;
                    }

                    let Some(media) = media.as_ref() else {
                        return Err(malformed("element outside the root"));
                    };

                    if options.remove_existing_media && media.matches(&reader, &element) {
                        continue;
                    }

                    if let Some(entry) = pending.as_mut() {
                        if depth == entry.depth + 1 {
                            entry.read_link_attribute(&element);
                        }
                        entry.events.push(Event::Empty(element.into_owned()));
                        continue;
                    }

                    match EntryKind::from_local_name(element.local_name().as_ref()) {
                        // A self-closing entry has no link; it is only filtered
                        Some(kind) => {
                            let entry = PendingEntry::new(kind, depth, element.into_owned());
                            if !is_excluded(&entry.entry, options) {
                                warn!(kind = %kind, "entry has no link, leaving it without enclosure");
                                out.write(Event::Empty(entry.start))?;
                            }
                        }
                        None => out.write(Event::Empty(element))?,
                    }
                }
                Event::Text(text) => {
                    let value = text
                        .unescape()
                        .map_err(|e| malformed(format!("text at byte {}: {}", position, e)))?
                        .into_owned();
                    if skip_depth.is_some() {
                        continue;
                    }
                    if depth == 0 {
                        return Err(malformed("text outside the root element"));
                    }
                    if let Some(entry) = pending.as_mut() {
                        entry.append_text(&value);
                        entry.events.push(Event::Text(text.into_owned()));
                        continue;
                    }
                    out.write(Event::Text(text))?;
                }
                Event::CData(data) => {
                    if skip_depth.is_some() {
                        continue;
                    }
                    if depth == 0 {
                        return Err(malformed("CDATA outside the root element"));
                    }
                    if let Some(entry) = pending.as_mut() {
                        entry.append_text(&String::from_utf8_lossy(&data));
                        entry.events.push(Event::CData(data.into_owned()));
                        continue;
                    }
                    out.write(Event::CData(data))?;
                }
                other => {
                    // Comments, processing instructions, doctype
                    if skip_depth.is_some() {
                        continue;
                    }
                    if let Some(entry) = pending.as_mut() {
                        entry.events.push(other.into_owned());
                        continue;
                    }
                    out.write(other)?;
                }
            }
        }

        if media.is_none() {
            return Err(malformed("no root element"));
        }
        if depth != 0 || !root_closed {
            return Err(malformed("unexpected end of document"));
        }

        Ok(out.finish())
    }

    /// Pick the media namespace and make sure the root declares it
    fn prepare_root(
        &self,
        root: BytesStart<'_>,
    ) -> GatewayResult<(MediaNamespace, BytesStart<'static>)> {
        let mut declared: Vec<(String, String)> = Vec::new();

        for attr in root.attributes() {
            let attr = attr.map_err(|e| malformed(format!("root attribute: {}", e)))?;
            if let Some(prefix) = attr.key.as_ref().strip_prefix(b"xmlns:") {
                let uri = attr
                    .unescape_value()
                    .map_err(|e| malformed(format!("namespace declaration: {}", e)))?;
                declared.push((String::from_utf8_lossy(prefix).into_owned(), uri.into_owned()));
            }
        }

        let uri = declared
            .iter()
            .find(|(prefix, _)| prefix == MEDIA_PREFIX)
            .map(|(_, uri)| uri.clone())
            .unwrap_or_else(|| self.default_namespace.clone());

        let mut root = root.into_owned();
        let prefix = if declared.iter().any(|(prefix, _)| prefix == MEDIA_PREFIX) {
            MEDIA_PREFIX.to_string()
        } else if let Some((prefix, _)) = declared.iter().find(|(_, bound)| *bound == uri) {
            prefix.clone()
        } else {
            root.push_attribute((format!("xmlns:{}", MEDIA_PREFIX).as_str(), uri.as_str()));
            MEDIA_PREFIX.to_string()
        };

        debug!(namespace = %uri, prefix = %prefix, "media namespace selected");
        Ok((MediaNamespace { uri, prefix }, root))
    }

    fn finish_entry(
        &self,
        pending: PendingEntry,
        options: &RewriteOptions<'_>,
        media: &MediaNamespace,
        base_url: &str,
        out: &mut Output,
    ) -> GatewayResult<()> {
        let PendingEntry {
            kind,
            start,
            events,
            entry,
            ..
        } = pending;

        if is_excluded(&entry, options) {
            debug!(kind = %kind, title = ?entry.title, "entry filtered out");
            return Ok(());
        }

        let end = start.to_end().into_owned();
        out.write(Event::Start(start))?;
        for event in events {
            out.write(event)?;
        }

        match usable_link(&entry) {
            Some(link) => out.write(Event::Empty(media.enclosure(&download_url(base_url, link))))?,
            None => warn!(
                kind = %kind,
                title = ?entry.title,
                link = ?entry.link,
                "entry has no usable link, leaving it without enclosure"
            ),
        }

        out.write(Event::End(end))
    }
}

struct MediaNamespace {
    uri: String,
    prefix: String,
}

impl MediaNamespace {
    /// Is `element` a media enclosure in this namespace?
    fn matches(&self, reader: &NsReader<&[u8]>, element: &BytesStart<'_>) -> bool {
        let (namespace, local) = reader.resolve_element(element.name());
        local.as_ref() == b"content"
            && matches!(namespace, ResolveResult::Bound(Namespace(uri)) if uri == self.uri.as_bytes())
    }

    fn enclosure(&self, url: &str) -> BytesStart<'static> {
        let mut element = BytesStart::new(format!("{}:content", self.prefix));
        element.push_attribute(("url", url));
        element
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Description,
    Link,
}

/// An entry held back until its end tag is seen.
struct PendingEntry {
    kind: EntryKind,
    depth: usize,
    start: BytesStart<'static>,
    events: Vec<Event<'static>>,
    entry: Entry,
    field: Option<Field>,
    link_text: Option<String>,
    has_text_link: bool,
}

impl PendingEntry {
    fn new(kind: EntryKind, depth: usize, start: BytesStart<'static>) -> Self {
        Self {
            kind,
            depth,
            start,
            events: Vec::new(),
            entry: Entry::new(),
            field: None,
            link_text: None,
            has_text_link: false,
        }
    }

    fn enter_child(&mut self, child: &BytesStart<'_>) {
        self.field = match child.local_name().as_ref() {
            b"title" => Some(Field::Title),
            b"description" | b"summary" => Some(Field::Description),
            b"link" => {
                self.read_link_attribute(child);
                // The first text link wins over href links and later text links
                (!self.has_text_link).then_some(Field::Link)
            }
            _ => None,
        };
    }

    fn leave_child(&mut self) {
        if self.field == Some(Field::Link) {
            let text = self.link_text.take().unwrap_or_default();
            let text = text.trim();
            if !text.is_empty() {
                self.entry.link = Some(text.to_string());
                self.has_text_link = true;
            }
        }
        self.field = None;
    }

    /// Atom style `<link href="..."/>`; only the alternate link counts
    fn read_link_attribute(&mut self, element: &BytesStart<'_>) {
        if element.local_name().as_ref() != b"link" || self.entry.link.is_some() {
            return;
        }

        let mut href = None;
        let mut alternate = true;
        for attr in element.attributes().flatten() {
            let value = attr
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_default();
            match attr.key.as_ref() {
                b"href" => href = Some(value),
                b"rel" => alternate = value == "alternate",
                _ => {}
            }
        }

        if alternate {
            self.entry.link = href;
        }
    }

    fn append_text(&mut self, text: &str) {
        let slot = match self.field {
            Some(Field::Title) => &mut self.entry.title,
            Some(Field::Description) => &mut self.entry.description,
            Some(Field::Link) => &mut self.link_text,
            None => return,
        };
        slot.get_or_insert_with(String::new).push_str(text);
    }
}

struct Output {
    writer: Writer<Vec<u8>>,
    started: bool,
}

impl Output {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
            started: false,
        }
    }

    /// Declaration with the source's version and standalone flag, our encoding
    fn write_decl(&mut self, source: Option<&BytesDecl<'_>>) -> GatewayResult<()> {
        let version = source
            .and_then(|d| d.version().ok())
            .map(|v| String::from_utf8_lossy(&v).into_owned())
            .unwrap_or_else(|| "1.0".to_string());
        let standalone = source
            .and_then(|d| d.standalone())
            .and_then(|s| s.ok())
            .map(|s| String::from_utf8_lossy(&s).into_owned());

        self.started = true;
        self.write(Event::Decl(BytesDecl::new(
            &version,
            Some(ENCODING),
            standalone.as_deref(),
        )))
    }

    fn write(&mut self, event: Event<'_>) -> GatewayResult<()> {
        self.started = true;
        self.writer
            .write_event(event)
            .map_err(|e| GatewayError::MalformedFeed(format!("serialization failed: {}", e)))
    }

    fn finish(self) -> Vec<u8> {
        let mut bytes = self.writer.into_inner();
        bytes.push(b'\n');
        bytes
    }
}

fn is_excluded(entry: &Entry, options: &RewriteOptions<'_>) -> bool {
    options
        .entry_filter
        .is_some_and(|filter| filter.excludes(entry))
}

/// The entry's link, if it is an absolute URL
fn usable_link(entry: &Entry) -> Option<&str> {
    let link = entry.link.as_deref()?.trim();
    Url::parse(link).ok().map(|_| link)
}

fn is_blank(text: &[u8]) -> bool {
    text.iter().all(u8::is_ascii_whitespace)
}

fn malformed(reason: impl Into<String>) -> GatewayError {
    GatewayError::MalformedFeed(reason.into())
}
