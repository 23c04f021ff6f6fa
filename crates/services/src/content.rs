use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

use crate::storage::FileRef;

/// Renders a post's markdown to the stored HTML. Raw inline HTML from the
/// author is escaped to inert text; images are emitted by hand so that
/// storage-backed ones (bucket/path query parameters) become lazy
/// `data-src` tags the client resolves through presigned URLs.
pub fn render_markdown(content: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let parser = Parser::new_ext(content, options);

    let mut events: Vec<Event> = Vec::new();
    // (dest, alt) while between Start(Image) and End(Image)
    let mut image: Option<(String, String)> = None;

    for event in parser {
        match event {
            Event::Start(Tag::Image { dest_url, .. }) => {
                image = Some((dest_url.to_string(), String::new()));
            }
            Event::End(TagEnd::Image) => {
                if let Some((dest, alt)) = image.take() {
                    events.push(image_event(&dest, &alt));
                }
            }
            Event::Text(text) | Event::Code(text) if image.is_some() => {
                if let Some((_, alt)) = image.as_mut() {
                    alt.push_str(&text);
                }
            }
            Event::Html(html) => events.push(Event::Text(html)),
            Event::InlineHtml(html) => events.push(Event::Text(html)),
            other => {
                if image.is_none() {
                    events.push(other);
                }
            }
        }
    }

    let mut html = String::with_capacity(content.len() * 2);
    pulldown_cmark::html::push_html(&mut html, events.into_iter());
    html
}

fn image_event(dest: &str, alt: &str) -> Event<'static> {
    let attr = if FileRef::from_url(dest).is_some() {
        "data-src"
    } else {
        "src"
    };
    Event::Html(
        format!(
            "<img {}=\"{}\" alt=\"{}\">",
            attr,
            escape_html(dest),
            escape_html(alt)
        )
        .into(),
    )
}

/// Collects the storage references a rendered post embeds: `data-src`
/// attribute URLs carrying bucket/path query parameters.
pub fn extract_file_refs(html: &str) -> Vec<FileRef> {
    const MARKER: &str = "data-src=\"";

    let mut refs = Vec::new();
    let mut rest = html;
    while let Some(idx) = rest.find(MARKER) {
        rest = &rest[idx + MARKER.len()..];
        let Some(end) = rest.find('"') else { break };
        let url = unescape_html(&rest[..end]);
        if let Some(file_ref) = FileRef::from_url(&url) {
            refs.push(file_ref);
        }
        rest = &rest[end..];
    }
    refs
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape_html(input: &str) -> String {
    input
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
