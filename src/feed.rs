// src/feed.rs
//! RSS 2.0 rendering of the reconciled store. Pure: same items, meta and build date
//! always give the same bytes.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::fmt::Write as _;

use crate::error::RunError;
use crate::item::{Field, Item};

/// Channel-level settings.
#[derive(Debug, Clone)]
pub struct FeedMeta {
    pub title: String,
    pub description: String,
    /// Site the papers come from (`<link>`).
    pub site_link: String,
    /// Where this document is published (`atom:link rel="self"`).
    pub self_url: String,
    /// Translation labels render in this order; other stored languages follow sorted.
    pub languages: Vec<String>,
}

/// RFC 822 date as feed readers expect it.
pub fn rfc822(ts: DateTime<Utc>) -> String {
    ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn render_err<E: std::fmt::Display>(e: E) -> RunError {
    RunError::Render(e.to_string())
}

fn esc(s: &str) -> String {
    html_escape::encode_text(s).to_string()
}

fn esc_attr(s: &str) -> String {
    html_escape::encode_double_quoted_attribute(s).to_string()
}

/// Translations of `field` in display order: configured languages, then the rest by tag.
fn ordered_translations<'a>(
    item: &'a Item,
    field: Field,
    languages: &'a [String],
) -> Vec<(&'a str, &'a str)> {
    let map = item.translations(field);
    let mut out: Vec<(&str, &str)> = languages
        .iter()
        .filter_map(|l| map.get(l).map(|t| (l.as_str(), t.as_str())))
        .collect();
    for (l, t) in map {
        if !languages.iter().any(|c| c == l) {
            out.push((l.as_str(), t.as_str()));
        }
    }
    out
}

/// HTML body of an item's `<description>`. Every text field is escaped.
pub fn describe(item: &Item, languages: &[String]) -> String {
    let mut html = String::from("<div class=\"paper-content\">\n");

    let mut meta = Vec::new();
    if let Some(inst) = item.institution.as_deref().filter(|s| !s.is_empty()) {
        meta.push(format!("Institution: {}", esc(inst)));
    }
    if !item.authors.is_empty() {
        meta.push(format!("Authors: {}", esc(&item.authors.join(", "))));
    }
    if !meta.is_empty() {
        let _ = writeln!(
            html,
            "  <p style=\"color: #666; font-size: 0.9em;\">{}</p>",
            meta.join(" | ")
        );
    }

    let mut links = Vec::new();
    if let Some(abs) = &item.arxiv_abs {
        links.push(format!("<a href=\"{}\">arXiv</a>", esc_attr(abs)));
    }
    if let Some(pdf) = &item.arxiv_pdf {
        links.push(format!("<a href=\"{}\">PDF</a>", esc_attr(pdf)));
    }
    if !links.is_empty() {
        let _ = writeln!(html, "  <h3>arXiv Links</h3>\n  <p>{}</p>", links.join(" | "));
    }

    if let Some(summary) = item.summary.as_deref().filter(|s| !s.is_empty()) {
        let _ = writeln!(html, "  <h3>AI summary</h3>\n  <p>{}</p>", esc(summary));
        for (lang, text) in ordered_translations(item, Field::Summary, languages) {
            let _ = writeln!(
                html,
                "  <h3>AI summary ({})</h3>\n  <p lang=\"{}\">{}</p>",
                esc(lang),
                esc_attr(lang),
                esc(text)
            );
        }
    }

    let _ = writeln!(html, "  <h3>Abstract</h3>\n  <p>{}</p>", esc(&item.abstract_original));

    for (lang, text) in ordered_translations(item, Field::Abstract, languages) {
        let _ = writeln!(
            html,
            "  <h3>Abstract ({})</h3>\n  <p lang=\"{}\">{}</p>",
            esc(lang),
            esc_attr(lang),
            esc(text)
        );
    }

    html.push_str("</div>");
    // CDATA cannot contain its own terminator.
    html.replace("]]>", "]]&gt;")
}

/// Render the full RSS 2.0 document for `items`, in the given order.
pub fn render(items: &[Item], meta: &FeedMeta, build_date: DateTime<Utc>) -> Result<String, RunError> {
    let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);

    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(render_err)?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    rss.push_attribute(("xmlns:atom", "http://www.w3.org/2005/Atom"));
    w.write_event(Event::Start(rss)).map_err(render_err)?;
    w.write_event(Event::Start(BytesStart::new("channel")))
        .map_err(render_err)?;

    w.create_element("title")
        .write_text_content(BytesText::new(&meta.title))
        .map_err(render_err)?;
    w.create_element("link")
        .write_text_content(BytesText::new(&meta.site_link))
        .map_err(render_err)?;
    w.create_element("description")
        .write_text_content(BytesText::new(&meta.description))
        .map_err(render_err)?;
    w.create_element("lastBuildDate")
        .write_text_content(BytesText::new(&rfc822(build_date)))
        .map_err(render_err)?;
    w.create_element("atom:link")
        .with_attributes([
            ("href", meta.self_url.as_str()),
            ("rel", "self"),
            ("type", "application/rss+xml"),
        ])
        .write_empty()
        .map_err(render_err)?;

    for item in items {
        w.write_event(Event::Start(BytesStart::new("item")))
            .map_err(render_err)?;
        w.create_element("title")
            .write_text_content(BytesText::new(&item.title))
            .map_err(render_err)?;
        w.create_element("link")
            .write_text_content(BytesText::new(&item.link))
            .map_err(render_err)?;

        let body = describe(item, &meta.languages);
        w.write_event(Event::Start(BytesStart::new("description")))
            .map_err(render_err)?;
        w.write_event(Event::CData(BytesCData::new(body.as_str())))
            .map_err(render_err)?;
        w.write_event(Event::End(BytesEnd::new("description")))
            .map_err(render_err)?;

        w.create_element("pubDate")
            .write_text_content(BytesText::new(&rfc822(item.first_seen_at)))
            .map_err(render_err)?;
        w.create_element("guid")
            .with_attribute(("isPermaLink", "false"))
            .write_text_content(BytesText::new(&item.id))
            .map_err(render_err)?;
        w.write_event(Event::End(BytesEnd::new("item")))
            .map_err(render_err)?;
    }

    w.write_event(Event::End(BytesEnd::new("channel")))
        .map_err(render_err)?;
    w.write_event(Event::End(BytesEnd::new("rss")))
        .map_err(render_err)?;

    let mut out = String::from_utf8(w.into_inner()).map_err(render_err)?;
    out.push('\n');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::Candidate;
    use chrono::TimeZone;

    fn meta() -> FeedMeta {
        FeedMeta {
            title: "Papers & more".into(),
            description: "Latest".into(),
            site_link: "https://huggingface.co/papers".into(),
            self_url: "https://example.test/feed.xml".into(),
            languages: vec!["zh-CN".into()],
        }
    }

    fn item() -> Item {
        let t = Utc.with_ymd_and_hms(2025, 10, 3, 9, 5, 0).unwrap();
        let mut it = Item::admit(
            Candidate {
                id: "2510.00003".into(),
                title: "Attention <is> all & more".into(),
                abstract_original: "We show a < b ]]> c.".into(),
                institution: Some("Lab".into()),
                authors: vec!["Ann".into(), "Bob".into()],
                link: "https://huggingface.co/papers/2510.00003".into(),
                arxiv_abs: Some("https://arxiv.org/abs/2510.00003".into()),
                ..Candidate::default()
            },
            t,
        );
        it.add_translation(Field::Abstract, "ja", "日本語".into());
        it.add_translation(Field::Abstract, "zh-CN", "中文".into());
        it
    }

    #[test]
    fn rfc822_uses_gmt() {
        let t = Utc.with_ymd_and_hms(2025, 10, 3, 9, 5, 0).unwrap();
        assert_eq!(rfc822(t), "Fri, 03 Oct 2025 09:05:00 GMT");
    }

    #[test]
    fn describe_escapes_and_orders_translations() {
        let html = describe(&item(), &["zh-CN".to_string()]);
        assert!(html.contains("We show a &lt; b ]]&gt; c."));
        assert!(!html.contains("]]>"));
        assert!(html.contains("Authors: Ann, Bob"));
        let zh = html.find("Abstract (zh-CN)").unwrap();
        let ja = html.find("Abstract (ja)").unwrap();
        assert!(zh < ja);
    }

    #[test]
    fn summary_translations_follow_the_summary() {
        let mut it = item();
        it.summary = Some("Short & sweet.".into());
        it.add_translation(Field::Summary, "zh-CN", "简短。".into());
        let html = describe(&it, &["zh-CN".to_string()]);
        let summary = html.find("<h3>AI summary</h3>").unwrap();
        let translated = html.find("<h3>AI summary (zh-CN)</h3>").unwrap();
        let abstract_ = html.find("<h3>Abstract</h3>").unwrap();
        assert!(summary < translated && translated < abstract_);
        assert!(html.contains("Short &amp; sweet."));
        assert!(html.contains("简短。"));
    }

    #[test]
    fn summary_translation_without_summary_is_not_rendered() {
        let mut it = item();
        it.add_translation(Field::Summary, "zh-CN", "orphan".into());
        let html = describe(&it, &["zh-CN".to_string()]);
        assert!(!html.contains("AI summary"));
        assert!(!html.contains("orphan"));
    }

    #[test]
    fn render_has_item_fields() {
        let build = Utc.with_ymd_and_hms(2025, 10, 3, 10, 0, 0).unwrap();
        let xml = render(&[item()], &meta(), build).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<title>Papers &amp; more</title>"));
        assert!(xml.contains("<title>Attention &lt;is&gt; all &amp; more</title>"));
        assert!(xml.contains("<guid isPermaLink=\"false\">2510.00003</guid>"));
        assert!(xml.contains("<pubDate>Fri, 03 Oct 2025 09:05:00 GMT</pubDate>"));
        assert!(xml.contains("<lastBuildDate>Fri, 03 Oct 2025 10:00:00 GMT</lastBuildDate>"));
        assert!(xml.contains("<![CDATA[<div class=\"paper-content\">"));
        assert!(xml.contains("rel=\"self\""));
    }

    #[test]
    fn render_is_deterministic() {
        let build = Utc.with_ymd_and_hms(2025, 10, 3, 10, 0, 0).unwrap();
        let a = render(&[item()], &meta(), build).unwrap();
        let b = render(&[item()], &meta(), build).unwrap();
        assert_eq!(a, b);
    }
}
