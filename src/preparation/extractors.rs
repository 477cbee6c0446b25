//! Extractors: pure walks over the parsed export document
//!
//! Each extractor yields `(group, key, record)` triples for the groups it
//! owns. Extraction is deterministic and stateless; a missing expected field in
//! a source element is a hard error rather than a silently dropped record,
//! because downstream builders assume required fields are present.

use super::parser::{Document, Element};
use crate::types::{groups, Record};
use thiserror::Error;

/// Errors raised while walking the parsed document
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    /// A source element lacks a field the record requires
    #[error("{element} element is missing required field '{field}'")]
    MissingField {
        element: &'static str,
        field: &'static str,
    },
}

/// One record category's extraction pass.
///
/// Yields `(group, key, record)` triples. Every group name appearing in the
/// output is owned by exactly one extractor, so group partitioning across the
/// merged result is disjoint by construction. Within a group, a key repeated
/// across passes replaces the earlier record (last write wins).
pub trait Extractor {
    fn extract(&self, document: &Document)
        -> Result<Vec<(&'static str, String, Record)>, ExtractError>;
}

/// Extractors in their fixed run order
pub fn default_extractors() -> Vec<Box<dyn Extractor>> {
    vec![
        Box::new(SectionExtractor),
        Box::new(ItemExtractor),
        Box::new(AuthorExtractor),
    ]
}

fn required<'a>(
    parent: &'a Element,
    element: &'static str,
    tag: &str,
    field: &'static str,
) -> Result<&'a str, ExtractError> {
    parent
        .child(tag)
        .map(Element::trimmed_text)
        .ok_or(ExtractError::MissingField { element, field })
}

/// `wp:category` elements -> `sections` group, keyed by section url
pub struct SectionExtractor;

impl Extractor for SectionExtractor {
    fn extract(
        &self,
        document: &Document,
    ) -> Result<Vec<(&'static str, String, Record)>, ExtractError> {
        let mut pairs = Vec::new();
        for category in document.root.descendants_named("wp:category") {
            let title = required(category, "wp:category", "wp:cat_name", "title")?;
            let url = required(category, "wp:category", "wp:category_nicename", "url")?;

            let mut record = Record::new();
            record.insert("title", title);
            record.insert("url", url);
            pairs.push((groups::SECTIONS, url.to_string(), record));
        }
        Ok(pairs)
    }
}

/// `item` elements -> `posts` or `attachments` group, both keyed by post id
///
/// Attachments carry the source media URL plus caption/credit text; every
/// other item type lands in `posts` (the post/page allow-list is applied at
/// import time, not here).
pub struct ItemExtractor;

impl Extractor for ItemExtractor {
    fn extract(
        &self,
        document: &Document,
    ) -> Result<Vec<(&'static str, String, Record)>, ExtractError> {
        let mut pairs = Vec::new();
        for item in document.root.descendants_named("item") {
            let id = required(item, "item", "wp:post_id", "id")?;
            let post_type = required(item, "item", "wp:post_type", "type")?;

            let mut record = Record::new();
            record.insert("id", id);

            if post_type == "attachment" {
                record.insert("url", required(item, "item", "wp:attachment_url", "url")?);
                record.insert("content", required(item, "item", "content:encoded", "content")?);
                record.insert("excerpt", required(item, "item", "excerpt:encoded", "excerpt")?);
                pairs.push((groups::ATTACHMENTS, id.to_string(), record));
                continue;
            }

            record.insert("type", post_type);
            record.insert("title", required(item, "item", "title", "title")?);
            record.insert("status", required(item, "item", "wp:status", "status")?);
            record.insert("content", required(item, "item", "content:encoded", "content")?);
            record.insert("excerpt", required(item, "item", "excerpt:encoded", "excerpt")?);
            record.insert("author", required(item, "item", "dc:creator", "author")?);

            if let Some(link) = item.child("link") {
                record.insert("link", link.trimmed_text());
            }
            if let Some(date) = item.child("wp:post_date") {
                record.insert("date", date.trimmed_text());
            }
            if let Some(section) = item
                .children_named("category")
                .find(|c| c.attr("domain") == Some("category"))
                .and_then(|c| c.attr("nicename"))
            {
                record.insert("section", section);
            }

            pairs.push((groups::POSTS, id.to_string(), record));
        }
        Ok(pairs)
    }
}

/// `wp:author` elements -> `authors` group, keyed by `id:login`
pub struct AuthorExtractor;

impl Extractor for AuthorExtractor {
    fn extract(
        &self,
        document: &Document,
    ) -> Result<Vec<(&'static str, String, Record)>, ExtractError> {
        let mut pairs = Vec::new();
        for author in document.root.descendants_named("wp:author") {
            let id = required(author, "wp:author", "wp:author_id", "id")?;
            let login = required(author, "wp:author", "wp:author_login", "login")?;

            let mut record = Record::new();
            record.insert("id", id);
            record.insert("login", login);
            record.insert("email", required(author, "wp:author", "wp:author_email", "email")?);
            record.insert(
                "first_name",
                required(author, "wp:author", "wp:author_first_name", "first_name")?,
            );
            record.insert(
                "last_name",
                required(author, "wp:author", "wp:author_last_name", "last_name")?,
            );
            if let Some(display) = author.child("wp:author_display_name") {
                record.insert("display_name", display.trimmed_text());
            }

            pairs.push((groups::AUTHORS, format!("{id}:{login}"), record));
        }
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preparation::parser::XmlParser;

    pub(crate) const FIXTURE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss xmlns:wp="http://wordpress.org/export/1.2/"
     xmlns:dc="http://purl.org/dc/elements/1.1/"
     xmlns:content="http://purl.org/rss/1.0/modules/content/"
     xmlns:excerpt="http://wordpress.org/export/1.2/excerpt/">
  <channel>
    <title>Example Blog</title>
    <wp:category>
      <wp:term_id>3</wp:term_id>
      <wp:category_nicename>news</wp:category_nicename>
      <wp:cat_name><![CDATA[News]]></wp:cat_name>
    </wp:category>
    <wp:category>
      <wp:term_id>4</wp:term_id>
      <wp:category_nicename>opinion</wp:category_nicename>
      <wp:cat_name><![CDATA[Opinion]]></wp:cat_name>
    </wp:category>
    <wp:author>
      <wp:author_id>2</wp:author_id>
      <wp:author_login><![CDATA[jane.doe smith]]></wp:author_login>
      <wp:author_email><![CDATA[jane@example.com]]></wp:author_email>
      <wp:author_display_name><![CDATA[Jane Doe]]></wp:author_display_name>
      <wp:author_first_name><![CDATA[Jane]]></wp:author_first_name>
      <wp:author_last_name><![CDATA[Doe]]></wp:author_last_name>
    </wp:author>
    <item>
      <title>Hello World</title>
      <link>https://blog.example.com/hello-world/</link>
      <dc:creator><![CDATA[jane.doe smith]]></dc:creator>
      <content:encoded><![CDATA[<p>First post.</p>]]></content:encoded>
      <excerpt:encoded><![CDATA[]]></excerpt:encoded>
      <wp:post_id>10</wp:post_id>
      <wp:post_date><![CDATA[2015-03-01 09:00:00]]></wp:post_date>
      <wp:status><![CDATA[publish]]></wp:status>
      <wp:post_type><![CDATA[post]]></wp:post_type>
      <category domain="category" nicename="news"><![CDATA[News]]></category>
    </item>
    <item>
      <title>banner.gif</title>
      <link>https://blog.example.com/hello-world/banner-gif/</link>
      <dc:creator><![CDATA[jane.doe smith]]></dc:creator>
      <content:encoded><![CDATA[The banner]]></content:encoded>
      <excerpt:encoded><![CDATA[Staff photo]]></excerpt:encoded>
      <wp:post_id>11</wp:post_id>
      <wp:status><![CDATA[inherit]]></wp:status>
      <wp:post_type><![CDATA[attachment]]></wp:post_type>
      <wp:attachment_url><![CDATA[https://blog.example.com/wp-content/uploads/banner.gif]]></wp:attachment_url>
    </item>
    <item>
      <title>Menu entry</title>
      <dc:creator><![CDATA[jane.doe smith]]></dc:creator>
      <content:encoded><![CDATA[]]></content:encoded>
      <excerpt:encoded><![CDATA[]]></excerpt:encoded>
      <wp:post_id>12</wp:post_id>
      <wp:status><![CDATA[publish]]></wp:status>
      <wp:post_type><![CDATA[nav_menu_item]]></wp:post_type>
    </item>
  </channel>
</rss>
"#;

    fn fixture() -> Document {
        XmlParser::new().parse(FIXTURE_XML.as_bytes()).unwrap()
    }

    #[test]
    fn test_section_extraction() {
        let doc = fixture();
        let pairs = SectionExtractor.extract(&doc).unwrap();

        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, groups::SECTIONS);
        assert_eq!(pairs[0].1, "news");
        assert_eq!(pairs[0].2.get_str("title"), Some("News"));
        assert_eq!(pairs[1].2.get_str("url"), Some("opinion"));
    }

    #[test]
    fn test_item_extraction_splits_posts_and_attachments() {
        let doc = fixture();
        let pairs = ItemExtractor.extract(&doc).unwrap();
        assert_eq!(pairs.len(), 3);

        let (group, key, post) = &pairs[0];
        assert_eq!(*group, groups::POSTS);
        assert_eq!(key, "10");
        assert_eq!(post.get_str("id"), Some("10"));
        assert_eq!(post.get_str("type"), Some("post"));
        assert_eq!(post.get_str("author"), Some("jane.doe smith"));
        assert_eq!(post.get_str("section"), Some("news"));
        assert_eq!(post.get_str("content"), Some("<p>First post.</p>"));

        let (group, _, attachment) = &pairs[1];
        assert_eq!(*group, groups::ATTACHMENTS);
        assert_eq!(
            attachment.get_str("url"),
            Some("https://blog.example.com/wp-content/uploads/banner.gif")
        );
        assert_eq!(attachment.get_str("content"), Some("The banner"));
        assert_eq!(attachment.get_str("excerpt"), Some("Staff photo"));

        let (group, _, other) = &pairs[2];
        assert_eq!(*group, groups::POSTS);
        assert_eq!(other.get_str("type"), Some("nav_menu_item"));
    }

    #[test]
    fn test_author_extraction() {
        let doc = fixture();
        let pairs = AuthorExtractor.extract(&doc).unwrap();

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, groups::AUTHORS);
        assert_eq!(pairs[0].1, "2:jane.doe smith");
        let author = &pairs[0].2;
        assert_eq!(author.get_str("login"), Some("jane.doe smith"));
        assert_eq!(author.get_str("email"), Some("jane@example.com"));
        assert_eq!(author.get_str("first_name"), Some("Jane"));
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let doc = fixture();
        for extractor in default_extractors() {
            let first = extractor.extract(&doc).unwrap();
            let second = extractor.extract(&doc).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_missing_required_field_is_a_hard_error() {
        let xml = r#"<rss xmlns:wp="http://wordpress.org/export/1.2/">
          <channel>
            <item>
              <title>No id</title>
              <wp:post_type>post</wp:post_type>
            </item>
          </channel>
        </rss>"#;
        let doc = XmlParser::new().parse(xml.as_bytes()).unwrap();

        let err = ItemExtractor.extract(&doc).unwrap_err();
        assert_eq!(
            err,
            ExtractError::MissingField {
                element: "item",
                field: "id"
            }
        );
    }
}
