use crate::address;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use quick_xml::writer::Writer;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const APPS_NS: &str = "http://schemas.google.com/apps/2006";
// Gmail assigns real filter ids on import, so generated entries carry
// a placeholder.
const PLACEHOLDER_ID: &str = "tag:mail.google.com,2008:filter:PLACEHOLDER_TEXT";

/// A single filter entry: its ordered `apps:property` list plus the
/// id/updated fields preserved from the source document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterRule {
    pub id: Option<String>,
    pub updated: Option<String>,
    pub properties: Vec<(String, String)>,
}

impl FilterRule {
    /// A rule routing one sender to one label, with the property set
    /// Gmail's own filter export uses.
    pub fn new(address: &str, label: &str, updated: DateTime<Utc>) -> FilterRule {
        let properties = [
            ("from", address),
            ("label", label),
            ("shouldArchive", "true"),
            ("shouldNeverSpam", "true"),
            ("sizeOperator", "s_sl"),
            ("sizeUnit", "s_smb"),
        ];
        FilterRule {
            id: None,
            updated: Some(updated.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            properties: properties
                .iter()
                .map(|&(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        }
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn label(&self) -> Option<&str> {
        self.property("label")
    }
}

/// The filter rule file: Gmail's Atom-feed filter export.
#[derive(Debug, Default)]
pub struct FilterFile {
    pub title: Option<String>,
    pub rules: Vec<FilterRule>,
}

impl FilterFile {
    pub fn load(path: &Path) -> Result<FilterFile> {
        let xml = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        FilterFile::parse(&xml).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn parse(xml: &str) -> Result<FilterFile> {
        #[derive(Clone, Copy)]
        enum Field {
            FeedTitle,
            Id,
            Updated,
        }

        let mut reader = NsReader::from_str(xml);
        let mut file = FilterFile::default();
        let mut entry: Option<FilterRule> = None;
        let mut field: Option<Field> = None;
        loop {
            match reader.read_resolved_event()? {
                (_, Event::Eof) => break,
                (ns, Event::Start(e)) => match e.local_name().as_ref() {
                    b"entry" => entry = Some(FilterRule::default()),
                    b"title" if entry.is_none() => field = Some(Field::FeedTitle),
                    b"id" if entry.is_some() => field = Some(Field::Id),
                    b"updated" if entry.is_some() => field = Some(Field::Updated),
                    b"property" if is_apps(&ns) => {
                        if let (Some(rule), Some(prop)) = (entry.as_mut(), property_of(&e)?) {
                            rule.properties.push(prop);
                        }
                    }
                    _ => {}
                },
                (ns, Event::Empty(e)) => {
                    if e.local_name().as_ref() == b"property" && is_apps(&ns) {
                        if let (Some(rule), Some(prop)) = (entry.as_mut(), property_of(&e)?) {
                            rule.properties.push(prop);
                        }
                    }
                }
                (_, Event::Text(t)) => {
                    if let Some(field) = field.take() {
                        let text = t.unescape()?.trim().to_string();
                        match (field, entry.as_mut()) {
                            (Field::FeedTitle, _) => file.title = Some(text),
                            (Field::Id, Some(rule)) => rule.id = Some(text),
                            (Field::Updated, Some(rule)) => rule.updated = Some(text),
                            _ => {}
                        }
                    }
                }
                (_, Event::End(e)) => match e.local_name().as_ref() {
                    b"entry" => file.rules.extend(entry.take()),
                    b"title" | b"id" | b"updated" => field = None,
                    _ => {}
                },
                _ => {}
            }
        }
        Ok(file)
    }

    /// Normalized addresses across all `from` properties. A property
    /// value may hold several mailboxes joined by ` OR `.
    pub fn senders(&self) -> HashSet<String> {
        self.rules
            .iter()
            .filter_map(|rule| rule.property("from"))
            .flat_map(|value| value.split(" OR "))
            .map(address::sender_address)
            .collect()
    }

    pub fn labels(&self) -> Vec<String> {
        self.rules
            .iter()
            .filter_map(|rule| rule.label())
            .map(str::to_string)
            .collect()
    }

    /// label → raw `from` value, last entry winning per label.
    pub fn label_pairs(&self) -> BTreeMap<String, String> {
        self.rules
            .iter()
            .filter_map(|rule| match (rule.label(), rule.property("from")) {
                (Some(label), Some(from)) => Some((label.to_string(), from.to_string())),
                _ => None,
            })
            .collect()
    }

    pub fn push_rule(&mut self, rule: FilterRule) {
        self.rules.push(rule);
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let xml = self.to_xml()?;
        fs::write(path, xml).with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 3);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let mut feed = BytesStart::new("feed");
        feed.push_attribute(("xmlns", ATOM_NS));
        feed.push_attribute(("xmlns:apps", APPS_NS));
        writer.write_event(Event::Start(feed))?;
        write_text(&mut writer, "title", self.title.as_deref().unwrap_or("Mail Filters"))?;
        for rule in &self.rules {
            writer.write_event(Event::Start(BytesStart::new("entry")))?;
            let mut category = BytesStart::new("category");
            category.push_attribute(("term", "filter"));
            writer.write_event(Event::Empty(category))?;
            write_text(&mut writer, "title", "Mail Filter")?;
            write_text(&mut writer, "id", rule.id.as_deref().unwrap_or(PLACEHOLDER_ID))?;
            if let Some(updated) = &rule.updated {
                write_text(&mut writer, "updated", updated)?;
            }
            writer.write_event(Event::Empty(BytesStart::new("content")))?;
            for (name, value) in &rule.properties {
                let mut prop = BytesStart::new("apps:property");
                prop.push_attribute(("name", name.as_str()));
                prop.push_attribute(("value", value.as_str()));
                writer.write_event(Event::Empty(prop))?;
            }
            writer.write_event(Event::End(BytesEnd::new("entry")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("feed")))?;
        let mut xml = String::from_utf8(writer.into_inner())?;
        xml.push('\n');
        Ok(xml)
    }
}

fn is_apps(ns: &ResolveResult) -> bool {
    matches!(ns, ResolveResult::Bound(Namespace(n)) if *n == APPS_NS.as_bytes())
}

fn property_of(e: &BytesStart) -> Result<Option<(String, String)>> {
    let name = e.try_get_attribute("name")?;
    let value = e.try_get_attribute("value")?;
    match (name, value) {
        (Some(name), Some(value)) => Ok(Some((
            name.unescape_value()?.into_owned(),
            value.unescape_value()?.into_owned(),
        ))),
        _ => Ok(None),
    }
}

fn write_text(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Changes between two label→from maps.
#[derive(Debug, Default, PartialEq)]
pub struct FilterDiff {
    pub additions: BTreeMap<String, String>,
    pub deletions: BTreeMap<String, String>,
    pub modifications: BTreeMap<String, (String, String)>,
}

impl FilterDiff {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.deletions.is_empty() && self.modifications.is_empty()
    }
}

impl fmt::Display for FilterDiff {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "no changes");
        }
        let mut lines = Vec::new();
        for (label, from) in &self.additions {
            lines.push(format!("+ label {:?}: {}", label, from));
        }
        for (label, from) in &self.deletions {
            lines.push(format!("- label {:?}: {}", label, from));
        }
        for (label, (old, new)) in &self.modifications {
            lines.push(format!("~ label {:?}: {} -> {}", label, old, new));
        }
        write!(f, "{}", lines.join("\n"))
    }
}

pub fn diff(old: &BTreeMap<String, String>, new: &BTreeMap<String, String>) -> FilterDiff {
    let mut result = FilterDiff::default();
    for (label, from) in new {
        match old.get(label) {
            None => {
                result.additions.insert(label.clone(), from.clone());
            }
            Some(prev) if prev != from => {
                result
                    .modifications
                    .insert(label.clone(), (prev.clone(), from.clone()));
            }
            Some(_) => {}
        }
    }
    for (label, from) in old {
        if !new.contains_key(label) {
            result.deletions.insert(label.clone(), from.clone());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:apps="http://schemas.google.com/apps/2006">
   <title>Mail Filters</title>
   <entry>
      <category term="filter"/>
      <title>Mail Filter</title>
      <id>tag:mail.google.com,2008:filter:1111</id>
      <updated>2023-01-01T00:00:00Z</updated>
      <content/>
      <apps:property name="from" value="News Desk &lt;news@example.com&gt; OR digest@example.org"/>
      <apps:property name="label" value="News"/>
      <apps:property name="shouldArchive" value="true"/>
   </entry>
   <entry>
      <category term="filter"/>
      <title>Mail Filter</title>
      <id>tag:mail.google.com,2008:filter:2222</id>
      <updated>2023-01-02T00:00:00Z</updated>
      <content/>
      <apps:property name="from" value="alerts@example.net"/>
      <apps:property name="label" value="Alerts"/>
   </entry>
</feed>
"#;

    #[test]
    fn test_parse() {
        let file = FilterFile::parse(SAMPLE).unwrap();
        assert_eq!(file.title.as_deref(), Some("Mail Filters"));
        assert_eq!(file.rules.len(), 2);
        assert_eq!(
            file.rules[0].id.as_deref(),
            Some("tag:mail.google.com,2008:filter:1111")
        );
        assert_eq!(file.rules[0].label(), Some("News"));
        assert_eq!(file.rules[0].property("shouldArchive"), Some("true"));
        assert_eq!(file.rules[1].updated.as_deref(), Some("2023-01-02T00:00:00Z"));
    }

    #[test]
    fn test_senders() {
        let file = FilterFile::parse(SAMPLE).unwrap();
        let senders = file.senders();
        assert_eq!(senders.len(), 3);
        assert!(senders.contains("news@example.com"));
        assert!(senders.contains("digest@example.org"));
        assert!(senders.contains("alerts@example.net"));
    }

    #[test]
    fn test_label_pairs() {
        let file = FilterFile::parse(SAMPLE).unwrap();
        let pairs = file.label_pairs();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs["Alerts"], "alerts@example.net");
    }

    #[test]
    fn test_merge_and_reparse() {
        let mut file = FilterFile::parse(SAMPLE).unwrap();
        let updated = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        file.push_rule(FilterRule::new("spam&co@example.com", "Junk <1>", updated));
        let xml = file.to_xml().unwrap();
        // Escaped on the way out, restored on the way back in.
        assert!(xml.contains("spam&amp;co@example.com"));
        assert!(xml.contains("Junk &lt;1&gt;"));

        let reparsed = FilterFile::parse(&xml).unwrap();
        assert_eq!(reparsed.rules.len(), 3);
        let rule = &reparsed.rules[2];
        assert_eq!(rule.property("from"), Some("spam&co@example.com"));
        assert_eq!(rule.label(), Some("Junk <1>"));
        assert_eq!(rule.updated.as_deref(), Some("2024-06-01T12:00:00Z"));
        assert_eq!(rule.property("sizeOperator"), Some("s_sl"));
        // The placeholder id survives the round trip.
        assert_eq!(rule.id.as_deref(), Some(PLACEHOLDER_ID));
    }

    #[test]
    fn test_diff() {
        fn pairs(items: &[(&str, &str)]) -> BTreeMap<String, String> {
            items
                .iter()
                .map(|&(l, f)| (l.to_string(), f.to_string()))
                .collect()
        }

        let old = pairs(&[("News", "news@example.com"), ("Alerts", "alerts@example.net")]);
        let new = pairs(&[
            ("News", "news@example.com OR digest@example.org"),
            ("Junk", "spam@example.com"),
        ]);
        let diff = diff(&old, &new);
        assert_eq!(diff.additions, pairs(&[("Junk", "spam@example.com")]));
        assert_eq!(diff.deletions, pairs(&[("Alerts", "alerts@example.net")]));
        assert_eq!(
            diff.modifications["News"],
            (
                "news@example.com".to_string(),
                "news@example.com OR digest@example.org".to_string()
            )
        );

        let same = diff_is_empty_case(&new);
        assert!(same.is_empty());
        assert_eq!(same.to_string(), "no changes");
    }

    fn diff_is_empty_case(pairs: &BTreeMap<String, String>) -> FilterDiff {
        diff(pairs, pairs)
    }
}
