//! Scanning an HTML embed page into a [`StaticPage`]

use regex::Regex;
use widget_core::bootstrap::StaticPage;

/// Collect every element carrying an `id` attribute, with all its attributes.
pub fn scan_html(html: &str) -> Result<StaticPage, regex::Error> {
    let tag = Regex::new(r"<[A-Za-z][A-Za-z0-9-]*(\s[^>]*)?>")?;
    let attr = Regex::new(r#"([A-Za-z_:][A-Za-z0-9_:.-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)?;

    let mut page = StaticPage::new();
    for tag_match in tag.captures_iter(html) {
        let Some(attrs) = tag_match.get(1) else {
            continue;
        };

        let pairs: Vec<(String, String)> = attr
            .captures_iter(attrs.as_str())
            .filter_map(|c| {
                let name = c.get(1)?.as_str().to_ascii_lowercase();
                let value = c.get(2).or_else(|| c.get(3))?.as_str();
                Some((name, decode_entities(value)))
            })
            .collect();

        let Some((_, id)) = pairs.iter().find(|(name, _)| name == "id") else {
            continue;
        };
        page.add_element(id);
        for (name, value) in &pairs {
            page.set_attribute(id, name, value);
        }
    }

    Ok(page)
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
