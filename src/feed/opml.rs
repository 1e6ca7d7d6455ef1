use opml::{Outline, OPML};

use crate::error::Result;

/// Collect the `xmlUrl` of every outline, nested ones included, in document
/// order.
pub fn feed_urls(xml: &str) -> Result<Vec<String>> {
    let document = OPML::from_str(xml)?;
    let mut urls = Vec::new();
    collect(&document.body.outlines, &mut urls);
    Ok(urls)
}

fn collect(outlines: &[Outline], urls: &mut Vec<String>) {
    for outline in outlines {
        if let Some(url) = outline.xml_url.as_deref().map(str::trim) {
            if !url.is_empty() {
                urls.push(url.to_string());
            }
        }
        collect(&outline.outlines, urls);
    }
}
