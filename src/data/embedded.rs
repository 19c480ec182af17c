//! Embedded-JSON extractor.
//!
//! Many racing pages ship their data as a JSON island inside a
//! `<script id="...">` tag. This extractor locates the island by its id and
//! deserializes it straight into the raw record types.

use serde::de::DeserializeOwned;
use tracing::debug;

use super::{ExtractError, Extractor};
use crate::acquisition::Page;
use crate::types::{FormCard, PriceCard};

pub struct EmbeddedJsonExtractor {
    price_marker: String,
    form_marker: String,
}

impl EmbeddedJsonExtractor {
    pub fn new(price_marker: impl Into<String>, form_marker: impl Into<String>) -> Self {
        Self {
            price_marker: price_marker.into(),
            form_marker: form_marker.into(),
        }
    }

    fn island<T: DeserializeOwned>(page: &Page, marker: &str) -> Result<T, ExtractError> {
        let json = find_island(&page.body, marker)
            .ok_or_else(|| ExtractError::NotFound(format!("script#{marker}")))?;
        serde_json::from_str(json).map_err(|e| ExtractError::Malformed(format!("script#{marker}: {e}")))
    }
}

impl Extractor for EmbeddedJsonExtractor {
    fn extract_prices(&self, page: &Page) -> Result<PriceCard, ExtractError> {
        let card: PriceCard = Self::island(page, &self.price_marker)?;
        if card.runners.is_empty() {
            return Err(ExtractError::Empty);
        }
        debug!(
            race = %card.race_name,
            runners = card.runners.len(),
            bookmakers = card.bookmakers.len(),
            "Price card extracted"
        );
        Ok(card)
    }

    fn extract_form(&self, page: &Page) -> Result<FormCard, ExtractError> {
        let card: FormCard = Self::island(page, &self.form_marker)?;
        if card.runners.is_empty() {
            return Err(ExtractError::Empty);
        }
        debug!(runners = card.runners.len(), going = ?card.going, "Form card extracted");
        Ok(card)
    }
}

/// Body of the first `<script>` tag whose `id` attribute equals `marker`.
fn find_island<'a>(html: &'a str, marker: &str) -> Option<&'a str> {
    let needles = [format!("id=\"{marker}\""), format!("id='{marker}'")];
    let mut cursor = 0;

    while let Some(rel) = html[cursor..].find("<script") {
        let tag_start = cursor + rel;
        let tag_end = tag_start + html[tag_start..].find('>')?;
        let tag = &html[tag_start..tag_end];
        let content_start = tag_end + 1;

        if needles.iter().any(|n| tag.contains(n.as_str())) {
            let close = html[content_start..].find("</script>")?;
            return Some(html[content_start..content_start + close].trim());
        }
        cursor = content_start;
    }
    None
}
