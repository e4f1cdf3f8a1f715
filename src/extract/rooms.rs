use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::extract::embedded::parse_loose_number;
use crate::scraper::config::SelectorSettings;
use crate::scraper::types::RoomType;

/// Room blocks examined per page
pub const MAX_ROOM_BLOCKS: usize = 10;

/// Description keywords marking a breakfast-inclusive rate
pub const BREAKFAST_KEYWORDS: &[&str] = &["breakfast", "ארוחת בוקר", "כולל ארוחה"];

static NO_AVAILABILITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)no availability|sold out|not available").expect("availability pattern should compile")
});

/// Markup fragments of common challenge widgets
const CHALLENGE_MARKUP: &[&str] = &["g-recaptcha", "h-captcha", "cf-challenge", "px-captcha", "challenge-form"];

/// Visible text shown by interstitial block pages
const CHALLENGE_TEXT: &[&str] = &[
    "are you a robot",
    "verify you are human",
    "unusual traffic",
    "access denied",
    "checking your browser",
];

/// One room row found on a listing page
#[derive(Debug, Clone, PartialEq)]
pub struct RoomBlock {
    /// Room name, lower-cased
    pub description: String,
    pub room_type: RoomType,

    /// Price read from the block's price elements
    pub price: Option<f64>,

    pub currency: String,

    /// Full visible text of the block
    pub text: String,
}

/// What a rendered listing page shows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageAnalysis {
    /// Challenge marker, when the page is a bot-defense interstitial
    pub blocked: Option<String>,

    /// The page states there is nothing to book
    pub sold_out: bool,

    pub rooms: Vec<RoomBlock>,
}

/// Read availability and room blocks out of page markup.
pub fn analyze_page(markup: &str, selectors: &SelectorSettings, base_currency: &str) -> PageAnalysis {
    let document = Html::parse_document(markup);
    let text = element_text(document.root_element());

    let sold_out = NO_AVAILABILITY.is_match(&text)
        || parse_selectors(&selectors.availability)
            .iter()
            .any(|selector| document.select(selector).next().is_some());

    let rooms = if sold_out {
        Vec::new()
    } else {
        extract_rooms(&document, selectors, base_currency)
    };

    let blocked = if rooms.is_empty() && !sold_out {
        challenge_marker(markup, &text)
    } else {
        None
    };

    debug!(
        "Page analysis: {} room block(s), sold_out={}, blocked={:?}",
        rooms.len(),
        sold_out,
        blocked
    );

    PageAnalysis {
        blocked,
        sold_out,
        rooms,
    }
}

fn extract_rooms(document: &Html, selectors: &SelectorSettings, base_currency: &str) -> Vec<RoomBlock> {
    // A combined selector yields matches once each, in document order
    let Some(block_selector) = combined_selector(&selectors.room_blocks) else {
        return Vec::new();
    };
    let name_selectors = parse_selectors(&selectors.room_name);
    let price_selectors = parse_selectors(&selectors.price);

    document
        .select(&block_selector)
        .take(MAX_ROOM_BLOCKS)
        .map(|block| {
            let description = name_selectors
                .iter()
                .find_map(|selector| block.select(selector).next())
                .map(|name| element_text(name).to_lowercase())
                .unwrap_or_default();

            let price = price_selectors.iter().find_map(|selector| {
                let element = block.select(selector).next()?;
                let text = element_text(element);
                if !text.chars().any(|c| c.is_ascii_digit()) {
                    return None;
                }
                parse_loose_number(&text).filter(|p| *p > 0.0)
            });

            let text = element_text(block);

            RoomBlock {
                room_type: classify_room(&description),
                currency: detect_currency(&text, base_currency),
                description,
                price,
                text,
            }
        })
        .collect()
}

/// Breakfast-inclusive when the description mentions breakfast
pub fn classify_room(description: &str) -> RoomType {
    let description = description.to_lowercase();
    if BREAKFAST_KEYWORDS.iter().any(|k| description.contains(k)) {
        RoomType::WithBreakfast
    } else {
        RoomType::RoomOnly
    }
}

/// Currency code from symbols or codes in `text`
pub fn detect_currency(text: &str, default: &str) -> String {
    let code = if text.contains('₪') || text.contains("ILS") {
        "ILS"
    } else if text.contains('$') || text.contains("USD") {
        "USD"
    } else if text.contains('€') || text.contains("EUR") {
        "EUR"
    } else {
        default
    };
    code.to_string()
}

fn challenge_marker(markup: &str, text: &str) -> Option<String> {
    let text = text.to_lowercase();
    CHALLENGE_TEXT
        .iter()
        .find(|phrase| text.contains(*phrase))
        .or_else(|| CHALLENGE_MARKUP.iter().find(|marker| markup.contains(*marker)))
        .map(|marker| marker.to_string())
}

/// Text content of `element`, skipping script and style bodies.
pub fn element_text(element: ElementRef) -> String {
    let mut parts = Vec::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element())
            .map_or(false, |e| matches!(e.name(), "script" | "style" | "noscript"));
        let text = text.trim();
        if !hidden && !text.is_empty() {
            parts.push(text);
        }
    }
    parts.join(" ")
}

fn parse_selectors(list: &[String]) -> Vec<Selector> {
    list.iter()
        .filter_map(|raw| match Selector::parse(raw) {
            Ok(selector) => Some(selector),
            Err(e) => {
                warn!("Ignoring invalid selector {:?}: {:?}", raw, e);
                None
            }
        })
        .collect()
}

fn combined_selector(list: &[String]) -> Option<Selector> {
    if list.is_empty() {
        return None;
    }
    Selector::parse(&list.join(", ")).ok()
}

/// Check that every selector parses
pub fn validate_selectors(list: &[String]) -> Result<(), String> {
    for raw in list {
        if let Err(e) = Selector::parse(raw) {
            return Err(format!("invalid selector {:?}: {:?}", raw, e));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(rows: &str) -> String {
        format!(
            r#"<html><body><h1>Dan Panorama</h1><table class="hprt-table">{}</table></body></html>"#,
            rows
        )
    }

    #[test]
    fn test_classifies_and_prices_room_blocks() {
        let markup = listing(
            r#"
<tr class="hprt-table-row">
  <td><a class="hprt-roomtype-icon-link">Deluxe Double Room</a></td>
  <td><span class="prco-valign-middle-helper">₪ 1,250</span></td>
</tr>
<tr class="hprt-table-row">
  <td><a class="hprt-roomtype-icon-link">Deluxe Double Room - Breakfast included</a></td>
  <td><span class="prco-valign-middle-helper">₪ 1,420</span></td>
</tr>
<tr class="hprt-table-row">
  <td><span class="room-name">חדר זוגי כולל ארוחת בוקר</span></td>
  <td><span class="bui-price-display__value">US$310</span></td>
</tr>
"#,
        );

        let analysis = analyze_page(&markup, &SelectorSettings::default(), "ILS");
        assert!(!analysis.sold_out);
        assert!(analysis.blocked.is_none());
        assert_eq!(analysis.rooms.len(), 3);

        assert_eq!(analysis.rooms[0].room_type, RoomType::RoomOnly);
        assert_eq!(analysis.rooms[0].price, Some(1250.0));
        assert_eq!(analysis.rooms[0].currency, "ILS");

        assert_eq!(analysis.rooms[1].room_type, RoomType::WithBreakfast);
        assert_eq!(analysis.rooms[1].price, Some(1420.0));

        assert_eq!(analysis.rooms[2].room_type, RoomType::WithBreakfast);
        assert_eq!(analysis.rooms[2].price, Some(310.0));
        assert_eq!(analysis.rooms[2].currency, "USD");
    }

    #[test]
    fn test_no_availability_text() {
        let markup = listing(r#"<tr><td>Sorry, this property is SOLD OUT on your dates</td></tr>"#);
        let analysis = analyze_page(&markup, &SelectorSettings::default(), "ILS");

        assert!(analysis.sold_out);
        assert!(analysis.rooms.is_empty());
        assert!(analysis.blocked.is_none());
    }

    #[test]
    fn test_availability_selector_marks_sold_out() {
        let mut selectors = SelectorSettings::default();
        selectors.availability = vec![".soldout-banner".to_string()];

        let markup = listing(r#"<tr><td class="soldout-banner">Nothing left</td></tr>"#);
        assert!(analyze_page(&markup, &selectors, "ILS").sold_out);
    }

    #[test]
    fn test_script_text_is_not_visible() {
        let markup = r#"<html><body><script>var msg = "sold out";</script><div class="room-block">
<span class="room-name">Standard</span><span class="bui-price-display__value">€ 99</span></div></body></html>"#;
        let analysis = analyze_page(markup, &SelectorSettings::default(), "ILS");

        assert!(!analysis.sold_out);
        assert_eq!(analysis.rooms.len(), 1);
        assert_eq!(analysis.rooms[0].currency, "EUR");
    }

    #[test]
    fn test_challenge_page_is_blocked() {
        let markup = r#"<html><body><div class="g-recaptcha"></div><p>Are you a robot?</p></body></html>"#;
        let analysis = analyze_page(markup, &SelectorSettings::default(), "ILS");

        assert_eq!(analysis.blocked.as_deref(), Some("are you a robot"));
        assert!(analysis.rooms.is_empty());
    }

    #[test]
    fn test_block_cap_and_missing_prices() {
        let rows = (0..15)
            .map(|i| format!(r#"<div class="room-block"><span class="room-name">Room {}</span></div>"#, i))
            .collect::<String>();
        let markup = format!("<html><body>{}</body></html>", rows);

        let analysis = analyze_page(&markup, &SelectorSettings::default(), "ILS");
        assert_eq!(analysis.rooms.len(), MAX_ROOM_BLOCKS);
        assert!(analysis.rooms.iter().all(|room| room.price.is_none()));
    }

    #[test]
    fn test_currency_default_and_validation() {
        assert_eq!(detect_currency("120 per night", "GBP"), "GBP");
        assert_eq!(classify_room("Room Only, Free cancellation"), RoomType::RoomOnly);
        assert!(validate_selectors(&["div.ok".to_string()]).is_ok());
        assert!(validate_selectors(&["div[".to_string()]).is_err());
    }
}
