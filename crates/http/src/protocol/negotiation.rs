//! Quality-value lists: `Accept`, `Accept-Language`, `Accept-Charset`, `Accept-Encoding`.

use std::str::FromStr;

use mime::Mime;

/// One entry of a quality-value list, e.g. `en-US;q=0.8`.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityItem {
    /// The entry without its `q` parameter; other parameters are kept.
    pub value: String,
    pub quality: f32,
}

/// Parses a comma separated quality-value list.
///
/// Entries come back ordered by descending quality, keeping header order for ties.
/// Entries with `q=0` or an unparsable `q` are dropped.
pub fn parse_quality_list(header: &str) -> Vec<QualityItem> {
    let mut items: Vec<QualityItem> = header.split(',').filter_map(parse_item).collect();
    // sort_by is stable, so equal qualities stay in header order
    items.sort_by(|a, b| b.quality.total_cmp(&a.quality));
    items
}

fn parse_item(raw: &str) -> Option<QualityItem> {
    let mut quality = 1.0_f32;
    let mut value = String::new();

    for (index, part) in raw.split(';').map(str::trim).enumerate() {
        if index == 0 {
            if part.is_empty() {
                return None;
            }
            value.push_str(part);
            continue;
        }

        match part.split_once('=') {
            Some((name, q)) if name.trim().eq_ignore_ascii_case("q") => {
                quality = f32::from_str(q.trim()).ok().filter(|q| (0.0..=1.0).contains(q))?;
            }
            _ if part.is_empty() => {}
            _ => {
                value.push(';');
                value.push_str(part);
            }
        }
    }

    (quality > 0.0).then_some(QualityItem { value, quality })
}

/// Parses an `Accept` header into media types, most preferred first.
///
/// Entries that are not valid media types are skipped.
pub fn parse_accept(header: &str) -> Vec<Mime> {
    parse_quality_list(header).into_iter().filter_map(|item| Mime::from_str(&item.value).ok()).collect()
}

/// Picks the first of `available` (in preference order of `accepted`) that the client accepts.
///
/// `*/*` and `type/*` wildcards are honoured.
pub fn negotiate_media<'a>(accepted: &[Mime], available: &[&'a str]) -> Option<&'a str> {
    accepted.iter().find_map(|wanted| {
        available.iter().copied().find(|candidate| {
            let Ok(candidate) = Mime::from_str(candidate) else {
                return false;
            };
            (wanted.type_() == mime::STAR || wanted.type_() == candidate.type_())
                && (wanted.subtype() == mime::STAR || wanted.subtype() == candidate.subtype())
        })
    })
}

/// Like [`negotiate_media`] for plain tokens such as languages or charsets.
///
/// Matching is case-insensitive; `*` matches anything and a language range such as
/// `en` matches `en-US`.
pub fn negotiate_token<'a>(accepted: &[QualityItem], available: &[&'a str]) -> Option<&'a str> {
    accepted.iter().find_map(|wanted| {
        available.iter().copied().find(|candidate| {
            wanted.value == "*"
                || wanted.value.eq_ignore_ascii_case(candidate)
                || (candidate
                    .get(..wanted.value.len())
                    .is_some_and(|prefix| prefix.eq_ignore_ascii_case(&wanted.value))
                    && candidate.as_bytes().get(wanted.value.len()) == Some(&b'-'))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_quality() {
        let items = parse_quality_list("da, en-gb;q=0.8, en;q=0.7, fr;q=0.8");
        let values: Vec<_> = items.iter().map(|item| item.value.as_str()).collect();

        assert_eq!(values, ["da", "en-gb", "fr", "en"]);
        assert_eq!(items[1].quality, 0.8);
    }

    #[test]
    fn drops_zero_and_invalid_quality() {
        let items = parse_quality_list("gzip;q=0, br;q=abc, zstd;q=1.5, deflate, ,identity;q=0.1");
        let values: Vec<_> = items.iter().map(|item| item.value.as_str()).collect();

        assert_eq!(values, ["deflate", "identity"]);
    }

    #[test]
    fn keeps_media_parameters() {
        let accepts = parse_accept("text/html;level=1;q=0.5, application/json");

        assert_eq!(accepts.len(), 2);
        assert_eq!(accepts[0], mime::APPLICATION_JSON);
        assert_eq!(accepts[1].essence_str(), "text/html");
        assert_eq!(accepts[1].get_param("level").map(|v| v.as_str()), Some("1"));
    }

    #[test]
    fn browser_accept_header() {
        let accepts = parse_accept(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8,application/signed-exchange;v=b3;q=0.9",
        );
        let essences: Vec<_> = accepts.iter().map(Mime::essence_str).collect();

        assert_eq!(
            essences,
            ["text/html", "application/xhtml+xml", "image/webp", "application/xml", "application/signed-exchange", "*/*"]
        );
    }

    #[test]
    fn unparsable_accept_is_empty() {
        assert!(parse_accept("").is_empty());
        assert!(parse_accept("not a mime, ;q=1").is_empty());
    }

    #[test]
    fn negotiates_media_with_wildcards() {
        let accepts = parse_accept("application/json;q=0.5, text/*");

        assert_eq!(negotiate_media(&accepts, &["application/json", "text/html"]), Some("text/html"));
        assert_eq!(negotiate_media(&accepts, &["application/json"]), Some("application/json"));
        assert_eq!(negotiate_media(&accepts, &["image/png"]), None);
        assert_eq!(negotiate_media(&parse_accept("*/*"), &["image/png"]), Some("image/png"));
    }

    #[test]
    fn negotiates_tokens() {
        let languages = parse_quality_list("pt-BR, en;q=0.5");

        assert_eq!(negotiate_token(&languages, &["en-US", "pt-br"]), Some("pt-br"));
        assert_eq!(negotiate_token(&languages, &["en-US", "de"]), Some("en-US"));
        assert_eq!(negotiate_token(&languages, &["english"]), None);
        assert_eq!(negotiate_token(&parse_quality_list("*"), &["de"]), Some("de"));
    }
}
