//! URL handling module for Insurwatch
//!
//! Link resolution for extracted items and search URL construction for query-driven sources.

use url::Url;

/// Resolves an extracted href against a source's base URL
///
/// Returns None if the link should be excluded:
/// - empty hrefs and fragment-only anchors
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - invalid URLs, or non-HTTP(S) URLs after resolution
///
/// The fragment of a resolved link is dropped so that the same article reached through
/// different anchors yields a single identity key.
///
/// # Examples
///
/// ```
/// use insurwatch::url::resolve_link;
/// use url::Url;
///
/// let base = Url::parse("https://cafef.vn").unwrap();
/// assert_eq!(
///     resolve_link("/bao-hiem/abc.chn#comments", &base).as_deref(),
///     Some("https://cafef.vn/bao-hiem/abc.chn")
/// );
/// ```
pub fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if lowered.starts_with("javascript:")
        || lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("data:")
    {
        return None;
    }

    let mut absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() != "http" && absolute_url.scheme() != "https" {
        return None;
    }
    absolute_url.set_fragment(None);

    Some(absolute_url.to_string())
}

/// Builds the URL of one search result page
///
/// Any existing `keyword`/`page` parameters on the search URL are replaced; other
/// parameters are kept. The keyword is percent-encoded.
///
/// # Arguments
///
/// * `search_url` - The search endpoint (e.g., `https://thuvienphapluat.vn/tim-van-ban.aspx`)
/// * `keyword` - Topic query
/// * `page` - 1-based result page number
pub fn build_search_url(search_url: &Url, keyword: &str, page: u32) -> Url {
    let kept: Vec<(String, String)> = search_url
        .query_pairs()
        .filter(|(k, _)| k != "keyword" && k != "page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut url = search_url.clone();
    url.set_query(None);
    {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs.append_pair("keyword", keyword);
        pairs.append_pair("page", &page.to_string());
    }
    url
}
