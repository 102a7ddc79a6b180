//! Origin filter for discovery candidates. Aggregator and review sites
//! produce stale duplicates of real listings, so candidates sourced from
//! them are dropped before persistence. A candidate with no origin URL is
//! kept; one whose URL fails to parse is not.

use url::Url;

/// Origin domains whose listings are rejected outright.
const BLOCKED_HOSTS: &[&str] = &[
    "yelp.com",
    "yellowpages.com",
    "mapquest.com",
    "foursquare.com",
    "tripadvisor.com",
    "groupon.com",
    "craigslist.org",
    "city-data.com",
    "superpages.com",
];

fn host_is_blocked(host: &str) -> bool {
    BLOCKED_HOSTS
        .iter()
        .any(|blocked| host == *blocked || host.ends_with(&format!(".{blocked}")))
}

/// Whether a candidate with this origin URL may proceed.
pub fn allowed(source_url: Option<&str>) -> bool {
    let raw = match source_url {
        Some(u) => u,
        None => return true,
    };

    match Url::parse(raw) {
        Ok(url) => match url.host_str() {
            Some(host) => !host_is_blocked(&host.to_lowercase()),
            None => false,
        },
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_hosts_and_subdomains_are_rejected() {
        assert!(!allowed(Some("https://www.yelp.com/biz/some-pantry")));
        assert!(!allowed(Some("https://m.yelp.com/biz/some-pantry")));
        assert!(!allowed(Some("https://yellowpages.com/listing/123")));
    }

    #[test]
    fn ordinary_hosts_pass() {
        assert!(allowed(Some("https://stmaryspantry.org/hours")));
        assert!(allowed(Some("https://secondharvest.org")));
    }

    #[test]
    fn unparseable_urls_are_rejected() {
        assert!(!allowed(Some("not a url")));
        assert!(!allowed(Some("")));
    }

    #[test]
    fn missing_url_is_kept() {
        assert!(allowed(None));
    }

    #[test]
    fn lookalike_domains_are_not_blocked() {
        assert!(allowed(Some("https://notyelp.com/food")));
    }
}
