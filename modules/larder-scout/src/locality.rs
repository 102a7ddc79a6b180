//! Geographic directory filter for county-scope discovery. Wide searches
//! pull in umbrella organizations headquartered in major metros that list
//! every rural county on their site; this rejects candidates whose reported
//! city is a big metro outside the requested region. Candidates with no
//! reported city pass through (fail open).

/// Administrative suffixes stripped from a region string to derive the
/// expected-locality token.
const ADMIN_SUFFIXES: &[&str] = &["county", "parish", "borough", "census area", "municipality"];

/// Major metropolitan names that regularly pollute hyper-local results.
const METRO_DENYLIST: &[&str] = &[
    "new york",
    "los angeles",
    "chicago",
    "houston",
    "phoenix",
    "philadelphia",
    "san antonio",
    "san diego",
    "dallas",
    "seattle",
    "denver",
    "atlanta",
    "boston",
    "detroit",
    "minneapolis",
    "washington",
    "miami",
];

/// Strip administrative suffixes from a region name.
/// "Washington County" -> "washington".
pub fn expected_locality(region_name: &str) -> String {
    let mut locality = region_name.trim().to_lowercase();
    for suffix in ADMIN_SUFFIXES {
        if let Some(stripped) = locality.strip_suffix(suffix) {
            locality = stripped.trim().to_string();
        }
    }
    locality
}

/// Whether a candidate's reported city is plausible for the region.
/// Rejects only when the city is a denylisted metro *and* the expected
/// locality doesn't itself contain that city (Washington County vs the
/// Washington metro being the classic collision).
pub fn in_scope(region_name: &str, city: Option<&str>) -> bool {
    let city = match city {
        Some(c) if !c.trim().is_empty() => c.trim().to_lowercase(),
        _ => return true,
    };

    if !METRO_DENYLIST.contains(&city.as_str()) {
        return true;
    }

    expected_locality(region_name).contains(&city)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_admin_suffixes() {
        assert_eq!(expected_locality("Washington County"), "washington");
        assert_eq!(expected_locality("Terrebonne Parish"), "terrebonne");
        assert_eq!(expected_locality("Matanuska-Susitna Borough"), "matanuska-susitna");
        assert_eq!(expected_locality("Yukon-Koyukuk Census Area"), "yukon-koyukuk");
    }

    #[test]
    fn metro_outside_region_is_rejected() {
        assert!(!in_scope("Stearns County", Some("Minneapolis")));
        assert!(!in_scope("Hood River County", Some("Seattle")));
    }

    #[test]
    fn metro_contained_in_locality_is_kept() {
        // The region really is named after the metro — keep it
        assert!(in_scope("Washington County", Some("Washington")));
    }

    #[test]
    fn small_town_passes() {
        assert!(in_scope("Stearns County", Some("St. Cloud")));
    }

    #[test]
    fn missing_city_fails_open() {
        assert!(in_scope("Stearns County", None));
        assert!(in_scope("Stearns County", Some("  ")));
    }
}
