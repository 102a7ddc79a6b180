//! Heuristic suspicion scorer for human-review triage. Pure function over a
//! persisted record: never calls out, never mutates, identical input always
//! yields identical output. The score only ranks the review queue — nothing
//! in the pipeline branches on it.

use larder_common::{
    is_permanent_closure, is_temporary_closure, Resource, ResourceCategory,
};

// --- Category keyword tables ---

const DIRECTORY_NAME_MARKERS: &[&str] = &[
    "directory",
    "listing",
    "list of",
    "resource guide",
    "resources in",
    "find food",
    "food finder",
    "locations near",
];

const DIRECTORY_URL_MARKERS: &[&str] = &[
    "directory",
    "/resources",
    "/listings",
    "findhelp",
    "211",
    "auntbertha",
    "foodpantries.org",
    "needhelppayingbills",
];

const BANK_BRANDS: &[&str] = &[
    "wells fargo",
    "bank of america",
    "chase",
    "citibank",
    "citizens bank",
    "us bank",
    "pnc",
    "td bank",
    "regions bank",
    "fifth third",
    "truist",
    "keybank",
    "credit union",
    "savings bank",
    "bancorp",
];

const WRONG_BANK_SUBTYPES: &[&str] = &[
    "blood bank",
    "milk bank",
    "seed bank",
    "sperm bank",
    "eye bank",
    "bone bank",
    "tissue bank",
    "cord blood",
];

const LAW_ENFORCEMENT: &[&str] = &[
    "police",
    "sheriff",
    "law enforcement",
    "correctional",
    "jail",
    "prison",
    "state patrol",
];

const GOVERNMENT_OFFICE: &[&str] = &[
    "city hall",
    "town hall",
    "county office",
    "department of",
    "courthouse",
    "municipal",
    "social security",
    "dmv",
];

const COMMUNITY_VENUE: &[&str] = &[
    "community center",
    "recreation center",
    "civic center",
    "senior center",
    "library",
    "ymca",
    "ywca",
];

const SCHOOL: &[&str] = &[
    "elementary school",
    "middle school",
    "high school",
    "school district",
    "university",
    "college",
    "academy",
];

/// Tokens that say nothing about identity. A name built entirely from these
/// is too vague to trust.
const GENERIC_NAME_TOKENS: &[&str] = &[
    "food",
    "community",
    "services",
    "service",
    "center",
    "help",
    "assistance",
    "resource",
    "resources",
    "outreach",
    "program",
    "the",
    "of",
    "and",
];

/// Strong positive signals that the record really is a food resource.
/// Deliberately does not include bare "food" or "food bank" — bank branches
/// and directory pages say those too.
const STRONG_FOOD_KEYWORDS: &[&str] = &[
    "pantry",
    "food shelf",
    "soup kitchen",
    "free meals",
    "meal program",
    "groceries",
    "grocery distribution",
    "food distribution",
    "feeding",
    "hunger relief",
    "nutrition assistance",
    "snap",
    "wic",
];

// --- Report ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspicionCategory {
    DirectoryPageName,
    DirectoryPageUrl,
    FinancialInstitution,
    WrongBankSubtype,
    LawEnforcement,
    GovernmentOffice,
    CommunityVenue,
    School,
    VagueName,
    Unverified,
    Clear,
}

impl SuspicionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuspicionCategory::DirectoryPageName => "directory-page-by-name",
            SuspicionCategory::DirectoryPageUrl => "directory-page-by-url",
            SuspicionCategory::FinancialInstitution => "financial-institution",
            SuspicionCategory::WrongBankSubtype => "wrong-bank-subtype",
            SuspicionCategory::LawEnforcement => "law-enforcement",
            SuspicionCategory::GovernmentOffice => "government-office",
            SuspicionCategory::CommunityVenue => "generic-community-venue",
            SuspicionCategory::School => "school",
            SuspicionCategory::VagueName => "vague-name",
            SuspicionCategory::Unverified => "unverified",
            SuspicionCategory::Clear => "clear",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuspicionReport {
    /// 0–100, higher = more likely a false positive.
    pub score: u8,
    pub category: SuspicionCategory,
    pub reasons: Vec<String>,
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn is_vague_name(name: &str) -> bool {
    let tokens: Vec<&str> = name.split_whitespace().collect();
    if tokens.is_empty() || tokens.len() == 1 {
        return true;
    }
    tokens
        .iter()
        .all(|t| GENERIC_NAME_TOKENS.contains(&t.trim_matches(|c: char| !c.is_alphanumeric())))
}

/// Score a record. Category checks run in fixed precedence order; the first
/// match assigns the category, later matches still contribute to the score.
pub fn score(resource: &Resource) -> SuspicionReport {
    let name = resource.name.to_lowercase();
    let url = resource
        .source_url
        .as_deref()
        .unwrap_or("")
        .to_lowercase();
    let notes = resource.verification_notes.to_lowercase();

    let mut total: i32 = 0;
    let mut category: Option<SuspicionCategory> = None;
    let mut reasons: Vec<String> = Vec::new();

    let check = |matched: bool,
                     cat: SuspicionCategory,
                     penalty: i32,
                     reason: &str,
                     total: &mut i32,
                     reasons: &mut Vec<String>,
                     category: &mut Option<SuspicionCategory>| {
        if matched {
            *total += penalty;
            reasons.push(reason.to_string());
            if category.is_none() {
                *category = Some(cat);
            }
        }
    };

    check(
        contains_any(&name, DIRECTORY_NAME_MARKERS),
        SuspicionCategory::DirectoryPageName,
        70,
        "name looks like a directory page",
        &mut total,
        &mut reasons,
        &mut category,
    );
    check(
        contains_any(&url, DIRECTORY_URL_MARKERS),
        SuspicionCategory::DirectoryPageUrl,
        60,
        "source url looks like a directory page",
        &mut total,
        &mut reasons,
        &mut category,
    );
    check(
        resource.category == ResourceCategory::FoodBank && contains_any(&name, BANK_BRANDS),
        SuspicionCategory::FinancialInstitution,
        80,
        "name matches a financial institution",
        &mut total,
        &mut reasons,
        &mut category,
    );
    check(
        contains_any(&name, WRONG_BANK_SUBTYPES),
        SuspicionCategory::WrongBankSubtype,
        70,
        "name is a non-food bank subtype",
        &mut total,
        &mut reasons,
        &mut category,
    );
    check(
        contains_any(&name, LAW_ENFORCEMENT),
        SuspicionCategory::LawEnforcement,
        60,
        "name matches law enforcement",
        &mut total,
        &mut reasons,
        &mut category,
    );
    check(
        contains_any(&name, GOVERNMENT_OFFICE),
        SuspicionCategory::GovernmentOffice,
        40,
        "name matches a government office",
        &mut total,
        &mut reasons,
        &mut category,
    );
    check(
        contains_any(&name, COMMUNITY_VENUE),
        SuspicionCategory::CommunityVenue,
        30,
        "name matches a generic community venue",
        &mut total,
        &mut reasons,
        &mut category,
    );
    check(
        contains_any(&name, SCHOOL),
        SuspicionCategory::School,
        30,
        "name matches a school",
        &mut total,
        &mut reasons,
        &mut category,
    );
    check(
        is_vague_name(&name),
        SuspicionCategory::VagueName,
        25,
        "name is too generic to identify a location",
        &mut total,
        &mut reasons,
        &mut category,
    );

    // --- Independent additive contributions ---

    if !resource.verified {
        total += 20;
        reasons.push("record is unverified".to_string());
    }
    if resource.phone.is_none() && resource.hours.is_none() && resource.source_url.is_none() {
        total += 30;
        reasons.push("no phone, hours, or source url".to_string());
    }
    if resource.verification_notes.len() < 20 {
        total += 15;
        reasons.push("verification notes are thin".to_string());
    }
    if resource.needs_enrichment && resource.external_id.is_none() {
        total += 10;
        reasons.push("pending enrichment with no stable external id".to_string());
    }
    if resource.enrichment_failure_count > 2 {
        total += 25;
        reasons.push(format!(
            "failure streak of {}",
            resource.enrichment_failure_count
        ));
    }
    let reason = resource.enrichment_failure_reason.as_deref();
    if is_permanent_closure(reason) {
        total += 100;
        reasons.push("reported permanently closed".to_string());
    } else if is_temporary_closure(reason) {
        total += 50;
        reasons.push("reported temporarily closed".to_string());
    }

    // --- Dampening: strong food keywords argue the record is real ---

    let combined = format!("{name} {notes}");
    if contains_any(&combined, STRONG_FOOD_KEYWORDS) {
        total -= 40;
    }

    let category = category.unwrap_or(if resource.verified {
        SuspicionCategory::Clear
    } else {
        SuspicionCategory::Unverified
    });

    SuspicionReport {
        score: total.clamp(0, 100) as u8,
        category,
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use larder_common::{Candidate, PERMANENT_CLOSURE_REASON, TEMPORARY_CLOSURE_REASON};

    fn resource(name: &str, category: ResourceCategory) -> Resource {
        Resource::from_candidate(
            &Candidate {
                name: name.to_string(),
                address: "123 Main St".to_string(),
                city: None,
                state: None,
                category,
                source_url: None,
                phone: None,
                hours: None,
            },
            "zip-55407",
            Utc::now(),
        )
    }

    #[test]
    fn wells_fargo_food_bank_is_flagged_as_financial() {
        let r = resource("Wells Fargo Food Bank Branch", ResourceCategory::FoodBank);
        let report = score(&r);
        assert_eq!(report.category, SuspicionCategory::FinancialInstitution);
        assert!(report.score >= 80, "score was {}", report.score);
    }

    #[test]
    fn bank_brand_outside_food_bank_category_is_not_financial() {
        let r = resource("Wells Fargo Community Kitchen", ResourceCategory::SoupKitchen);
        let report = score(&r);
        assert_ne!(report.category, SuspicionCategory::FinancialInstitution);
    }

    #[test]
    fn category_precedence_first_match_wins() {
        // Name hits both directory and law enforcement — directory wins,
        // law enforcement still contributes to the score.
        let r = resource(
            "Directory of Police Food Drives",
            ResourceCategory::FoodPantry,
        );
        let report = score(&r);
        assert_eq!(report.category, SuspicionCategory::DirectoryPageName);
        assert!(report
            .reasons
            .iter()
            .any(|reason| reason.contains("law enforcement")));
    }

    #[test]
    fn blood_bank_is_wrong_subtype() {
        let r = resource("Memorial Blood Bank", ResourceCategory::FoodBank);
        let report = score(&r);
        assert_eq!(report.category, SuspicionCategory::WrongBankSubtype);
    }

    #[test]
    fn closure_reasons_dominate() {
        let mut r = resource("Riverside Pantry", ResourceCategory::FoodPantry);
        r.enrichment_failure_reason = Some(PERMANENT_CLOSURE_REASON.to_string());
        assert_eq!(score(&r).score, 100);

        let mut temp = resource("Lakeview Auto Mart", ResourceCategory::Other);
        temp.enrichment_failure_reason = Some(TEMPORARY_CLOSURE_REASON.to_string());
        assert!(score(&temp).score >= 50);
    }

    #[test]
    fn food_keywords_dampen_the_score() {
        let plain = resource("Neighborhood Sheriff Station", ResourceCategory::Other);
        let mut foody = resource(
            "Neighborhood Sheriff Station Food Shelf",
            ResourceCategory::Other,
        );
        foody.verification_notes = "weekly grocery distribution".to_string();
        assert!(score(&foody).score < score(&plain).score);
    }

    #[test]
    fn dampened_score_floors_at_zero() {
        let mut r = resource("St Marys Pantry", ResourceCategory::FoodPantry);
        r.verified = true;
        r.needs_enrichment = false;
        r.phone = Some("651-555-0100".to_string());
        r.verification_notes = "Verified as \"St Marys Food Pantry\"".to_string();
        let report = score(&r);
        assert_eq!(report.score, 0);
        assert_eq!(report.category, SuspicionCategory::Clear);
    }

    #[test]
    fn vague_single_word_name_is_flagged() {
        let r = resource("Food", ResourceCategory::Other);
        let report = score(&r);
        assert_eq!(report.category, SuspicionCategory::VagueName);
    }

    #[test]
    fn unverified_fallback_category() {
        let r = resource("Riverside Gurdwara Langar", ResourceCategory::MealProgram);
        let report = score(&r);
        assert_eq!(report.category, SuspicionCategory::Unverified);
        // unverified +20, no contact +30, thin notes +15, no external id +10
        assert_eq!(report.score, 75);
    }

    #[test]
    fn score_is_deterministic() {
        let r = resource("Wells Fargo Food Bank Branch", ResourceCategory::FoodBank);
        let a = score(&r);
        let b = score(&r);
        assert_eq!(a, b);
    }
}
