//! Generates candidate email addresses from a contact's name parts and domain.

use std::collections::HashSet;

/// Lower-cases and removes all whitespace.
fn clean_part(part: &str) -> String {
    part.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Returns the ordered list of candidate emails for a contact.
///
/// Candidates are produced in priority order (the first one is tried first)
/// and de-duplicated keeping the first occurrence. Templates that need a name
/// part the contact lacks are skipped; an empty domain yields no candidates.
pub fn generate_email_patterns(first_name: &str, last_name: &str, domain: &str) -> Vec<String> {
    let first = clean_part(first_name);
    let last = clean_part(last_name);
    let domain = clean_part(domain);

    if domain.is_empty() {
        tracing::trace!("No candidates for '{} {}': empty domain", first_name, last_name);
        return Vec::new();
    }

    let first_initial: String = first.chars().take(1).collect();
    let last_initial: String = last.chars().take(1).collect();
    let has_first = !first.is_empty();
    let has_last = !last.is_empty();
    let has_both = has_first && has_last;

    let templates = [
        (has_first, first.clone()),                       // jane
        (has_both, format!("{}.{}", first, last)),        // jane.doe
        (has_both, format!("{}{}", first, last_initial)), // janed
        (has_both, format!("{}{}", first, last)),         // janedoe
        (has_both, format!("{}{}", first_initial, last)), // jdoe
        (has_both, format!("{}.{}", first, last_initial)), // jane.d
        (has_both, format!("{}_{}", first, last)),        // jane_doe
        (has_both, format!("{}{}", last, first_initial)), // doej
        (has_last, last.clone()),                         // doe
    ];

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for (applies, local_part) in templates {
        if !applies {
            continue;
        }
        let local = local_part.trim_matches(|c| matches!(c, '.' | '_' | '-'));
        if local.is_empty() {
            continue;
        }
        let email = format!("{}@{}", local, domain);
        if seen.insert(email.clone()) {
            candidates.push(email);
        }
    }

    tracing::trace!(
        "Generated {} candidates for '{} {}' @ '{}'",
        candidates.len(),
        first_name,
        last_name,
        domain
    );
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        let patterns = generate_email_patterns("Jane", "Doe", "acme.com");
        assert_eq!(
            patterns,
            vec![
                "jane@acme.com",
                "jane.doe@acme.com",
                "janed@acme.com",
                "janedoe@acme.com",
                "jdoe@acme.com",
                "jane.d@acme.com",
                "jane_doe@acme.com",
                "doej@acme.com",
                "doe@acme.com",
            ]
        );
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(
            generate_email_patterns("Ana", "Lee", "x.io"),
            generate_email_patterns("Ana", "Lee", "x.io")
        );
    }

    #[test]
    fn test_empty_domain_yields_nothing() {
        assert!(generate_email_patterns("Jane", "Doe", "").is_empty());
        assert!(generate_email_patterns("Jane", "Doe", "   ").is_empty());
    }

    #[test]
    fn test_single_name_parts() {
        assert_eq!(generate_email_patterns("Jane", "", "acme.com"), vec!["jane@acme.com"]);
        assert_eq!(generate_email_patterns("", "Doe", "acme.com"), vec!["doe@acme.com"]);
        assert!(generate_email_patterns("", "", "acme.com").is_empty());
    }

    #[test]
    fn test_whitespace_and_case_are_stripped() {
        let patterns = generate_email_patterns("  Mary Ann ", "Van Dyke", "Acme.COM ");
        assert_eq!(patterns[0], "maryann@acme.com");
        assert_eq!(patterns[1], "maryann.vandyke@acme.com");
    }

    #[test]
    fn test_single_character_names_collapse_duplicates() {
        // With one-letter names several templates produce the same local part.
        let patterns = generate_email_patterns("J", "D", "acme.com");
        assert_eq!(
            patterns,
            vec!["j@acme.com", "j.d@acme.com", "jd@acme.com", "j_d@acme.com", "dj@acme.com", "d@acme.com"]
        );
    }

    #[test]
    fn test_separator_only_local_parts_dropped() {
        let patterns = generate_email_patterns("-", "_", "acme.com");
        assert!(patterns.is_empty(), "got {:?}", patterns);

        let patterns = generate_email_patterns("jo-", "", "acme.com");
        assert_eq!(patterns, vec!["jo@acme.com"]);
    }
}
