//! Reads uploaded CSV files and turns their rows into contacts or skipped rows.

use super::snapshot::{CsvRow, APPEND_COLUMNS, FIRST_NAME_COLUMN, LAST_NAME_COLUMN, WEBSITE_COLUMN};
use crate::core::error::{AppError, Result};
use crate::core::models::Contact;
use crate::utils::domain::clean_domain;
use crate::utils::names::{clean_name, first_token, last_token};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

pub const ALLOWED_EXTENSIONS: [&str; 1] = ["csv"];

const FIRST_NAME_ALIASES: [&str; 3] = ["first name", "firstname", "first"];
const LAST_NAME_ALIASES: [&str; 3] = ["last name", "lastname", "last"];
const WEBSITE_ALIASES: [&str; 4] = ["website", "domain", "company website", "company domain"];
const EMAIL_ALIASES: [&str; 4] = ["email", "e-mail", "work email", "business email"];

fn email_regex() -> &'static Regex {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static email regex is valid")
    })
}

/// Lower-cases and reduces punctuation/whitespace runs to single spaces.
pub(crate) fn normalize_key(value: &str) -> String {
    value
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Raw table read from an upload.
#[derive(Debug, Clone, Default)]
pub struct ParsedSheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Zero-based position of the header row among the non-blank rows.
    pub header_row_index: usize,
}

/// Which upload headers hold the contact fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub first_name: String,
    pub last_name: String,
    pub website: String,
    pub email: Option<String>,
}

impl ColumnMap {
    fn output_header<'a>(&self, header: &'a str) -> &'a str {
        if header == self.first_name {
            FIRST_NAME_COLUMN
        } else if header == self.last_name {
            LAST_NAME_COLUMN
        } else if header == self.website {
            WEBSITE_COLUMN
        } else {
            header
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ExistingEmail,
    MissingDomain,
    MissingName,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::ExistingEmail => "Existing email provided",
            SkipReason::MissingDomain => "Missing website/domain",
            SkipReason::MissingName => "Missing first and last name",
        })
    }
}

/// Cleaned name/domain triple for a row, whether or not it is runnable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub first_name: String,
    pub last_name: String,
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub row_id: usize,
    /// 1-based line number in the upload, for messages.
    pub row_number: usize,
    pub sanitized_row: CsvRow,
    pub contact: Option<Contact>,
    pub skip_reason: Option<SkipReason>,
    pub profile: Profile,
    pub existing_email: Option<String>,
}

pub fn validate_extension(filename: &str) -> Result<()> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(AppError::UnsupportedFile(filename.to_string()))
    }
}

pub fn enforce_row_limit(rows: usize, max_rows: usize) -> Result<()> {
    if rows > max_rows {
        return Err(AppError::RowLimitExceeded { rows, max: max_rows });
    }
    Ok(())
}

fn is_header_row(values: &[String]) -> bool {
    let normalized: Vec<String> = values.iter().map(|v| normalize_key(v)).collect();
    let has_any = |aliases: &[&str]| aliases.iter().any(|a| normalized.contains(&normalize_key(a)));
    has_any(&FIRST_NAME_ALIASES[..]) && has_any(&LAST_NAME_ALIASES[..]) && has_any(&WEBSITE_ALIASES[..])
}

fn sanitize_headers(values: &[String]) -> Vec<String> {
    values
        .iter()
        .enumerate()
        .map(|(idx, cell)| {
            if cell.trim().is_empty() {
                format!("column_{}", idx + 1)
            } else {
                cell.trim().to_string()
            }
        })
        .collect()
}

/// Reads a CSV upload, locating the header row and dropping blank lines.
pub fn read_csv_upload(path: &Path) -> Result<ParsedSheet> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut records: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        let values: Vec<String> = record
            .iter()
            .enumerate()
            .map(|(idx, v)| {
                if records.is_empty() && idx == 0 {
                    v.trim_start_matches('\u{feff}').to_string()
                } else {
                    v.to_string()
                }
            })
            .collect();
        if values.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        records.push(values);
    }

    if records.is_empty() {
        return Ok(ParsedSheet::default());
    }

    let header_row_index = records.iter().position(|r| is_header_row(r)).unwrap_or(0);
    let headers = sanitize_headers(&records[header_row_index]);
    let rows = records.split_off(header_row_index + 1);
    tracing::debug!(target: "job_task", "Read {} data rows from {} (header at row {})",
        rows.len(), path.display(), header_row_index + 1);

    Ok(ParsedSheet {
        headers,
        rows,
        header_row_index,
    })
}

fn find_column(headers: &[String], aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|alias| {
        let wanted = normalize_key(alias);
        headers.iter().find(|h| normalize_key(h) == wanted).cloned()
    })
}

pub fn resolve_columns(headers: &[String]) -> Result<ColumnMap> {
    let first_name = find_column(headers, &FIRST_NAME_ALIASES);
    let last_name = find_column(headers, &LAST_NAME_ALIASES);
    let website = find_column(headers, &WEBSITE_ALIASES);
    match (first_name, last_name, website) {
        (Some(first_name), Some(last_name), Some(website)) => Ok(ColumnMap {
            first_name,
            last_name,
            website,
            email: find_column(headers, &EMAIL_ALIASES),
        }),
        _ => Err(AppError::MissingColumns),
    }
}

/// Output column order: the three contact columns in upload order, then Email and Status.
pub fn build_column_order(headers: &[String], columns: &ColumnMap) -> Vec<String> {
    let mut identifying = vec![
        (&columns.first_name, FIRST_NAME_COLUMN),
        (&columns.last_name, LAST_NAME_COLUMN),
        (&columns.website, WEBSITE_COLUMN),
    ];
    identifying.sort_by_key(|(header, _)| headers.iter().position(|h| h == *header).unwrap_or(usize::MAX));
    identifying
        .into_iter()
        .map(|(_, output)| output.to_string())
        .chain(APPEND_COLUMNS.iter().map(|c| c.to_string()))
        .collect()
}

fn extract_email(value: &str) -> Option<String> {
    let email = value.trim();
    if !email.is_empty() && email_regex().is_match(email) {
        Some(email.to_string())
    } else {
        None
    }
}

/// Classification of one data row before it is given a row id.
struct SanitizedRow {
    sanitized_row: CsvRow,
    contact: Option<Contact>,
    skip_reason: Option<SkipReason>,
    profile: Profile,
    existing_email: Option<String>,
}

fn sanitize_row(row: &[(String, String)], columns: &ColumnMap, row_id: usize) -> Option<SanitizedRow> {
    let value_of = |header: &str| {
        row.iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    };

    let first_name = first_token(&clean_name(value_of(&columns.first_name)));
    let last_name = last_token(&clean_name(value_of(&columns.last_name)));
    let domain = clean_domain(value_of(&columns.website));
    let existing_email = columns
        .email
        .as_deref()
        .and_then(|header| extract_email(value_of(header)));

    let mut sanitized_row = CsvRow::new();
    for (header, value) in row {
        let output = columns.output_header(header);
        let cleaned = match output {
            FIRST_NAME_COLUMN => first_name.clone(),
            LAST_NAME_COLUMN => last_name.clone(),
            WEBSITE_COLUMN => domain.clone(),
            _ => value.clone(),
        };
        sanitized_row.insert(output.to_string(), cleaned);
    }
    sanitized_row
        .entry(FIRST_NAME_COLUMN.to_string())
        .or_insert_with(|| first_name.clone());
    sanitized_row
        .entry(LAST_NAME_COLUMN.to_string())
        .or_insert_with(|| last_name.clone());
    sanitized_row
        .entry(WEBSITE_COLUMN.to_string())
        .or_insert_with(|| domain.clone());

    let profile = Profile {
        first_name: first_name.clone(),
        last_name: last_name.clone(),
        domain: domain.clone(),
    };

    if first_name.is_empty() && last_name.is_empty() && domain.is_empty() && existing_email.is_none() {
        return None;
    }

    let skip_reason = if existing_email.is_some() {
        Some(SkipReason::ExistingEmail)
    } else if domain.is_empty() {
        Some(SkipReason::MissingDomain)
    } else if first_name.is_empty() && last_name.is_empty() {
        Some(SkipReason::MissingName)
    } else {
        None
    };

    let contact = skip_reason
        .is_none()
        .then(|| Contact::new(first_name, last_name, domain, row_id));

    Some(SanitizedRow {
        sanitized_row,
        contact,
        skip_reason,
        profile,
        existing_email,
    })
}

/// Normalizes data rows in order, assigning consecutive row ids to kept rows.
///
/// A row that itself looks like a header switches the column mapping for the
/// rows after it. Rows with no usable name, domain or email are dropped.
pub fn normalize_rows(
    rows: &[Vec<String>],
    initial_columns: &ColumnMap,
    header_row_index: usize,
    initial_headers: &[String],
) -> Result<Vec<NormalizedRow>> {
    let mut normalized = Vec::with_capacity(rows.len());
    let mut headers = initial_headers.to_vec();
    let mut columns = initial_columns.clone();

    for (index, values) in rows.iter().enumerate() {
        let row_number = header_row_index + 2 + index;

        if is_header_row(values) {
            headers = sanitize_headers(values);
            columns = resolve_columns(&headers)?;
            tracing::debug!(target: "job_task", "Header row repeated at line {}; re-mapped columns.", row_number);
            continue;
        }

        let row_object: Vec<(String, String)> = headers
            .iter()
            .enumerate()
            .map(|(idx, header)| (header.clone(), values.get(idx).cloned().unwrap_or_default()))
            .collect();

        let row_id = normalized.len();
        let Some(sanitized) = sanitize_row(&row_object, &columns, row_id) else {
            continue;
        };

        normalized.push(NormalizedRow {
            row_id,
            row_number,
            sanitized_row: sanitized.sanitized_row,
            contact: sanitized.contact,
            skip_reason: sanitized.skip_reason,
            profile: sanitized.profile,
            existing_email: sanitized.existing_email,
        });
    }

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_validate_extension() {
        assert!(validate_extension("contacts.CSV").is_ok());
        assert!(matches!(
            validate_extension("contacts.pdf"),
            Err(AppError::UnsupportedFile(_))
        ));
        assert!(validate_extension("no_extension").is_err());
    }

    #[test]
    fn test_row_limit() {
        assert!(enforce_row_limit(10, 10).is_ok());
        assert!(matches!(
            enforce_row_limit(11, 10),
            Err(AppError::RowLimitExceeded { rows: 11, max: 10 })
        ));
    }

    #[test]
    fn test_resolve_columns_by_alias() {
        let headers = strings(&["Company Domain", "FirstName", "last_name", "Work Email", "Notes"]);
        let columns = resolve_columns(&headers).unwrap();
        assert_eq!(columns.first_name, "FirstName");
        assert_eq!(columns.last_name, "last_name");
        assert_eq!(columns.website, "Company Domain");
        assert_eq!(columns.email.as_deref(), Some("Work Email"));

        assert!(matches!(
            resolve_columns(&strings(&["Name", "Website"])),
            Err(AppError::MissingColumns)
        ));
    }

    #[test]
    fn test_column_order_follows_upload() {
        let headers = strings(&["Website", "Notes", "First", "Last"]);
        let columns = resolve_columns(&headers).unwrap();
        assert_eq!(
            build_column_order(&headers, &columns),
            strings(&["Website", "First Name", "Last Name", "Email", "Status"])
        );
    }

    #[test]
    fn test_normalize_rows_classifies() {
        let headers = strings(&["First Name", "Last Name", "Website", "Email"]);
        let columns = resolve_columns(&headers).unwrap();
        let rows = vec![
            strings(&["jane", "doe", "https://www.Acme.com/about", ""]),
            strings(&["", "", "", ""]),
            strings(&["Bob", "Stone", "", ""]),
            strings(&["", "", "acme.com", ""]),
            strings(&["Kim", "Lee", "lee.io", "kim@lee.io"]),
            strings(&["Mary-Ann", "de la Cruz", "x.org", "not-an-email"]),
        ];
        let normalized = normalize_rows(&rows, &columns, 0, &headers).unwrap();
        assert_eq!(normalized.len(), 5);

        let jane = &normalized[0];
        assert_eq!(jane.row_id, 0);
        assert_eq!(jane.row_number, 2);
        assert_eq!(jane.contact, Some(Contact::new("Jane", "Doe", "acme.com", 0)));
        assert_eq!(jane.sanitized_row["Website"], "acme.com");

        assert_eq!(normalized[1].skip_reason, Some(SkipReason::MissingDomain));
        assert_eq!(normalized[1].row_id, 1);
        assert_eq!(normalized[1].row_number, 4);
        assert_eq!(normalized[2].skip_reason, Some(SkipReason::MissingName));
        assert_eq!(normalized[3].skip_reason, Some(SkipReason::ExistingEmail));
        assert_eq!(normalized[3].existing_email.as_deref(), Some("kim@lee.io"));
        assert!(normalized[3].contact.is_none());

        let mary = normalized[4].contact.as_ref().unwrap();
        assert_eq!(mary.first_name, "Mary");
        assert_eq!(mary.last_name, "Cruz");
    }

    #[test]
    fn test_repeated_header_remaps_columns() {
        let headers = strings(&["First Name", "Last Name", "Website"]);
        let columns = resolve_columns(&headers).unwrap();
        let rows = vec![
            strings(&["Ann", "Lee", "a.com"]),
            strings(&["Domain", "First", "Last"]),
            strings(&["b.com", "Bo", "Ng"]),
        ];
        let normalized = normalize_rows(&rows, &columns, 0, &headers).unwrap();
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[1].contact, Some(Contact::new("Bo", "Ng", "b.com", 1)));
    }

    #[test]
    fn test_read_csv_upload_finds_header() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        write!(
            file,
            "\u{feff}Exported contacts,,\n,,\nFirst Name,Last Name,Website\nJane,Doe,acme.com\n,,\n\"Smith, Jr\",Bob,\"b.com\"\n"
        )
        .unwrap();

        let sheet = read_csv_upload(file.path()).unwrap();
        assert_eq!(sheet.header_row_index, 1);
        assert_eq!(sheet.headers, strings(&["First Name", "Last Name", "Website"]));
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[1][0], "Smith, Jr");
    }
}
