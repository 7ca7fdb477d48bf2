use std::collections::HashSet;
use std::path::Path;

/// Maximum number of characters in a worksheet name.
pub const MAX_SHEET_NAME_LEN: usize = 31;
/// Characters the workbook format rejects inside sheet names.
pub const FORBIDDEN_CHARS: [char; 7] = ['\\', '/', '?', '*', '[', ']', ':'];

const ELLIPSIS: &str = "...";
const FALLBACK_NAME: &str = "Sheet";
const RESERVED_NAMES: [&str; 1] = ["history"];

/// Allocates unique, valid sheet names within one workbook.
///
/// Comparisons are case-insensitive because the workbook format treats
/// `Report` and `report` as the same sheet. Suffix numbering depends only on
/// the sequence of prior calls.
#[derive(Debug)]
pub struct SheetNameRegistry {
    used: HashSet<String>,
}

impl Default for SheetNameRegistry {
    fn default() -> Self {
        Self {
            used: RESERVED_NAMES.iter().map(|name| name.to_string()).collect(),
        }
    }
}

impl SheetNameRegistry {
    /// Reserves a name up front, e.g. the summary sheet.
    pub fn claim(&mut self, name: &str) {
        self.used.insert(fold(name));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.used.contains(&fold(name))
    }

    /// Allocates a name for a file, returning it with the collision suffix used.
    pub fn allocate(&mut self, filename: &str) -> (String, usize) {
        let base = sanitize_sheet_name(filename);
        if !self.contains(&base) {
            self.claim(&base);
            return (base, 0);
        }

        let mut counter = 1;
        loop {
            let suffix = format!("_{counter}");
            let max_len = MAX_SHEET_NAME_LEN - suffix.chars().count();
            let prefix: String = base.chars().take(max_len).collect();
            let candidate = format!("{prefix}{suffix}");
            if !self.contains(&candidate) {
                self.claim(&candidate);
                return (candidate, counter);
            }
            counter += 1;
        }
    }
}

/// Turns a file name into a valid (not necessarily unique) sheet name.
///
/// The extension is stripped, forbidden characters become `_`, and names
/// longer than 31 characters are cut to 28 and marked with `...`.
pub fn sanitize_sheet_name(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut sanitized: String = stem
        .chars()
        .map(|ch| {
            if FORBIDDEN_CHARS.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect();

    // Names may not begin or end with an apostrophe.
    if sanitized.starts_with('\'') {
        sanitized.replace_range(..1, "_");
    }
    if sanitized.ends_with('\'') {
        sanitized.pop();
        sanitized.push('_');
    }

    if sanitized.trim().is_empty() {
        return FALLBACK_NAME.to_string();
    }

    if sanitized.chars().count() > MAX_SHEET_NAME_LEN {
        let keep = MAX_SHEET_NAME_LEN - ELLIPSIS.len();
        sanitized = sanitized.chars().take(keep).collect();
        sanitized.push_str(ELLIPSIS);
    }

    sanitized
}

/// Checks the constraints every allocated name must satisfy.
pub fn is_valid_sheet_name(name: &str) -> bool {
    let len = name.chars().count();
    (1..=MAX_SHEET_NAME_LEN).contains(&len)
        && !name.chars().any(|ch| FORBIDDEN_CHARS.contains(&ch))
        && !name.starts_with('\'')
        && !name.ends_with('\'')
        && !RESERVED_NAMES.contains(&fold(name).as_str())
}

fn fold(name: &str) -> String {
    name.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_stem_different_extension_gets_suffix() {
        let mut registry = SheetNameRegistry::default();
        assert_eq!(registry.allocate("report.csv"), ("report".to_string(), 0));
        assert_eq!(registry.allocate("report.xlsx"), ("report_1".to_string(), 1));
        assert_eq!(registry.allocate("REPORT.xls"), ("REPORT_2".to_string(), 2));
    }

    #[test]
    fn long_stem_is_truncated_with_ellipsis() {
        let stem = "a".repeat(40);
        let name = sanitize_sheet_name(&format!("{stem}.csv"));
        assert_eq!(name.chars().count(), MAX_SHEET_NAME_LEN);
        assert!(name.ends_with("..."));
        assert_eq!(&name[..28], &stem[..28]);
    }

    #[test]
    fn suffix_retruncates_long_base() {
        let mut registry = SheetNameRegistry::default();
        let filename = format!("{}.csv", "b".repeat(40));
        let (first, _) = registry.allocate(&filename);
        let (second, suffix) = registry.allocate(&filename);
        assert_eq!(first.chars().count(), 31);
        assert_eq!(second.chars().count(), 31);
        assert_eq!(suffix, 1);
        assert!(second.ends_with("_1"));
        assert_ne!(first, second);
    }

    #[test]
    fn forbidden_characters_are_replaced() {
        let name = sanitize_sheet_name("a\\b/c?d*e[f]g:h.csv");
        assert_eq!(name, "a_b_c_d_e_f_g_h");
        assert!(is_valid_sheet_name(&name));
    }

    #[test]
    fn multibyte_names_are_measured_in_characters() {
        let stem = "金融数据".repeat(10);
        let name = sanitize_sheet_name(&format!("{stem}.xlsx"));
        assert_eq!(name.chars().count(), 31);
        assert!(is_valid_sheet_name(&name));
    }

    #[test]
    fn degenerate_names_fall_back() {
        assert_eq!(sanitize_sheet_name(".csv"), ".csv");
        assert_eq!(sanitize_sheet_name("   .csv"), "Sheet");
        assert_eq!(sanitize_sheet_name("'quoted'.csv"), "_quoted_");
    }

    #[test]
    fn reserved_and_claimed_names_are_avoided() {
        let mut registry = SheetNameRegistry::default();
        registry.claim("Summary");
        assert_eq!(registry.allocate("summary.csv").0, "summary_1");
        assert_eq!(registry.allocate("History.csv").0, "History_1");
    }

    #[test]
    fn allocated_names_are_valid_and_distinct() {
        let mut registry = SheetNameRegistry::default();
        let long = format!("{}.csv", "q".repeat(60));
        let inputs = [
            "a:b.csv", "a?b.xlsx", "a*b.xls", "A_B.csv", long.as_str(), long.as_str(),
            long.as_str(), "[x].csv", "_x_.csv", "History.xlsx", "'.csv",
        ];
        let names: Vec<String> = inputs
            .iter()
            .map(|input| registry.allocate(input).0)
            .collect();

        for name in &names {
            assert!(is_valid_sheet_name(name), "{name} is not a valid sheet name");
        }
        let folded: HashSet<String> = names.iter().map(|name| fold(name)).collect();
        assert_eq!(folded.len(), names.len());
    }

    #[test]
    fn allocation_is_deterministic() {
        let inputs = ["x.csv", "x.xlsx", "y.csv", "x.xls", "y.xlsx"];
        let run = || {
            let mut registry = SheetNameRegistry::default();
            inputs
                .iter()
                .map(|name| registry.allocate(name).0)
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
        assert_eq!(run(), vec!["x", "x_1", "y", "x_2", "y_1"]);
    }
}
