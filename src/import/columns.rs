use super::tabular::RowMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalField {
    RegistrationNo,
    AdmissionNo,
    Name,
    Gender,
    SecondLanguage,
}

/// Accepted header spellings per logical field, highest priority first.
/// Headers match literally and case-sensitively.
#[derive(Debug, Clone, Copy)]
pub struct ColumnAliasTable {
    pub registration_no: &'static [&'static str],
    pub admission_no: &'static [&'static str],
    pub name: &'static [&'static str],
    pub gender: &'static [&'static str],
    pub second_language: &'static [&'static str],
}

pub const COLUMN_ALIASES: ColumnAliasTable = ColumnAliasTable {
    registration_no: &["Regd.No.", "Regd.No", "Registration No", "registration_no"],
    admission_no: &["Admn.No.", "Admn.No", "Admission No", "admission_no"],
    name: &["Name of the Student", "Name", "name"],
    gender: &["G", "Gender", "gender"],
    second_language: &["SL", "Second Language", "second_language"],
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedFields {
    pub registration_no: Option<String>,
    pub admission_no: Option<String>,
    pub name: Option<String>,
    pub gender: Option<String>,
    pub second_language: Option<String>,
}

impl ColumnAliasTable {
    pub fn aliases(&self, field: LogicalField) -> &'static [&'static str] {
        match field {
            LogicalField::RegistrationNo => self.registration_no,
            LogicalField::AdmissionNo => self.admission_no,
            LogicalField::Name => self.name,
            LogicalField::Gender => self.gender,
            LogicalField::SecondLanguage => self.second_language,
        }
    }

    /// First alias present with a non-blank value wins. Values are trimmed.
    pub fn lookup(&self, row: &RowMap, field: LogicalField) -> Option<String> {
        self.aliases(field).iter().find_map(|alias| {
            row.get(*alias)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        })
    }

    pub fn resolve(&self, row: &RowMap) -> ResolvedFields {
        ResolvedFields {
            registration_no: self.lookup(row, LogicalField::RegistrationNo),
            admission_no: self.lookup(row, LogicalField::AdmissionNo),
            name: self.lookup(row, LogicalField::Name),
            gender: self.lookup(row, LogicalField::Gender),
            second_language: self.lookup(row, LogicalField::SecondLanguage),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> RowMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn higher_priority_alias_wins_when_both_present() {
        let r = row(&[("Registration No", "R-LOW"), ("Regd.No.", "R-HIGH")]);
        let f = COLUMN_ALIASES.resolve(&r);
        assert_eq!(f.registration_no.as_deref(), Some("R-HIGH"));
    }

    #[test]
    fn blank_value_falls_through_to_next_alias() {
        let r = row(&[("Name of the Student", "  "), ("Name", "Asha"), ("name", "other")]);
        let f = COLUMN_ALIASES.resolve(&r);
        assert_eq!(f.name.as_deref(), Some("Asha"));
    }

    #[test]
    fn header_match_is_case_sensitive() {
        let r = row(&[("NAME", "Asha"), ("gender", "F"), ("sl", "Hindi")]);
        let f = COLUMN_ALIASES.resolve(&r);
        assert_eq!(f.name, None);
        assert_eq!(f.gender.as_deref(), Some("F"));
        assert_eq!(f.second_language, None);
    }

    #[test]
    fn unrelated_columns_resolve_to_nothing() {
        let r = row(&[("R.No.", "1"), ("Remarks", "x")]);
        assert_eq!(COLUMN_ALIASES.resolve(&r), ResolvedFields::default());
    }
}
