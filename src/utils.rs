/// Converts a 1-based column number to its spreadsheet letters (1 -> `A`, 28 -> `AB`).
pub fn column_number_to_name(column: u32) -> String {
    let mut column = column;
    let mut name = String::new();
    while column > 0 {
        let rem = ((column - 1) % 26) as u8;
        name.insert(0, (b'A' + rem) as char);
        column = (column - 1) / 26;
    }
    name
}

/// Converts spreadsheet column letters to a 1-based column number. Returns `None` for
/// anything that is not a non-empty run of ASCII letters.
pub fn column_name_to_number(name: &str) -> Option<u32> {
    if name.is_empty() {
        return None;
    }
    let mut value: u32 = 0;
    for ch in name.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let digit = (ch.to_ascii_uppercase() as u8 - b'A') as u32 + 1;
        value = value.checked_mul(26)?.checked_add(digit)?;
    }
    Some(value)
}

/// A1-style address for 1-based coordinates.
pub fn cell_address(column: u32, row: u32) -> String {
    format!("{}{}", column_number_to_name(column), row)
}

/// Sheet names need quoting in references when they are not plain identifiers.
pub fn needs_sheet_quotes(sheet: &str) -> bool {
    sheet.is_empty()
        || sheet
            .chars()
            .any(|ch| !(ch.is_ascii_alphanumeric() || ch == '_' || ch == '.'))
        || sheet.chars().next().is_some_and(|ch| ch.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_names_round_trip() {
        assert_eq!(column_number_to_name(1), "A");
        assert_eq!(column_number_to_name(26), "Z");
        assert_eq!(column_number_to_name(27), "AA");
        assert_eq!(column_number_to_name(703), "AAA");
        assert_eq!(column_name_to_number("A"), Some(1));
        assert_eq!(column_name_to_number("ab"), Some(28));
        assert_eq!(column_name_to_number("A1"), None);
        assert_eq!(column_name_to_number(""), None);
    }

    #[test]
    fn test_sheet_quoting() {
        assert!(!needs_sheet_quotes("Sheet1"));
        assert!(needs_sheet_quotes("My Sheet"));
        assert!(needs_sheet_quotes("2024"));
    }
}
