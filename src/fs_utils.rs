static RESERVED_WINDOWS_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Makes a scraped name safe to use as a file name on Windows, Linux and
/// Mac OS: forbidden and control characters become '_', leading/trailing
/// whitespace and dots are trimmed, reserved Windows device names get a
/// trailing underscore, and the result is capped at 255 bytes.
pub fn cleanup_filename(input: &str) -> String {
    let mut result: String = input
        .chars()
        .map(|c| match c {
            '/' | '\\' | '?' | '%' | '*' | ':' | '|' | '"' | '<' | '>' | '^' => '_',
            c if c.is_control() => '_',
            _ => c,
        })
        .collect::<String>()
        .trim_matches(|c: char| c.is_whitespace() || c == '.')
        .to_string();

    if RESERVED_WINDOWS_NAMES
        .iter()
        .any(|&name| name.eq_ignore_ascii_case(&result))
    {
        result.push('_');
    }

    result.truncate(255);
    result
}
