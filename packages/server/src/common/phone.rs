/// Normalize a phone number to E.164 (`+` followed by 8-15 digits).
///
/// Accepts formatting characters and a `whatsapp:` channel prefix. A bare
/// 10-digit number is treated as North American.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let without_channel = trimmed
        .strip_prefix("whatsapp:")
        .unwrap_or(trimmed)
        .trim();

    let has_plus = without_channel.starts_with('+');
    let mut digits = String::with_capacity(without_channel.len());
    for (idx, c) in without_channel.chars().enumerate() {
        match c {
            '0'..='9' => digits.push(c),
            '+' if idx == 0 => {}
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => return None,
        }
    }

    if has_plus {
        return (8..=15).contains(&digits.len()).then(|| format!("+{}", digits));
    }

    match digits.len() {
        10 => Some(format!("+1{}", digits)),
        11 if digits.starts_with('1') => Some(format!("+{}", digits)),
        _ => None,
    }
}
