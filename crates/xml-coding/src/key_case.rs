//! camelCase and snake_case key conversion.
//!
//! The rules mirror Foundation's coder key strategies so documents keep the
//! same element names across implementations:
//!
//! - camel to snake splits on lower-to-upper transitions and treats a run of
//!   capitals as one acronym word (`myURLProperty` becomes `my_url_property`);
//! - snake to camel keeps leading and trailing underscores verbatim and passes
//!   a key without interior underscores through unchanged.

/// Converts `camelCaseKey` to `camel_case_key`.
pub fn convert_to_snake_case(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.is_empty() {
        return String::new();
    }

    let find = |from: usize, pred: fn(&char) -> bool| -> Option<usize> {
        chars.get(from..)?.iter().position(pred).map(|offset| from + offset)
    };

    let mut words: Vec<(usize, usize)> = Vec::new();
    let mut word_start = 0;
    let mut search_start = 1;
    let end = chars.len();

    while let Some(upper) = find(search_start, |c| c.is_uppercase()) {
        words.push((word_start, upper));

        let Some(lower) = find(upper, |c| c.is_lowercase()) else {
            word_start = upper;
            break;
        };

        if lower == upper + 1 {
            // A single capital starts the next word.
            word_start = upper;
        } else {
            // Acronym: the capital right before the lowercase letter starts the next word.
            words.push((upper, lower - 1));
            word_start = lower - 1;
        }
        search_start = lower + 1;
    }
    words.push((word_start, end));

    words
        .into_iter()
        .map(|(start, stop)| chars[start..stop].iter().collect::<String>().to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Converts `snake_case_key` to `snakeCaseKey`.
pub fn convert_from_snake_case(key: &str) -> String {
    let Some(first) = key.find(|c: char| c != '_') else {
        // Empty or nothing but underscores.
        return key.to_string();
    };
    let last = key.rfind(|c: char| c != '_').unwrap_or(first);
    let last_end = last + key[last..].chars().next().map_or(1, char::len_utf8);

    let leading = &key[..first];
    let body = &key[first..last_end];
    let trailing = &key[last_end..];

    let components: Vec<&str> = body.split('_').filter(|part| !part.is_empty()).collect();
    let joined = if components.len() == 1 {
        body.to_string()
    } else {
        let mut joined = String::with_capacity(body.len());
        for (index, component) in components.iter().enumerate() {
            if index == 0 {
                joined.push_str(&component.to_lowercase());
            } else {
                joined.push_str(&capitalized(component));
            }
        }
        joined
    };

    format!("{leading}{joined}{trailing}")
}

/// Uppercases the first character and lowercases the rest.
fn capitalized(component: &str) -> String {
    let lower = component.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => lower,
    }
}
