//! Human-facing names and sizes for discovered models.

const DISPLAY_NAMES: &[(&str, &str)] = &[
    ("llama3.2", "Llama 3.2"),
    ("llama3.1", "Llama 3.1"),
    ("llama3", "Llama 3"),
    ("mistral", "Mistral 7B"),
    ("phi", "Phi 3"),
    ("gemma", "Gemma 7B"),
    ("codellama", "Code Llama"),
    ("vicuna", "Vicuna"),
    ("orca", "Orca"),
];

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// `"llama3.2:latest"` -> `"llama3.2"`.
pub fn strip_tag(name: &str) -> &str {
    name.split(':').next().unwrap_or(name)
}

pub fn display_name(name: &str) -> String {
    let base = strip_tag(name);
    DISPLAY_NAMES
        .iter()
        .find(|(key, _)| *key == base)
        .map(|(_, pretty)| pretty.to_string())
        .unwrap_or_else(|| capitalize(base))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Binary-scaled size with one decimal, e.g. `2.0 GB`.
pub fn format_size(bytes: Option<u64>) -> String {
    let bytes = match bytes {
        Some(b) if b > 0 => b,
        _ => return "Unknown size".to_string(),
    };

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_display_names() {
        assert_eq!(display_name("llama3.2:latest"), "Llama 3.2");
        assert_eq!(display_name("mistral"), "Mistral 7B");
        assert_eq!(display_name("qwen2:7b"), "Qwen2");
        assert_eq!(display_name(""), "");
    }

    #[test]
    fn sizes_scale_by_1024() {
        assert_eq!(format_size(None), "Unknown size");
        assert_eq!(format_size(Some(0)), "Unknown size");
        assert_eq!(format_size(Some(512)), "512.0 B");
        assert_eq!(format_size(Some(1536)), "1.5 KB");
        assert_eq!(format_size(Some(2 * 1024 * 1024 * 1024)), "2.0 GB");
    }
}
