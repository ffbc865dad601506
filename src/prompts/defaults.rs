//! Built-in templates, fallback messages and preview samples.

pub const DEFAULT_TEMPLATES: [(&str, &str); 3] = [
    (
        "preparing",
        "You are Santa Claus! Write a cheerful, warm message (2-3 sentences max) about preparing for \
         Christmas Eve at the North Pole. The elves are busy wrapping presents. Be jolly, mention the \
         reindeer if relevant, and keep it magical and brief. Use emojis sparingly (1-2 max). Don't use \
         quotation marks.",
    ),
    (
        "delivering",
        "You are Santa Claus! Write a cheerful, warm message (2-3 sentences max) to someone tracking your \
         journey. Santa is currently delivering presents around the world! {{DISTANCE_CONTEXT}} \
         {{GIFTS_CONTEXT}} Be jolly, mention the reindeer if relevant, and keep it magical and brief. Use \
         emojis sparingly (1-2 max). Don't use quotation marks.",
    ),
    (
        "finished",
        "You are Santa Claus! Write a cheerful, warm message (2-3 sentences max) about finishing Christmas \
         deliveries and resting at the North Pole with the reindeer. Be jolly and keep it magical and \
         brief. Use emojis sparingly (1-2 max). Don't use quotation marks.",
    ),
];

pub const GENERIC_FALLBACK: &str = "Ho ho ho! Merry Christmas from Santa! 🎅";

/// What the UI shows when a prompt cannot be rendered.
pub fn fallback_message(phase: &str) -> &'static str {
    match phase {
        "preparing" => {
            "Ho ho ho! I'm busy preparing for Christmas Eve at the North Pole! The elves and I are working \
             hard to make this Christmas magical! 🎅"
        }
        "delivering" => {
            "Ho ho ho! I'm on my way around the world delivering presents! Keep being good and I might visit \
             your area soon! 🎁"
        }
        "finished" => {
            "Ho ho ho! What a wonderful Christmas that was! All the presents have been delivered and I'm back \
             home with the reindeer! 🎄"
        }
        _ => GENERIC_FALLBACK,
    }
}

pub const PREVIEW_SAMPLE: [(&str, &str); 4] = [
    ("DISTANCE_CONTEXT", "He is about 1,500 km away from the user's location."),
    ("GIFTS_CONTEXT", "He has delivered 1,234,567,890 gifts so far!"),
    ("USER_LOCATION", "40.75, -73.99"),
    ("SANTA_STATUS", "Out for delivery!"),
];
