/// Extract the 11-character video id from a full YouTube URL.
pub fn extract_youtube_video_id(url: &str) -> Option<String> {
    if let Some(captures) = regex::Regex::new(
        r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/shorts/)([a-zA-Z0-9_-]{11})",
    )
    .ok()?
    .captures(url)
    {
        return captures.get(1).map(|m| m.as_str().to_string());
    }
    None
}

/// Accept either a raw 11-character video id or any supported URL form.
pub fn normalize_video_id(input: &str) -> Option<String> {
    let input = input.trim();
    if regex::Regex::new(r"^[a-zA-Z0-9_-]{11}$")
        .ok()?
        .is_match(input)
    {
        return Some(input.to_string());
    }
    extract_youtube_video_id(input)
}

/// Strip a markdown code fence (```json ... ``` or ``` ... ```) so the
/// remainder can be parsed as JSON. Returns the input unchanged when no
/// fence is present.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag on the opening fence, if any.
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Render an ISO8601 duration (PT1H2M3S) as H:MM:SS / M:SS for display.
/// Unparseable input is passed through unchanged.
pub fn format_iso8601_duration(duration_str: &str) -> String {
    if !duration_str.starts_with("PT") {
        return duration_str.to_string();
    }

    let duration_part = &duration_str[2..];
    let mut hours = 0i64;
    let mut minutes = 0i64;
    let mut seconds = 0i64;
    let mut current_number = String::new();

    for ch in duration_part.chars() {
        if ch.is_ascii_digit() {
            current_number.push(ch);
        } else {
            if let Ok(num) = current_number.parse::<i64>() {
                match ch {
                    'H' => hours = num,
                    'M' => minutes = num,
                    'S' => seconds = num,
                    _ => {}
                }
            }
            current_number.clear();
        }
    }

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

pub fn default_thumbnail_url(video_id: &str) -> String {
    format!("https://i.ytimg.com/vi/{video_id}/hqdefault.jpg")
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}
