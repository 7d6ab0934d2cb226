//! Rich-content post-processing (spec §4.8 step 9), ported from
//! `RichResponseProcessor` in `original_source/src/rich_response.py`:
//! inline images, `[CREATE_EVENT]` blocks turned into ICS files, and
//! disambiguation button groups — all three extracted out of the visible
//! answer text.

use std::collections::HashSet;
use std::path::Path;

use chrono_tz::Tz;
use icalendar::{Component, EventLike};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use archive_vectorstore::ScoredChunk;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RichContentBlock {
    Image {
        url: String,
        alt: String,
        caption: String,
    },
    IcsEvent {
        title: String,
        start: String,
        end: String,
        location: String,
        description: String,
        download_url: String,
    },
    Buttons {
        prompt: String,
        options: Vec<ButtonOption>,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ButtonOption {
    pub label: String,
    pub value: String,
}

/// Where generated `.ics` files are written; `GET /media/events/<name>`
/// serves out of the same directory (spec §6).
pub struct RichContentProcessor {
    pub events_dir: std::path::PathBuf,
    pub media_dir: Option<std::path::PathBuf>,
    pub tz: Tz,
}

impl RichContentProcessor {
    pub fn new(events_dir: impl Into<std::path::PathBuf>, tz: Tz) -> Self {
        Self { events_dir: events_dir.into(), media_dir: None, tz }
    }

    pub fn with_media_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.media_dir = Some(dir.into());
        self
    }

    /// Full post-process pass: images from the retrieved chunks, then ICS
    /// events and disambiguation buttons extracted out of the answer text
    /// itself, in that order (spec §4.8 step 9).
    pub fn process(&self, answer: &str, chunks: &[ScoredChunk]) -> (String, Vec<RichContentBlock>) {
        let mut blocks = self.extract_images(chunks);

        let (answer, events) = self.extract_ics_events(answer);
        blocks.extend(events);

        let (answer, buttons) = extract_buttons(&answer);
        blocks.extend(buttons);

        (answer, blocks)
    }

    fn extract_images(&self, chunks: &[ScoredChunk]) -> Vec<RichContentBlock> {
        let mut seen = HashSet::new();
        let mut images = Vec::new();
        for chunk in chunks {
            let payload = &chunk.payload;
            if !payload.has_media {
                continue;
            }
            let Some(media_path) = &payload.media_path else { continue };
            if media_path.is_empty() || !seen.insert(media_path.clone()) {
                continue;
            }
            if let Some(dir) = &self.media_dir {
                if !dir.join(Path::new(media_path).file_name().unwrap_or_default()).exists()
                    && !Path::new(media_path).exists()
                {
                    continue;
                }
            }
            let filename = Path::new(media_path)
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_else(|| media_path.clone());

            let sender = payload.sender.clone().unwrap_or_else(|| "Unknown".to_string());
            let mut caption = format!("Image from {sender}");
            if let Some(chat_name) = &payload.chat_name {
                if !chat_name.is_empty() {
                    caption.push_str(&format!(" in {chat_name}"));
                }
            }
            let dt = chrono::DateTime::from_timestamp(payload.timestamp, 0)
                .unwrap_or_default()
                .with_timezone(&self.tz);
            caption.push_str(&dt.format(" on %-d/%-m/%Y %H:%M").to_string());

            images.push(RichContentBlock::Image {
                url: format!("/media/images/{filename}"),
                alt: caption.clone(),
                caption,
            });
        }
        images
    }

    fn extract_ics_events(&self, answer: &str) -> (String, Vec<RichContentBlock>) {
        static EVENT_PATTERN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?is)\[CREATE_EVENT\]\s*\n(.*?)\n\s*\[/CREATE_EVENT\]").expect("static pattern")
        });

        let mut events = Vec::new();
        for caps in EVENT_PATTERN.captures_iter(answer) {
            let block = &caps[1];
            let fields = parse_event_block(block);
            let (Some(title), Some(start_raw)) = (fields.get("title"), fields.get("start")) else {
                continue;
            };
            let Some(start) = parse_event_datetime(start_raw) else { continue };
            let end = fields
                .get("end")
                .and_then(|s| parse_event_datetime(s))
                .unwrap_or_else(|| start + chrono::Duration::hours(1));

            let location = fields.get("location").cloned().unwrap_or_default();
            let description = fields.get("description").cloned().unwrap_or_default();

            let Some(filename) = self.write_ics(title, start, end, &location, &description) else {
                continue;
            };

            events.push(RichContentBlock::IcsEvent {
                title: title.clone(),
                start: start_raw.clone(),
                end: fields.get("end").cloned().unwrap_or_default(),
                location,
                description,
                download_url: format!("/media/events/{filename}"),
            });
        }

        let cleaned = EVENT_PATTERN.replace_all(answer, "").trim().to_string();
        let cleaned = collapse_blank_lines(&cleaned);
        (cleaned, events)
    }

    fn write_ics(
        &self,
        title: &str,
        start: chrono::NaiveDateTime,
        end: chrono::NaiveDateTime,
        location: &str,
        description: &str,
    ) -> Option<String> {
        let mut event = icalendar::Event::new();
        event.summary(title);
        event.starts(start);
        event.ends(end);
        if !location.is_empty() {
            event.location(location);
        }
        if !description.is_empty() {
            event.description(description);
        }
        event.uid(&format!("{}@archive", uuid::Uuid::new_v4()));

        let mut cal = icalendar::Calendar::new();
        cal.push(event.done());

        let safe_title: String = title
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() || c.is_whitespace() || c == '-' { c } else { ' ' })
            .collect();
        let safe_title: String = safe_title.split_whitespace().collect::<Vec<_>>().join("-");
        let safe_title: String = safe_title.chars().take(50).collect();
        let filename = format!("{safe_title}-{}.ics", &uuid::Uuid::new_v4().simple().to_string()[..8]);

        if std::fs::create_dir_all(&self.events_dir).is_err() {
            return None;
        }
        let path = self.events_dir.join(&filename);
        std::fs::write(path, cal.to_string()).ok()?;
        Some(filename)
    }
}

fn parse_event_block(block: &str) -> std::collections::HashMap<String, String> {
    let mut out = std::collections::HashMap::new();
    for line in block.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(idx) = line.find(':') else { continue };
        if idx == 0 {
            continue;
        }
        let key = line[..idx].trim().to_lowercase();
        let value = line[idx + 1..].trim().to_string();
        if matches!(key.as_str(), "title" | "start" | "end" | "location" | "description") {
            out.insert(key, value);
        }
    }
    out
}

/// Tolerant datetime parsing (spec §4.8 step 9): ISO-ish, `%d/%m/%Y %H:%M`,
/// and date-only (treated as midnight), matching
/// `rich_response.py::_parse_datetime`'s format list.
fn parse_event_datetime(raw: &str) -> Option<chrono::NaiveDateTime> {
    use chrono::NaiveDateTime;
    let raw = raw.trim();
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%d/%m/%Y %H:%M",
        "%d/%m/%Y",
    ];
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    None
}

fn collapse_blank_lines(text: &str) -> String {
    static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("static pattern"));
    BLANK_RUN.replace_all(text, "\n\n").to_string()
}

/// English + Hebrew phrases that mark an answer as a disambiguation
/// question (spec §4.8 step 9, ported from `_QUESTION_INDICATORS`).
const QUESTION_INDICATORS: &[&str] = &[
    "which one",
    "who did you mean",
    "did you mean",
    "please clarify",
    "please specify",
    "which person",
    "לאיזה",
    "למי התכוונת",
    "התכוונת",
    "איזה",
    "מי מהם",
    "תבחר",
    "תבחרי",
    "באיזה",
];

fn extract_buttons(answer: &str) -> (String, Vec<RichContentBlock>) {
    static OPTION_PATTERN: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?m)^\s*(\d+)\s*[).]\s*(.+?)\s*$").expect("static pattern"));

    let lower = answer.to_lowercase();
    let has_question = QUESTION_INDICATORS.iter().any(|i| lower.contains(i));
    if !has_question {
        return (answer.to_string(), Vec::new());
    }

    let matches: Vec<_> = OPTION_PATTERN.captures_iter(answer).collect();
    if matches.len() < 2 {
        return (answer.to_string(), Vec::new());
    }

    let options: Vec<ButtonOption> = matches
        .iter()
        .map(|m| {
            let text = m[2].trim_end_matches(['?', '？']).trim().to_string();
            ButtonOption { label: text.clone(), value: text }
        })
        .collect();

    let first_start = matches[0].get(0).unwrap().start();
    let last_end = matches.last().unwrap().get(0).unwrap().end();
    let before = answer[..first_start].trim();
    let after = answer[last_end..].trim();
    let mut prompt = if !before.is_empty() && !after.is_empty() {
        format!("{before}\n{after}")
    } else if !before.is_empty() {
        before.to_string()
    } else {
        after.to_string()
    };
    prompt = prompt.trim_end_matches(':').trim().to_string();

    let option_numbers: HashSet<String> = matches.iter().map(|m| m[1].to_string()).collect();
    let cleaned: String = answer
        .lines()
        .filter(|line| {
            let stripped = line.trim();
            !option_numbers
                .iter()
                .any(|n| stripped.starts_with(&format!("{n})")) || stripped.starts_with(&format!("{n}.")))
        })
        .collect::<Vec<_>>()
        .join("\n");
    let cleaned = collapse_blank_lines(cleaned.trim());

    (cleaned, vec![RichContentBlock::Buttons { prompt, options }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use archive_vectorstore::{ChunkPayload, ContentType};

    fn chunk(has_media: bool, media_path: Option<&str>) -> ScoredChunk {
        ScoredChunk {
            point_id: 1,
            score: 0.9,
            payload: ChunkPayload {
                source_id: "s:1".into(),
                source: "whatsapp".into(),
                content_type: ContentType::Image,
                text: "photo".into(),
                sender: Some("Alice".into()),
                chat_id: None,
                chat_name: Some("Family".into()),
                is_group: true,
                timestamp: 1700000000,
                language: None,
                has_media,
                media_type: Some("image".into()),
                media_url: None,
                media_path: media_path.map(String::from),
                chunk_index: None,
                chunk_total: None,
                asset_id: "whatsapp:1".into(),
                parent_asset_id: None,
                thread_id: None,
                chunk_group_id: None,
                person_ids: vec![],
                mentioned_person_ids: vec![],
            },
        }
    }

    #[test]
    fn extracts_one_image_block_per_distinct_path() {
        let proc = RichContentProcessor::new("/tmp/archive-events-test", chrono_tz::UTC);
        let chunks = vec![chunk(true, Some("/data/images/a.jpg")), chunk(true, Some("/data/images/a.jpg"))];
        let (_, blocks) = proc.process("hello", &chunks);
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            RichContentBlock::Image { url, caption, .. } => {
                assert_eq!(url, "/media/images/a.jpg");
                assert!(caption.starts_with("Image from Alice in Family"));
            }
            _ => panic!("expected image block"),
        }
    }

    #[test]
    fn create_event_block_is_stripped_and_generates_ics() {
        let dir = std::env::temp_dir().join(format!("archive-events-{}", uuid::Uuid::new_v4()));
        let proc = RichContentProcessor::new(&dir, chrono_tz::UTC);
        let answer = "Event: [CREATE_EVENT]\ntitle: X\nstart: 2026-02-16T10:00\n[/CREATE_EVENT]";
        let (cleaned, blocks) = proc.process(answer, &[]);
        assert!(!cleaned.contains("[CREATE_EVENT]"));
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            RichContentBlock::IcsEvent { download_url, .. } => assert!(download_url.starts_with("/media/events/")),
            _ => panic!("expected ics_event block"),
        }
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn disambiguation_buttons_strip_numbered_options() {
        let proc = RichContentProcessor::new("/tmp/archive-events-test2", chrono_tz::UTC);
        let answer = "Did you mean:\n1) David A\n2) David B";
        let (cleaned, blocks) = proc.process(answer, &[]);
        assert!(!cleaned.contains("1) David A"));
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            RichContentBlock::Buttons { options, .. } => assert_eq!(options.len(), 2),
            _ => panic!("expected buttons block"),
        }
    }

    #[test]
    fn no_question_indicator_leaves_numbers_untouched() {
        let proc = RichContentProcessor::new("/tmp/archive-events-test3", chrono_tz::UTC);
        let answer = "Steps:\n1) do this\n2) do that";
        let (cleaned, blocks) = proc.process(answer, &[]);
        assert_eq!(cleaned, answer);
        assert!(blocks.is_empty());
    }
}
