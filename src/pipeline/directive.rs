//! Inline `--number_of_images=N` directive handling

use crate::error::{AppError, Result};

pub const FLAG: &str = "--number_of_images";
pub const MIN_IMAGES: u32 = 1;
pub const MAX_IMAGES: u32 = 4;

/// Prompt with the count directive stripped out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub prompt: String,
    pub count: u32,
}

impl Directive {
    /// Parse the last chat message into a generation prompt and image count.
    ///
    /// The first directive decides the count; every directive occurrence is
    /// removed from the prompt.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(AppError::EmptyPrompt);
        }

        let Some(first) = find_directive(raw) else {
            return Ok(Self {
                prompt: raw.trim().to_string(),
                count: MIN_IMAGES,
            });
        };

        let count = clamp_count(&raw[first.digits.clone()]);

        let mut cleaned = raw.to_string();
        while let Some(found) = find_directive(&cleaned) {
            cleaned.replace_range(found.start..found.digits.end, "");
        }

        let prompt = cleaned.trim().to_string();
        if prompt.is_empty() {
            return Err(AppError::EmptyPrompt);
        }

        Ok(Self { prompt, count })
    }
}

struct Found {
    start: usize,
    digits: std::ops::Range<usize>,
}

/// Locate `--number_of_images <ws>* = <ws>* <digits>+`
fn find_directive(text: &str) -> Option<Found> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find(FLAG) {
        let start = search_from + offset;
        let after_flag = start + FLAG.len();

        let rest = &text[after_flag..];
        let after_ws = rest.trim_start();
        if let Some(value) = after_ws.strip_prefix('=') {
            let value_trimmed = value.trim_start();
            let digits_len = value_trimmed
                .bytes()
                .take_while(|b| b.is_ascii_digit())
                .count();
            if digits_len > 0 {
                let digits_start = text.len() - value_trimmed.len();
                return Some(Found {
                    start,
                    digits: digits_start..digits_start + digits_len,
                });
            }
        }

        search_from = after_flag;
    }
    None
}

fn clamp_count(digits: &str) -> u32 {
    // A run of digits only fails to parse when it overflows
    let n = digits.parse::<u64>().unwrap_or(u64::MAX);
    n.clamp(MIN_IMAGES as u64, MAX_IMAGES as u64) as u32
}
