use crate::quote::Quote;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

pub const HASHTAGS: &[&str] = &["#motivation", "#inspiration", "#success", "#mindset", "#hustle"];

/// "People & Blogs".
pub const CATEGORY_ID: &str = "22";

const TITLE_QUOTE_CHARS: usize = 40;
const MAX_TITLE_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy_status: String,
}

fn take_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn pick<'a, R: Rng + ?Sized>(pool: &[&'a str], rng: &mut R) -> &'a str {
    pool.choose(rng).copied().unwrap_or("#motivation")
}

pub fn generate_metadata<R: Rng + ?Sized>(quote: &Quote, privacy_status: &str, rng: &mut R) -> VideoMetadata {
    let mut pool: Vec<&str> = HASHTAGS.to_vec();
    pool.shuffle(rng);

    let head = take_chars(quote.text.trim(), TITLE_QUOTE_CHARS);
    let title = format!("{}... {} {}", head.trim_end(), pick(&pool, rng), pick(&pool, rng));

    let mut description = quote.text.clone();
    if let Some(author) = &quote.author {
        description.push_str(&format!("\n— {}", author));
    }
    description.push_str(&format!("\n\n{} {} {}", pick(&pool, rng), pick(&pool, rng), pick(&pool, rng)));

    let tags = pool
        .iter()
        .take(3)
        .map(|tag| tag.trim_start_matches('#').to_string())
        .collect();

    VideoMetadata {
        title: take_chars(&title, MAX_TITLE_CHARS),
        description,
        tags,
        category_id: CATEGORY_ID.to_string(),
        privacy_status: privacy_status.to_string(),
    }
}
