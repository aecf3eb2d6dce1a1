use std::io::{self, BufRead, Write};
use std::sync::Mutex;

use tracing::debug;

use crate::types::ToolResult;

pub const RATING_PROMPT: &str = "⭐ Rate this tool usage (1-5 stars, or 0 to skip): ";

/// Supplies the optional 1-5 rating attached to each logged tool call.
/// Zero means unrated.
pub trait RatingProvider: Send + Sync {
    fn rate(&self, result: &ToolResult) -> u8;
}

/// Always unrated. Used for headless runs and `--no-rating`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRating;

impl RatingProvider for NoRating {
    fn rate(&self, _result: &ToolResult) -> u8 {
        0
    }
}

/// Asks on `output` and reads one line from `input`.
pub struct PromptRating<R, W> {
    io: Mutex<(R, W)>,
}

impl<R: BufRead, W: Write> PromptRating<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            io: Mutex::new((input, output)),
        }
    }
}

impl PromptRating<io::BufReader<io::Stdin>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R, W> RatingProvider for PromptRating<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn rate(&self, _result: &ToolResult) -> u8 {
        let Ok(mut io) = self.io.lock() else {
            return 0;
        };
        let (input, output) = &mut *io;

        if write!(output, "\n{}", RATING_PROMPT).and_then(|_| output.flush()).is_err() {
            return 0;
        }

        let mut line = String::new();
        if let Err(e) = input.read_line(&mut line) {
            debug!("Could not read rating: {}", e);
            return 0;
        }

        parse_rating(&line)
    }
}

/// Anything other than an integer in 0..=5 counts as "skip".
pub fn parse_rating(input: &str) -> u8 {
    match input.trim().parse::<u8>() {
        Ok(rating) if rating <= 5 => rating,
        _ => 0,
    }
}
